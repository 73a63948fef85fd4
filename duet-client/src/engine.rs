use crate::bus::SignalSender;
use crate::media::{LocalTrack, MediaStream, RemoteTrack, TrackId};
use crate::CallError;
use async_trait::async_trait;
use duet_core::{ClientSignal, ConnectionId, NegotiationState, SessionDescription};
use futures::stream::BoxStream;
use tracing::{debug, info};

/// Events raised by a peer connection on its own initiative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Track(RemoteTrack),
    NegotiationNeeded,
}

/// The SDP/ICE machinery and media transport behind one call attempt.
///
/// `signaling_state` is owned by the implementation: it moves only as a
/// consequence of the offer/answer operations below.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn signaling_state(&self) -> NegotiationState;

    /// Creates an offer and sets it as the local description.
    async fn get_offer(&mut self) -> anyhow::Result<SessionDescription>;

    /// Sets `offer` as the remote description, then creates and sets the
    /// local answer.
    async fn get_answer(&mut self, offer: SessionDescription)
    -> anyhow::Result<SessionDescription>;

    /// Applies the other side's answer to our outstanding offer.
    async fn set_remote_answer(&mut self, answer: SessionDescription) -> anyhow::Result<()>;

    /// Abandons our outstanding offer.
    async fn rollback(&mut self) -> anyhow::Result<()>;

    async fn add_track(&mut self, track: &LocalTrack, stream: &MediaStream) -> anyhow::Result<()>;

    /// Tracks currently attached to a sender.
    async fn senders(&self) -> Vec<TrackId>;

    /// Takes the event stream. Subsequent calls return an empty stream.
    fn events(&mut self) -> BoxStream<'static, PeerEvent>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Builds a fresh peer connection per call attempt.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self) -> anyhow::Result<Box<dyn PeerConnection>>;
}

/// Outcome of a guarded negotiation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Applied,
    /// Out of turn for the given signaling state; nothing was done.
    Skipped(NegotiationState),
}

impl Guard {
    pub fn applied(&self) -> bool {
        matches!(self, Guard::Applied)
    }
}

/// What to do with an offer that arrives while our own offer is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlarePolicy {
    /// Drop the incoming offer and keep waiting for our answer.
    #[default]
    Ignore,
    /// The side with the lower connection id rolls back and answers.
    Polite,
}

/// Drives the offer/answer exchange for exactly one peer connection.
pub struct NegotiationEngine {
    peer: Box<dyn PeerConnection>,
    signals: SignalSender,
    glare: GlarePolicy,
    local_id: Option<ConnectionId>,
    // set only once a handshake completes
    remote_peer: Option<ConnectionId>,
    // addressee of our outstanding offer
    pending_peer: Option<ConnectionId>,
}

impl NegotiationEngine {
    pub fn new(peer: Box<dyn PeerConnection>, signals: SignalSender, glare: GlarePolicy) -> Self {
        Self {
            peer,
            signals,
            glare,
            local_id: None,
            remote_peer: None,
            pending_peer: None,
        }
    }

    pub fn set_local_id(&mut self, id: Option<ConnectionId>) {
        self.local_id = id;
    }

    pub fn state(&self) -> NegotiationState {
        self.peer.signaling_state()
    }

    pub fn remote_peer(&self) -> Option<ConnectionId> {
        self.remote_peer
    }

    pub fn pending_peer(&self) -> Option<ConnectionId> {
        self.pending_peer
    }

    pub fn events(&mut self) -> BoxStream<'static, PeerEvent> {
        self.peer.events()
    }

    pub async fn senders(&self) -> Vec<TrackId> {
        self.peer.senders().await
    }

    /// Attaches every track of `stream` not already attached to a sender.
    /// Returns how many were attached.
    pub async fn attach_tracks(&mut self, stream: &MediaStream) -> Result<usize, CallError> {
        let attached = self.peer.senders().await;
        let mut added = 0;
        for track in &stream.tracks {
            if attached.contains(&track.id) {
                continue;
            }
            self.peer.add_track(track, stream).await?;
            added += 1;
        }
        if added > 0 {
            debug!("Attached {} new track(s) from stream {}", added, stream.id);
        }
        Ok(added)
    }

    pub async fn initiate_call(
        &mut self,
        remote: ConnectionId,
        local: &MediaStream,
    ) -> Result<Guard, CallError> {
        let state = self.state();
        if state != NegotiationState::Stable {
            debug!("Not calling {} while {}", remote, state);
            return Ok(Guard::Skipped(state));
        }

        self.attach_tracks(local).await?;
        let offer = self.peer.get_offer().await?;
        self.pending_peer = Some(remote);
        self.signals.emit(ClientSignal::CallOffer { to: remote, offer })?;
        info!("Call offer sent to {}", remote);
        Ok(Guard::Applied)
    }

    pub async fn handle_incoming_offer(
        &mut self,
        from: ConnectionId,
        offer: SessionDescription,
    ) -> Result<Guard, CallError> {
        let guard = self.answer(from, offer, |to, ans| ClientSignal::CallAnswer { to, ans }).await?;
        if guard.applied() {
            info!("Answered call from {}", from);
        }
        Ok(guard)
    }

    pub async fn handle_call_accepted(
        &mut self,
        from: ConnectionId,
        ans: SessionDescription,
    ) -> Result<Guard, CallError> {
        let guard = self.apply_answer(from, ans).await?;
        if guard.applied() {
            info!("Call with {} established", from);
        }
        Ok(guard)
    }

    /// Renegotiates after a local track change. Dropped, not queued, unless
    /// the connection is stable and a remote peer is known.
    pub async fn on_negotiation_needed(&mut self) -> Result<Guard, CallError> {
        let state = self.state();
        if state != NegotiationState::Stable {
            debug!("Negotiation needed while {}, dropping", state);
            return Ok(Guard::Skipped(state));
        }
        let Some(remote) = self.remote_peer else {
            debug!("Negotiation needed before any handshake, dropping");
            return Ok(Guard::Skipped(state));
        };

        let offer = self.peer.get_offer().await?;
        self.pending_peer = Some(remote);
        self.signals
            .emit(ClientSignal::NegotiationOffer { to: remote, offer })?;
        debug!("Renegotiation offer sent to {}", remote);
        Ok(Guard::Applied)
    }

    pub async fn handle_negotiation_offer(
        &mut self,
        from: ConnectionId,
        offer: SessionDescription,
    ) -> Result<Guard, CallError> {
        self.answer(from, offer, |to, ans| ClientSignal::NegotiationAnswer { to, ans })
            .await
    }

    pub async fn handle_negotiation_answer(
        &mut self,
        from: ConnectionId,
        ans: SessionDescription,
    ) -> Result<Guard, CallError> {
        self.apply_answer(from, ans).await
    }

    pub async fn close(&mut self) -> Result<(), CallError> {
        self.remote_peer = None;
        self.pending_peer = None;
        self.peer.close().await?;
        Ok(())
    }

    async fn answer(
        &mut self,
        from: ConnectionId,
        offer: SessionDescription,
        reply: fn(ConnectionId, SessionDescription) -> ClientSignal,
    ) -> Result<Guard, CallError> {
        let state = self.state();
        match state {
            NegotiationState::Stable => {}
            NegotiationState::HaveLocalOffer if self.yields_to(from) => {
                debug!("Offer collision with {}, rolling back ours", from);
                self.peer.rollback().await?;
                self.pending_peer = None;
            }
            _ => {
                debug!("Dropping offer from {} while {}", from, state);
                return Ok(Guard::Skipped(state));
            }
        }

        let ans = self.peer.get_answer(offer).await?;
        self.signals.emit(reply(from, ans))?;
        self.remote_peer = Some(from);
        Ok(Guard::Applied)
    }

    async fn apply_answer(
        &mut self,
        from: ConnectionId,
        ans: SessionDescription,
    ) -> Result<Guard, CallError> {
        let state = self.state();
        if state != NegotiationState::HaveLocalOffer {
            debug!("Ignoring answer from {} while {}", from, state);
            return Ok(Guard::Skipped(state));
        }
        if self.pending_peer != Some(from) {
            debug!("Ignoring answer from {}, our offer went elsewhere", from);
            return Ok(Guard::Skipped(state));
        }

        self.peer.set_remote_answer(ans).await?;
        self.remote_peer = Some(from);
        self.pending_peer = None;
        Ok(Guard::Applied)
    }

    fn yields_to(&self, other: ConnectionId) -> bool {
        match self.glare {
            GlarePolicy::Ignore => false,
            GlarePolicy::Polite => self.local_id.is_some_and(|me| me < other),
        }
    }
}
