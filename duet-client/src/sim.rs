//! In-process media and peer-connection capabilities.
//!
//! `SimPeer` follows the browser's signaling-state rules and fires
//! negotiation-needed the way a browser does: only while stable, and again
//! on return to stable if some attached track is still not covered by a
//! local description. Its SDP carries one `a=msid:<stream> <track> <kind>`
//! line per sent track, so two sim peers exchange real track lists.

use crate::engine::{PeerConnection, PeerEvent, PeerFactory};
use crate::media::{
    LocalTrack, MediaConstraints, MediaDevices, MediaStream, RemoteTrack, TrackId, TrackKind,
};
use crate::CallError;
use anyhow::bail;
use async_trait::async_trait;
use duet_core::{NegotiationState, SdpType, SessionDescription};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

const MSID_PREFIX: &str = "a=msid:";

pub struct SimPeer {
    session_id: u64,
    version: u64,
    state: NegotiationState,
    senders: Vec<(LocalTrack, String)>,
    negotiated: HashSet<TrackId>,
    offered: HashSet<TrackId>,
    remote_tracks: HashSet<TrackId>,
    needs_negotiation: Arc<AtomicBool>,
    events_tx: Option<mpsc::UnboundedSender<PeerEvent>>,
    events_rx: Option<mpsc::UnboundedReceiver<PeerEvent>>,
}

impl SimPeer {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session_id: Uuid::new_v4().as_u64_pair().0,
            version: 0,
            state: NegotiationState::Stable,
            senders: Vec::new(),
            negotiated: HashSet::new(),
            offered: HashSet::new(),
            remote_tracks: HashSet::new(),
            needs_negotiation: Arc::new(AtomicBool::new(false)),
            events_tx: Some(events_tx),
            events_rx: Some(events_rx),
        }
    }

    fn uncovered(&self) -> bool {
        self.senders
            .iter()
            .any(|(t, _)| !self.negotiated.contains(&t.id) && !self.offered.contains(&t.id))
    }

    fn emit(&self, event: PeerEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }

    /// Browser rule: negotiation-needed fires only while stable.
    fn check_negotiation_needed(&self) {
        let needed = self.uncovered();
        self.needs_negotiation.store(needed, Ordering::SeqCst);
        if needed && self.state == NegotiationState::Stable {
            self.emit(PeerEvent::NegotiationNeeded);
        }
    }

    fn describe(&mut self, kind: SdpType) -> SessionDescription {
        self.version += 1;
        let mut sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=duet-sim\r\nt=0 0\r\n",
            self.session_id, self.version
        );
        for (track, stream_id) in &self.senders {
            sdp.push_str(&format!(
                "{}{} {} {}\r\n",
                MSID_PREFIX,
                stream_id,
                track.id,
                track.kind.as_str()
            ));
        }
        SessionDescription { kind, sdp }
    }

    fn receive_tracks(&mut self, description: &SessionDescription) {
        for track in parse_tracks(&description.sdp) {
            if self.remote_tracks.insert(track.id.clone()) {
                debug!("Sim peer received track {}", track.id);
                self.emit(PeerEvent::Track(track));
            }
        }
    }

    fn ensure_open(&self) -> anyhow::Result<()> {
        if self.state == NegotiationState::Closed {
            bail!("peer connection is closed");
        }
        Ok(())
    }
}

impl Default for SimPeer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerConnection for SimPeer {
    fn signaling_state(&self) -> NegotiationState {
        self.state
    }

    async fn get_offer(&mut self) -> anyhow::Result<SessionDescription> {
        self.ensure_open()?;
        if self.state != NegotiationState::Stable {
            bail!("cannot create an offer in state {}", self.state);
        }

        self.offered = self.senders.iter().map(|(t, _)| t.id.clone()).collect();
        self.state = NegotiationState::HaveLocalOffer;
        self.needs_negotiation.store(false, Ordering::SeqCst);
        Ok(self.describe(SdpType::Offer))
    }

    async fn get_answer(
        &mut self,
        offer: SessionDescription,
    ) -> anyhow::Result<SessionDescription> {
        self.ensure_open()?;
        if offer.kind != SdpType::Offer {
            bail!("expected an offer");
        }
        if self.state != NegotiationState::Stable {
            bail!("cannot apply a remote offer in state {}", self.state);
        }

        self.state = NegotiationState::HaveRemoteOffer;
        self.receive_tracks(&offer);

        let answer = self.describe(SdpType::Answer);
        self.negotiated
            .extend(self.senders.iter().map(|(t, _)| t.id.clone()));
        self.state = NegotiationState::Stable;
        self.check_negotiation_needed();
        Ok(answer)
    }

    async fn set_remote_answer(&mut self, answer: SessionDescription) -> anyhow::Result<()> {
        self.ensure_open()?;
        if answer.kind != SdpType::Answer {
            bail!("expected an answer");
        }
        if self.state != NegotiationState::HaveLocalOffer {
            bail!("cannot apply a remote answer in state {}", self.state);
        }

        self.receive_tracks(&answer);
        self.negotiated.extend(self.offered.drain());
        self.state = NegotiationState::Stable;
        self.check_negotiation_needed();
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.ensure_open()?;
        if self.state != NegotiationState::HaveLocalOffer {
            bail!("nothing to roll back in state {}", self.state);
        }

        self.offered.clear();
        self.state = NegotiationState::Stable;
        self.check_negotiation_needed();
        Ok(())
    }

    async fn add_track(&mut self, track: &LocalTrack, stream: &MediaStream) -> anyhow::Result<()> {
        self.ensure_open()?;
        if self.senders.iter().any(|(t, _)| t.id == track.id) {
            bail!("track {} already has a sender", track.id);
        }

        self.senders.push((track.clone(), stream.id.clone()));
        self.check_negotiation_needed();
        Ok(())
    }

    async fn senders(&self) -> Vec<TrackId> {
        self.senders.iter().map(|(t, _)| t.id.clone()).collect()
    }

    fn events(&mut self) -> BoxStream<'static, PeerEvent> {
        let Some(rx) = self.events_rx.take() else {
            return futures::stream::empty().boxed();
        };

        // a queued negotiation-needed is stale once a description covers every track
        let needed = self.needs_negotiation.clone();
        UnboundedReceiverStream::new(rx)
            .filter(move |event| {
                let keep = match event {
                    PeerEvent::NegotiationNeeded => needed.load(Ordering::SeqCst),
                    PeerEvent::Track(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed()
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.state = NegotiationState::Closed;
        self.senders.clear();
        self.needs_negotiation.store(false, Ordering::SeqCst);
        self.events_tx = None;
        Ok(())
    }
}

fn parse_tracks(sdp: &str) -> Vec<RemoteTrack> {
    sdp.lines()
        .filter_map(|line| line.strip_prefix(MSID_PREFIX))
        .filter_map(|rest| {
            let mut parts = rest.split_whitespace();
            let stream_id = parts.next()?;
            let id = parts.next()?;
            let kind = TrackKind::parse(parts.next()?)?;
            Some(RemoteTrack {
                id: TrackId::from(id),
                kind,
                stream_id: stream_id.to_owned(),
            })
        })
        .collect()
}

/// Builds `SimPeer`s and counts how many it built.
#[derive(Clone, Default)]
pub struct SimPeerFactory {
    created: Arc<AtomicUsize>,
}

impl SimPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerFactory for SimPeerFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn PeerConnection>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimPeer::new()))
    }
}

/// Synthetic camera and microphone. Every acquisition yields a new stream
/// with fresh track ids.
#[derive(Clone)]
pub struct SimMedia {
    label: String,
    denied: bool,
    acquired: Arc<AtomicU64>,
}

impl SimMedia {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            denied: false,
            acquired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Devices that always refuse access.
    pub fn denied(label: impl Into<String>) -> Self {
        Self {
            denied: true,
            ..Self::new(label)
        }
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for SimMedia {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, CallError> {
        if self.denied {
            return Err(CallError::MediaAccessDenied(format!(
                "{}: permission refused",
                self.label
            )));
        }

        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        let stream_id = format!("{}-{}", self.label, n);
        let mut tracks = Vec::new();
        for (wanted, kind) in [
            (constraints.audio, TrackKind::Audio),
            (constraints.video, TrackKind::Video),
        ] {
            if wanted {
                tracks.push(LocalTrack {
                    id: TrackId(Uuid::new_v4().to_string()),
                    kind,
                    label: format!("{} {}", self.label, kind.as_str()),
                });
            }
        }

        Ok(MediaStream {
            id: stream_id,
            tracks,
        })
    }
}
