use crate::bus::{SignalingBus, Subscription};
use crate::engine::{GlarePolicy, Guard, NegotiationEngine, PeerEvent, PeerFactory};
use crate::media::{MediaConstraints, MediaDevices, MediaStream, RemoteStream, RemoteTrack};
use crate::CallError;
use duet_core::{ClientSignal, ConnectionId, EventKind, RelaySignal, RoomId, SessionDescription};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AwaitingMedia,
    Connected,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub constraints: MediaConstraints,
    pub glare: GlarePolicy,
}

/// The other participant in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub id: ConnectionId,
    pub email: Option<String>,
}

/// What the UI sees.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    JoinedRoom { room: RoomId, id: ConnectionId },
    RoomFull { room: RoomId },
    PeerJoined { email: String, id: ConnectionId },
    PeerLeft { email: String, id: ConnectionId },
    IncomingCall { from: ConnectionId },
    LocalStream(MediaStream),
    RemoteStream(RemoteStream),
    CallEnded,
}

/// What the UI asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    Join { email: String, room: RoomId },
    Leave,
    StartCall,
    SendLocalStream,
    HangUp,
}

/// One participant's side of a call: lobby, media and negotiation, driven
/// by a single event loop.
pub struct CallSession {
    config: SessionConfig,
    bus: SignalingBus,
    signals: Subscription,
    media: Arc<dyn MediaDevices>,
    factory: Arc<dyn PeerFactory>,
    ui: mpsc::UnboundedSender<SessionEvent>,

    state: CallState,
    local_id: Option<ConnectionId>,
    room: Option<RoomId>,
    remote: Option<RemoteParticipant>,
    local_stream: Option<MediaStream>,
    remote_stream: Option<RemoteStream>,
    engine: Option<NegotiationEngine>,
    peer_events: Option<BoxStream<'static, PeerEvent>>,
}

impl CallSession {
    pub fn new(
        bus: SignalingBus,
        media: Arc<dyn MediaDevices>,
        factory: Arc<dyn PeerFactory>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (ui, ui_rx) = mpsc::unbounded_channel();
        let signals = bus.subscribe(&EventKind::ALL);

        let session = Self {
            config,
            bus,
            signals,
            media,
            factory,
            ui,
            state: CallState::Idle,
            local_id: None,
            room: None,
            remote: None,
            local_stream: None,
            remote_stream: None,
            engine: None,
            peer_events: None,
        };
        (session, ui_rx)
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn remote(&self) -> Option<&RemoteParticipant> {
        self.remote.as_ref()
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn engine(&self) -> Option<&NegotiationEngine> {
        self.engine.as_ref()
    }

    pub fn join_room(&mut self, email: impl Into<String>, room: RoomId) -> Result<(), CallError> {
        self.bus.emit(ClientSignal::Join {
            email: email.into(),
            room,
        })
    }

    pub async fn leave_room(&mut self) -> Result<(), CallError> {
        self.hang_up().await?;
        self.room = None;
        self.remote = None;
        self.bus.emit(ClientSignal::Leave)
    }

    pub async fn start_call(&mut self) -> Result<Guard, CallError> {
        let remote = self.remote.as_ref().ok_or(CallError::NoRemotePeer)?.id;
        let stream = self.acquire_media().await?;

        match self.offer_to(remote, &stream).await {
            Ok(guard) => {
                info!("Calling {}: {:?}", remote, guard);
                Ok(guard)
            }
            Err(e) => {
                if self.engine.is_none() {
                    warn!("No peer connection for the call: {}", e);
                    self.local_stream = None;
                    self.state = CallState::Idle;
                }
                Err(e)
            }
        }
    }

    async fn offer_to(
        &mut self,
        remote: ConnectionId,
        stream: &MediaStream,
    ) -> Result<Guard, CallError> {
        let engine = self.ensure_engine().await?;
        engine.initiate_call(remote, stream).await
    }

    /// Attaches any local track not yet sent. Returns how many were attached.
    pub async fn send_local_stream(&mut self) -> Result<usize, CallError> {
        let (Some(engine), Some(stream)) = (self.engine.as_mut(), self.local_stream.as_ref())
        else {
            return Ok(0);
        };
        engine.attach_tracks(stream).await
    }

    /// Tears the peer connection down and releases local media.
    pub async fn hang_up(&mut self) -> Result<(), CallError> {
        self.peer_events = None;
        self.local_stream = None;
        self.remote_stream = None;
        self.state = CallState::Idle;

        if let Some(mut engine) = self.engine.take() {
            info!("Hanging up");
            self.notify(SessionEvent::CallEnded);
            engine.close().await?;
        }
        Ok(())
    }

    /// Runs until the UI drops its command sender or the signaling
    /// transport goes away. Signals are handled in arrival order.
    ///
    /// Failed commands and signals are logged and the loop carries on; only
    /// losing the relay ends it, after hanging up. Hands the session back when
    /// the command channel closes; the call, if any, is still up and `hang_up`
    /// ends it.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<CallCommand>,
    ) -> Result<Self, CallError> {
        match self.event_loop(&mut commands).await {
            Ok(()) => Ok(self),
            Err(e) => {
                if let Err(close) = self.hang_up().await {
                    warn!("Failed to close peer connection: {}", close);
                }
                Err(e)
            }
        }
    }

    async fn event_loop(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<CallCommand>,
    ) -> Result<(), CallError> {
        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(signal) => absorb(self.handle_signal(signal).await)?,
                    None => {
                        warn!("Signaling transport lost");
                        return Err(CallError::SignalingDisconnected);
                    }
                },

                event = next_peer_event(&mut self.peer_events) => match event {
                    Some(event) => absorb(self.handle_peer_event(event).await)?,
                    None => self.peer_events = None,
                },

                command = commands.recv() => match command {
                    Some(command) => absorb(self.handle_command(command).await)?,
                    None => {
                        debug!("Command channel closed, leaving the loop");
                        return Ok(());
                    }
                },
            }
        }
    }

    pub async fn handle_command(&mut self, command: CallCommand) -> Result<(), CallError> {
        match command {
            CallCommand::Join { email, room } => self.join_room(email, room),
            CallCommand::Leave => self.leave_room().await,
            CallCommand::StartCall => self.start_call().await.map(|_| ()),
            CallCommand::SendLocalStream => self.send_local_stream().await.map(|_| ()),
            CallCommand::HangUp => self.hang_up().await,
        }
    }

    pub async fn handle_signal(&mut self, signal: RelaySignal) -> Result<(), CallError> {
        match signal {
            RelaySignal::JoinAck { email, room, id } => {
                info!("{} joined room '{}' as {}", email, room, id);
                self.local_id = Some(id);
                self.room = Some(room.clone());
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_local_id(Some(id));
                }
                self.notify(SessionEvent::JoinedRoom { room, id });
            }

            RelaySignal::RoomFull { room } => {
                warn!("Room '{}' is full", room);
                self.notify(SessionEvent::RoomFull { room });
            }

            RelaySignal::Joined { email, id } => {
                info!("{} joined as {}", email, id);
                self.remote = Some(RemoteParticipant {
                    id,
                    email: Some(email.clone()),
                });
                self.notify(SessionEvent::PeerJoined { email, id });
            }

            RelaySignal::Left { email, id } => {
                info!("{} left", email);
                if self.remote.as_ref().is_some_and(|r| r.id == id) {
                    self.hang_up().await?;
                    self.remote = None;
                }
                self.notify(SessionEvent::PeerLeft { email, id });
            }

            RelaySignal::CallOffer { from, offer } => {
                self.notify(SessionEvent::IncomingCall { from });
                self.handle_incoming_call(from, offer).await?;
            }

            RelaySignal::CallAnswer { from, ans } => match self.engine.as_mut() {
                Some(engine) => {
                    engine.handle_call_accepted(from, ans).await?;
                }
                None => debug!("Answer from {} with no call in progress", from),
            },

            RelaySignal::NegotiationOffer { from, offer } => match self.engine.as_mut() {
                Some(engine) => {
                    engine.handle_negotiation_offer(from, offer).await?;
                }
                None => debug!("Renegotiation from {} with no call in progress", from),
            },

            RelaySignal::NegotiationAnswer { from, ans } => match self.engine.as_mut() {
                Some(engine) => {
                    engine.handle_negotiation_answer(from, ans).await?;
                }
                None => debug!("Renegotiation answer from {} with no call in progress", from),
            },
        }
        Ok(())
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<(), CallError> {
        match event {
            PeerEvent::Track(track) => self.add_remote_track(track),
            PeerEvent::NegotiationNeeded => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.on_negotiation_needed().await?;
                }
            }
        }
        Ok(())
    }

    /// Handles every peer event that is ready right now, without waiting.
    pub async fn drain_peer_events(&mut self) -> Result<usize, CallError> {
        let mut handled = 0;
        loop {
            let Some(events) = self.peer_events.as_mut() else {
                return Ok(handled);
            };
            match futures::FutureExt::now_or_never(events.next()) {
                Some(Some(event)) => {
                    self.handle_peer_event(event).await?;
                    handled += 1;
                }
                Some(None) => self.peer_events = None,
                None => return Ok(handled),
            }
        }
    }

    async fn handle_incoming_call(
        &mut self,
        from: ConnectionId,
        offer: SessionDescription,
    ) -> Result<(), CallError> {
        if self.remote.as_ref().is_none_or(|r| r.id != from) {
            self.remote = Some(RemoteParticipant {
                id: from,
                email: None,
            });
        }

        let stream = self.acquire_media().await?;
        let engine = self.ensure_engine().await?;
        engine.attach_tracks(&stream).await?;
        engine.handle_incoming_offer(from, offer).await?;
        Ok(())
    }

    fn add_remote_track(&mut self, track: RemoteTrack) {
        let changed = match self.remote_stream.as_mut() {
            Some(stream) if stream.id == track.stream_id => stream.add(track),
            _ => {
                self.remote_stream = Some(RemoteStream::new(track));
                true
            }
        };

        if let Some(stream) = self.remote_stream.as_ref().filter(|_| changed) {
            debug!("Remote stream {} has {} track(s)", stream.id, stream.tracks.len());
            self.state = CallState::Connected;
            self.notify(SessionEvent::RemoteStream(stream.clone()));
        }
    }

    async fn acquire_media(&mut self) -> Result<MediaStream, CallError> {
        if let Some(stream) = &self.local_stream {
            return Ok(stream.clone());
        }

        if self.state == CallState::Idle {
            self.state = CallState::AwaitingMedia;
        }
        let stream = match self.media.get_user_media(self.config.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Media acquisition failed: {}", e);
                self.state = CallState::Idle;
                return Err(e);
            }
        };

        self.local_stream = Some(stream.clone());
        self.notify(SessionEvent::LocalStream(stream.clone()));
        Ok(stream)
    }

    async fn ensure_engine(&mut self) -> Result<&mut NegotiationEngine, CallError> {
        if self.engine.is_none() {
            let peer = self.factory.create().await?;
            let mut engine = NegotiationEngine::new(peer, self.bus.sender(), self.config.glare);
            engine.set_local_id(self.local_id);
            self.peer_events = Some(engine.events());
            self.engine = Some(engine);
        }
        self.engine
            .as_mut()
            .ok_or_else(|| CallError::PeerConnection(anyhow::anyhow!("peer connection missing")))
    }

    fn notify(&self, event: SessionEvent) {
        if self.ui.send(event).is_err() {
            debug!("UI receiver dropped");
        }
    }
}

fn absorb(result: Result<(), CallError>) -> Result<(), CallError> {
    match result {
        Err(CallError::SignalingDisconnected) => Err(CallError::SignalingDisconnected),
        Err(e) => {
            warn!("{}", e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

async fn next_peer_event(events: &mut Option<BoxStream<'static, PeerEvent>>) -> Option<PeerEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
