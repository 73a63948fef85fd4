use crate::engine::{PeerConnection, PeerEvent, PeerFactory};
use crate::media::{LocalTrack, MediaStream, RemoteTrack, TrackId, TrackKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use duet_core::{IceServerConfig, NegotiationState, SessionDescription};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// How long to wait for ICE gathering before handing out a description.
/// Candidates travel inside the SDP; there is no trickle signal.
const GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// WebRTC settings for every peer connection a factory builds.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl PeerConfig {
    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// `PeerConnection` backed by the `webrtc` crate.
pub struct WebRtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
    local_tracks: Vec<Arc<TrackLocalStaticSample>>,
    events_rx: Option<mpsc::UnboundedReceiver<PeerEvent>>,
}

impl WebRtcPeer {
    pub async fn new(config: &PeerConfig) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(api.new_peer_connection(config.rtc_configuration()).await?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                Box::pin(async move {
                    info!("Peer connection state changed: {:?}", s);
                })
            },
        ));

        let track_tx = events_tx.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    other => {
                        warn!("Ignoring remote track of kind {:?}", other);
                        return;
                    }
                };
                let remote = RemoteTrack {
                    id: TrackId(track.id()),
                    kind,
                    stream_id: track.stream_id(),
                };
                debug!("Remote track {} arrived", remote.id);
                let _ = tx.send(PeerEvent::Track(remote));
            })
        }));

        let nego_tx = events_tx;
        peer_connection.on_negotiation_needed(Box::new(move || {
            let tx = nego_tx.clone();
            Box::pin(async move {
                let _ = tx.send(PeerEvent::NegotiationNeeded);
            })
        }));

        Ok(Self {
            peer_connection,
            local_tracks: Vec::new(),
            events_rx: Some(events_rx),
        })
    }

    /// Sample writer for a track attached with `add_track`, for feeding media.
    pub fn local_track(&self, id: &TrackId) -> Option<Arc<TrackLocalStaticSample>> {
        self.local_tracks.iter().find(|t| t.id() == id.0).cloned()
    }

    /// Local description once ICE gathering finished or timed out.
    async fn gathered_description(&self) -> Result<RTCSessionDescription> {
        let mut gathering_complete = self.peer_connection.gathering_complete_promise().await;
        if tokio::time::timeout(GATHER_TIMEOUT, gathering_complete.recv())
            .await
            .is_err()
        {
            warn!("ICE gathering timed out, sending what we have");
        }
        self.peer_connection
            .local_description()
            .await
            .context("No local description after ICE gathering")
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    fn signaling_state(&self) -> NegotiationState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                NegotiationState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                NegotiationState::HaveRemoteOffer
            }
            RTCSignalingState::Closed => NegotiationState::Closed,
            _ => NegotiationState::Stable,
        }
    }

    async fn get_offer(&mut self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer)
            .await
            .context("Failed to set local offer")?;

        let local = self.gathered_description().await?;
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn get_answer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        let remote = RTCSessionDescription::offer(offer.sdp)?;
        self.peer_connection
            .set_remote_description(remote)
            .await
            .context("Failed to set remote offer")?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        self.peer_connection
            .set_local_description(answer)
            .await
            .context("Failed to set local answer")?;

        let local = self.gathered_description().await?;
        Ok(SessionDescription::answer(local.sdp))
    }

    async fn set_remote_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp)?;
        self.peer_connection
            .set_remote_description(remote)
            .await
            .context("Failed to set remote answer")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut desc = self
            .peer_connection
            .pending_local_description()
            .await
            .context("No pending offer to roll back")?;
        desc.sdp_type = RTCSdpType::Rollback;
        self.peer_connection
            .set_local_description(desc)
            .await
            .context("Failed to roll back local offer")?;
        Ok(())
    }

    async fn add_track(&mut self, track: &LocalTrack, stream: &MediaStream) -> Result<()> {
        let mime_type = match track.kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            track.id.0.clone(),
            stream.id.clone(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .with_context(|| format!("Failed to add track {}", track.id))?;

        // RTCP has to be read for interceptors to run
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        self.local_tracks.push(local);
        Ok(())
    }

    async fn senders(&self) -> Vec<TrackId> {
        let mut ids = Vec::new();
        for sender in self.peer_connection.get_senders().await {
            if let Some(track) = sender.track().await {
                ids.push(TrackId(track.id().to_owned()));
            }
        }
        ids
    }

    fn events(&mut self) -> BoxStream<'static, PeerEvent> {
        match self.events_rx.take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    async fn close(&mut self) -> Result<()> {
        for sender in self.peer_connection.get_senders().await {
            if let Err(e) = self.peer_connection.remove_track(&sender).await {
                debug!("Failed to remove track on close: {}", e);
            }
        }
        self.local_tracks.clear();
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Builds a `WebRtcPeer` per call attempt.
#[derive(Debug, Clone, Default)]
pub struct WebRtcPeerFactory {
    config: PeerConfig,
}

impl WebRtcPeerFactory {
    pub fn new(config: PeerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self) -> Result<Box<dyn PeerConnection>> {
        Ok(Box::new(WebRtcPeer::new(&self.config).await?))
    }
}
