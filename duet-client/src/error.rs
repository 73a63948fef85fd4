use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// The media capability refused camera or microphone access.
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("signaling transport is gone")]
    SignalingDisconnected,

    #[error("no remote participant to call")]
    NoRemotePeer,

    #[error("peer connection failed: {0}")]
    PeerConnection(#[from] anyhow::Error),

    #[error("signaling transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed signal: {0}")]
    Codec(#[from] serde_json::Error),
}
