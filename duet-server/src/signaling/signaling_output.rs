use async_trait::async_trait;
use duet_core::{ConnectionId, RelaySignal};

/// Outbound half of the relay: how rooms reach connected clients.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Deliver one signal to one connection. Connections that are gone are
    /// skipped without an error.
    async fn send(&self, to: ConnectionId, signal: RelaySignal);
}
