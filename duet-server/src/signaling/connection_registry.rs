use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::{ConnectionId, RelaySignal};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Live signaling connections, keyed by their relay-assigned id.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    peers: Arc<DashMap<ConnectionId, mpsc::UnboundedSender<RelaySignal>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: ConnectionId, tx: mpsc::UnboundedSender<RelaySignal>) {
        self.peers.insert(id, tx);
    }

    pub fn remove(&self, id: &ConnectionId) {
        self.peers.remove(id);
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns `false` when the addressee is unknown or already gone.
    pub fn deliver(&self, to: ConnectionId, signal: RelaySignal) -> bool {
        let Some(peer) = self.peers.get(&to) else {
            debug!("Dropping {} for departed connection {}", signal.kind(), to);
            return false;
        };
        if let Err(e) = peer.send(signal) {
            error!("Failed to queue signal for {}: {}", to, e);
            return false;
        }
        true
    }
}

#[async_trait]
impl SignalingOutput for ConnectionRegistry {
    async fn send(&self, to: ConnectionId, signal: RelaySignal) {
        self.deliver(to, signal);
    }
}
