use crate::SignalingService;
use duet_core::{ClientSignal, ConnectionId, RelaySignal};
use tokio::sync::mpsc;
use tracing::debug;

/// An in-process signaling connection: the same ordering guarantees as a
/// socket, without the socket. Dropping `outgoing` disconnects.
pub struct LocalConnection {
    pub id: ConnectionId,
    pub outgoing: mpsc::UnboundedSender<ClientSignal>,
    pub incoming: mpsc::UnboundedReceiver<RelaySignal>,
}

impl SignalingService {
    pub fn connect_local(&self) -> LocalConnection {
        let (id, incoming) = self.connect();
        let (outgoing, mut client_rx) = mpsc::unbounded_channel::<ClientSignal>();

        let service = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = client_rx.recv().await {
                service.handle(id, signal).await;
            }
            debug!("Local connection {} closed", id);
            service.disconnect(id).await;
        });

        LocalConnection {
            id,
            outgoing,
            incoming,
        }
    }
}
