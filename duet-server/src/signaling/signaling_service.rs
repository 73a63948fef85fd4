use crate::config::RoomPolicy;
use crate::room::{JoinOutcome, RoomDirectory};
use crate::signaling::ConnectionRegistry;
use dashmap::DashMap;
use duet_core::{ClientSignal, ConnectionId, Participant, RelaySignal, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Entry point for every inbound signal, whatever the transport.
#[derive(Clone)]
pub struct SignalingService {
    connections: ConnectionRegistry,
    memberships: Arc<DashMap<ConnectionId, RoomId>>,
    directory: RoomDirectory,
}

impl SignalingService {
    pub fn new(policy: RoomPolicy) -> Self {
        let connections = ConnectionRegistry::new();
        let directory = RoomDirectory::new(policy, Arc::new(connections.clone()));
        Self {
            connections,
            memberships: Arc::new(DashMap::new()),
            directory,
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<RoomId> {
        self.memberships.get(id).map(|entry| entry.value().clone())
    }

    /// Registers a new connection and returns the stream of signals addressed to it.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<RelaySignal>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.add(id, tx);
        debug!("Connection {} registered", id);
        (id, rx)
    }

    /// Signals from one connection must be handled one at a time, in order.
    pub async fn handle(&self, from: ConnectionId, signal: ClientSignal) {
        match signal {
            ClientSignal::Join { email, room } => {
                let previous = self.memberships.insert(from, room.clone());
                if let Some(previous) = previous.filter(|previous| *previous != room) {
                    self.directory.leave(&previous, from).await;
                }

                info!("{} <{}> wants to join room '{}'", from, email, room);
                let participant = Participant::new(from, email);
                match self.directory.join(&room, participant).await {
                    JoinOutcome::Admitted | JoinOutcome::AlreadyMember => {}
                    JoinOutcome::Full | JoinOutcome::Closed => {
                        self.memberships.remove_if(&from, |_, current| *current == room);
                    }
                }
            }

            ClientSignal::Leave => {
                if let Some((_, room)) = self.memberships.remove(&from) {
                    self.directory.leave(&room, from).await;
                }
            }

            addressed => {
                let event = addressed.event_name();
                if let Some((to, relayed)) = addressed.into_relayed(from) {
                    debug!("Relaying {} from {} to {}", event, from, to);
                    self.connections.deliver(to, relayed);
                }
            }
        }
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        self.connections.remove(&id);
        if let Some((_, room)) = self.memberships.remove(&id) {
            self.directory.leave(&room, id).await;
        }
        debug!("Connection {} unregistered", id);
    }
}
