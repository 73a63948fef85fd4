use crate::config::RoomPolicy;
use crate::room::{JoinOutcome, Room, RoomCommand};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use duet_core::{ConnectionId, Participant, RoomId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

const ROOM_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct RoomHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
    pub(crate) token: u64,
}

/// Registry of live rooms. Each room runs as its own actor task; the
/// directory only routes membership commands to it.
#[derive(Clone)]
pub struct RoomDirectory {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    next_token: Arc<AtomicU64>,
    policy: RoomPolicy,
    signaling: Arc<dyn SignalingOutput>,
}

impl RoomDirectory {
    pub fn new(policy: RoomPolicy, signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            next_token: Arc::new(AtomicU64::new(0)),
            policy,
            signaling,
        }
    }

    pub fn policy(&self) -> RoomPolicy {
        self.policy
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Admits `participant` into `room`, creating the room on first join.
    pub async fn join(&self, room: &RoomId, participant: Participant) -> JoinOutcome {
        loop {
            let handle = self.get_or_create(room);
            let (reply_tx, reply_rx) = oneshot::channel();
            let cmd = RoomCommand::Join {
                participant: participant.clone(),
                reply: reply_tx,
            };

            if handle.tx.send(cmd).await.is_err() {
                self.forget(room, handle.token);
                continue;
            }

            match reply_rx.await {
                Ok(JoinOutcome::Closed) | Err(_) => {
                    debug!("Room '{}' closed under a pending join, retrying", room);
                    self.forget(room, handle.token);
                }
                Ok(outcome) => return outcome,
            }
        }
    }

    pub async fn leave(&self, room: &RoomId, id: ConnectionId) {
        let Some(handle) = self.get(room) else {
            return;
        };
        let _ = handle.tx.send(RoomCommand::Leave { id }).await;
    }

    pub async fn members(&self, room: &RoomId) -> Vec<Participant> {
        let Some(handle) = self.get(room) else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if handle
            .tx
            .send(RoomCommand::Members { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    fn get(&self, room: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room).map(|entry| entry.value().clone())
    }

    fn get_or_create(&self, room: &RoomId) -> RoomHandle {
        self.rooms
            .entry(room.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room);
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
                let actor = Room::new(
                    room.clone(),
                    token,
                    self.policy,
                    rx,
                    self.signaling.clone(),
                    self.rooms.clone(),
                );
                tokio::spawn(actor.run());
                RoomHandle { tx, token }
            })
            .value()
            .clone()
    }

    fn forget(&self, room: &RoomId, token: u64) {
        self.rooms.remove_if(room, |_, handle| handle.token == token);
    }
}
