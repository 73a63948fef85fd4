use crate::config::RoomPolicy;
use crate::room::room_command::{JoinOutcome, RoomCommand};
use crate::room::room_directory::RoomHandle;
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use duet_core::{ConnectionId, Participant, RelaySignal, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Room actor. Sole owner of one room's membership; every mutation
/// arrives through `command_rx` and is applied in order.
pub struct Room {
    id: RoomId,
    token: u64,
    members: Vec<Participant>,
    policy: RoomPolicy,
    command_rx: mpsc::Receiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        token: u64,
        policy: RoomPolicy,
        command_rx: mpsc::Receiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
        rooms: Arc<DashMap<RoomId, RoomHandle>>,
    ) -> Self {
        Self {
            id,
            token,
            members: Vec::new(),
            policy,
            command_rx,
            signaling,
            rooms,
        }
    }

    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.members.is_empty() {
                self.detach();
                break;
            }
        }

        self.drain().await;
        info!("Room '{}' event loop finished", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { participant, reply } => {
                let outcome = self.admit(participant).await;
                let _ = reply.send(outcome);
            }

            RoomCommand::Leave { id } => self.remove(id).await,

            RoomCommand::Members { reply } => {
                let _ = reply.send(self.members.clone());
            }
        }
    }

    async fn admit(&mut self, participant: Participant) -> JoinOutcome {
        let id = participant.id;

        if self.members.iter().any(|m| m.id == id) {
            debug!("{} re-joined room '{}'", id, self.id);
            self.ack(&participant).await;
            return JoinOutcome::AlreadyMember;
        }

        if !self.policy.admits(self.members.len()) {
            warn!(
                "Room '{}' is full ({} members), rejecting {}",
                self.id,
                self.members.len(),
                id
            );
            self.signaling
                .send(
                    id,
                    RelaySignal::RoomFull {
                        room: self.id.clone(),
                    },
                )
                .await;
            return JoinOutcome::Full;
        }

        info!("{} <{}> joined room '{}'", id, participant.email, self.id);

        for member in &self.members {
            self.signaling
                .send(
                    member.id,
                    RelaySignal::Joined {
                        email: participant.email.clone(),
                        id,
                    },
                )
                .await;
        }

        self.ack(&participant).await;
        self.members.push(participant);
        JoinOutcome::Admitted
    }

    async fn ack(&self, participant: &Participant) {
        self.signaling
            .send(
                participant.id,
                RelaySignal::JoinAck {
                    email: participant.email.clone(),
                    room: self.id.clone(),
                    id: participant.id,
                },
            )
            .await;
    }

    async fn remove(&mut self, id: ConnectionId) {
        let Some(pos) = self.members.iter().position(|m| m.id == id) else {
            return;
        };
        let left = self.members.remove(pos);
        info!("{} <{}> left room '{}'", left.id, left.email, self.id);

        for member in &self.members {
            self.signaling
                .send(
                    member.id,
                    RelaySignal::Left {
                        email: left.email.clone(),
                        id: left.id,
                    },
                )
                .await;
        }
    }

    /// Unregisters this room so the next join creates a fresh one.
    fn detach(&mut self) {
        let token = self.token;
        self.rooms.remove_if(&self.id, |_, handle| handle.token == token);
        self.command_rx.close();
        debug!("Room '{}' is empty, detached", self.id);
    }

    /// Answers whatever was queued before the channel closed.
    async fn drain(&mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RoomCommand::Join { reply, .. } => {
                    let _ = reply.send(JoinOutcome::Closed);
                }
                RoomCommand::Members { reply } => {
                    let _ = reply.send(Vec::new());
                }
                RoomCommand::Leave { .. } => {}
            }
        }
    }
}
