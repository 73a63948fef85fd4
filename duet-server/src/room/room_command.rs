use duet_core::{ConnectionId, Participant};
use tokio::sync::oneshot;

/// Commands a room actor accepts from the directory.
#[derive(Debug)]
pub enum RoomCommand {
    /// A connection asks to become a member.
    Join {
        participant: Participant,
        reply: oneshot::Sender<JoinOutcome>,
    },

    /// A member leaves, explicitly or because its socket dropped.
    Leave { id: ConnectionId },

    /// Current membership, in join order.
    Members {
        reply: oneshot::Sender<Vec<Participant>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Admitted,
    AlreadyMember,
    Full,
    /// The room emptied and detached while the join was queued.
    /// The directory retries against a fresh room; callers never see this.
    Closed,
}
