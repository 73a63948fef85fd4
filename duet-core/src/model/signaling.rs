use crate::model::connection::ConnectionId;
use crate::model::description::SessionDescription;
use crate::model::event::EventKind;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientSignal {
    #[serde(rename = "room:join")]
    Join { email: String, room: RoomId },

    #[serde(rename = "room:leave")]
    Leave,

    #[serde(rename = "call:user")]
    CallOffer {
        to: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "call:accepted")]
    CallAnswer {
        to: ConnectionId,
        ans: SessionDescription,
    },

    #[serde(rename = "peer:nego:needed")]
    NegotiationOffer {
        to: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "peer:nego:done")]
    NegotiationAnswer {
        to: ConnectionId,
        ans: SessionDescription,
    },
}

/// Messages the relay delivers to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum RelaySignal {
    /// Acknowledges `room:join` to the joiner.
    #[serde(rename = "room:join")]
    JoinAck {
        email: String,
        room: RoomId,
        id: ConnectionId,
    },

    #[serde(rename = "room:full")]
    RoomFull { room: RoomId },

    #[serde(rename = "user:joined")]
    Joined { email: String, id: ConnectionId },

    #[serde(rename = "user:left")]
    Left { email: String, id: ConnectionId },

    #[serde(rename = "incomming:call", alias = "incoming:call")]
    CallOffer {
        from: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "call:accepted")]
    CallAnswer {
        from: ConnectionId,
        ans: SessionDescription,
    },

    #[serde(rename = "peer:nego:needed")]
    NegotiationOffer {
        from: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "peer:nego:done")]
    NegotiationAnswer {
        from: ConnectionId,
        ans: SessionDescription,
    },
}

impl ClientSignal {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientSignal::Join { .. } => "room:join",
            ClientSignal::Leave => "room:leave",
            ClientSignal::CallOffer { .. } => "call:user",
            ClientSignal::CallAnswer { .. } => "call:accepted",
            ClientSignal::NegotiationOffer { .. } => "peer:nego:needed",
            ClientSignal::NegotiationAnswer { .. } => "peer:nego:done",
        }
    }

    /// Turns a point-to-point signal into what its addressee receives.
    /// Only the address is rewritten; descriptions are passed through as-is.
    /// Returns `None` for membership signals, which the relay handles itself.
    pub fn into_relayed(self, from: ConnectionId) -> Option<(ConnectionId, RelaySignal)> {
        match self {
            ClientSignal::CallOffer { to, offer } => {
                Some((to, RelaySignal::CallOffer { from, offer }))
            }
            ClientSignal::CallAnswer { to, ans } => Some((to, RelaySignal::CallAnswer { from, ans })),
            ClientSignal::NegotiationOffer { to, offer } => {
                Some((to, RelaySignal::NegotiationOffer { from, offer }))
            }
            ClientSignal::NegotiationAnswer { to, ans } => {
                Some((to, RelaySignal::NegotiationAnswer { from, ans }))
            }
            ClientSignal::Join { .. } | ClientSignal::Leave => None,
        }
    }
}

impl RelaySignal {
    pub fn kind(&self) -> EventKind {
        match self {
            RelaySignal::JoinAck { .. } => EventKind::JoinAck,
            RelaySignal::RoomFull { .. } => EventKind::RoomFull,
            RelaySignal::Joined { .. } => EventKind::UserJoined,
            RelaySignal::Left { .. } => EventKind::UserLeft,
            RelaySignal::CallOffer { .. } => EventKind::IncomingCall,
            RelaySignal::CallAnswer { .. } => EventKind::CallAccepted,
            RelaySignal::NegotiationOffer { .. } => EventKind::NegotiationNeeded,
            RelaySignal::NegotiationAnswer { .. } => EventKind::NegotiationDone,
        }
    }
}
