use crate::model::connection::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member of a room. Owned by the room it joined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ConnectionId,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(id: ConnectionId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            joined_at: Utc::now(),
        }
    }
}
