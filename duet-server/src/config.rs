use std::net::SocketAddr;

/// Admission rules applied by every room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomPolicy {
    /// `None` admits everyone and fans `user:joined` out to all members.
    pub max_participants: Option<usize>,
}

impl RoomPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_participants: None,
        }
    }

    pub fn admits(&self, current_members: usize) -> bool {
        self.max_participants
            .is_none_or(|max| current_members < max)
    }
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self {
            max_participants: Some(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub room: RoomPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            room: RoomPolicy::default(),
        }
    }
}
