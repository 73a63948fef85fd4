use std::fmt;

/// Named relay-to-client events a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinAck,
    RoomFull,
    UserJoined,
    UserLeft,
    IncomingCall,
    CallAccepted,
    NegotiationNeeded,
    NegotiationDone,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::JoinAck,
        EventKind::RoomFull,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::IncomingCall,
        EventKind::CallAccepted,
        EventKind::NegotiationNeeded,
        EventKind::NegotiationDone,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::JoinAck => "room:join",
            EventKind::RoomFull => "room:full",
            EventKind::UserJoined => "user:joined",
            EventKind::UserLeft => "user:left",
            EventKind::IncomingCall => "incomming:call",
            EventKind::CallAccepted => "call:accepted",
            EventKind::NegotiationNeeded => "peer:nego:needed",
            EventKind::NegotiationDone => "peer:nego:done",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
