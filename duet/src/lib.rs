//! One-to-one video calling over a tiny signaling relay.
//!
//! `server` holds the relay (rooms capped at two participants by default),
//! `client` holds the call session, its negotiation engine and the
//! WebRTC and in-process peer backends. Both are behind features of the
//! same name; `full` enables both.

pub use duet_core::model::{ConnectionId, RoomId, SessionDescription};

pub mod model {
    pub use duet_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use duet_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use duet_client::*;
}

#[cfg(feature = "client")]
pub use duet_client::{CallCommand, CallSession, SessionEvent, SignalingBus};
