mod connection;
mod description;
mod event;
mod negotiation;
mod participant;
mod room;
mod signaling;

pub use connection::{ConnectionId, ParseConnectionIdError};
pub use description::{SdpType, SessionDescription};
pub use event::EventKind;
pub use negotiation::NegotiationState;
pub use participant::Participant;
pub use room::RoomId;
pub use signaling::{ClientSignal, IceServerConfig, RelaySignal};
