
pub use participant::*;
