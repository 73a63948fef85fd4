mod bus;
mod engine;
mod error;
mod media;
mod rtc;
mod session;
pub mod sim;

pub use bus::*;
pub use engine::*;
pub use error::*;
pub use media::*;
pub use rtc::*;
pub use session::*;

#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
