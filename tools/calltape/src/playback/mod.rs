//! Sequential replay of a recorded event stream against a fresh backend.

pub mod driver;
pub mod listener;
pub mod state;

pub use driver::{PlaybackDriver, PlaybackReport};
pub use listener::{ContinueOnException, HaltOnException, LoggingListener, PlaybackListener};
pub use state::PlaybackState;
