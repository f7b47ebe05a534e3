//! Recorder session state machine
//!
//! This module provides the `RecordingSession` actor that sequences:
//! - Camera acquisition (with progressive fallback)
//! - Countdown pre-roll
//! - Chunked recording with duration cap and finalization
//! - Review, re-record and completion hand-off

mod config;
mod session;
mod snapshot;
mod status;

pub use config::SessionConfig;
pub use session::{CompletionCallback, RecordingSession, SessionHandle};
pub use snapshot::{progress, SessionEvent, SessionSnapshot};
pub use status::RecorderStatus;
