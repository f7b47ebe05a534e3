//! Chunked recording engine
//!
//! This module provides:
//! - `RecordingEngine`: one recorder instance per attempt, 1 Hz elapsed ticker,
//!   duration-capped auto-stop with a double flush
//! - `Stabilizer`: debounce deciding when trailing chunks have stopped arriving
//! - `OutputArtifact`: the finished recording assembled from a stable snapshot

mod artifact;
mod chunk;
mod engine;
mod error;
mod finalize;

pub use artifact::{ArtifactSummary, OutputArtifact};
pub use chunk::ChunkBuffer;
pub use engine::{AttemptId, EngineEvent, EngineEventKind, EngineSettings, RecordingEngine};
pub use error::RecordingError;
pub use finalize::{StabilityCheck, Stabilizer};
