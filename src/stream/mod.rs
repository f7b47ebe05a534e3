//! Camera/microphone acquisition
//!
//! Requests a live capture handle with a progressive constraint ladder
//! (standard, low resolution, minimal), a bounded wait for the permission
//! prompt, and a single automatic retry on over-constrained failures.

pub mod acquirer;
pub mod constraints;
pub mod error;

pub use acquirer::StreamAcquirer;
pub use constraints::{AudioConstraints, ConstraintLevel, FacingMode, MediaConstraints, VideoConstraints};
pub use error::AcquisitionError;
