//! Application layer - Use cases and port interfaces
//!
//! Contains the capture controller, the upload use case and the trait
//! definitions for external system interactions.

pub mod capture;
pub mod ports;
pub mod upload;

// Re-export use cases
pub use capture::{CaptureController, CaptureError, CaptureHooks, TIME_SLICE};
pub use upload::UploadRecordingUseCase;
