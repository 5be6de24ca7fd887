//! Domain layer - Core business logic
//!
//! Contains the capture state model, value objects and domain errors.
//! This layer has no dependencies on external systems.

pub mod capture;
pub mod config;
pub mod error;
pub mod recording;

// Re-export common types
pub use capture::{
    ChunkBuffer, CompatibilityState, FinishedRecording, PermissionState, RecordingLocator,
    RecordingState,
};
pub use config::AppConfig;
pub use error::*;
pub use recording::{AudioData, AudioMimeType, Duration};
