//! Capture domain module
//!
//! State enums, the chunk buffer and the finished-recording artifact
//! used by the capture controller.

mod chunk_buffer;
mod finished;
mod state;

pub use chunk_buffer::ChunkBuffer;
pub use finished::{FinishedRecording, RecordingLocator};
pub use state::{
    CaptureAction, CompatibilityState, InvalidTransition, PermissionState, RecordingState,
};
