//! Capture platform port interfaces
//!
//! A platform answers three questions for the capture controller: can this
//! host capture audio, may we use the microphone, and how do we drive a
//! recording session over the granted stream.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::capture::PermissionState;

/// Slot receiving encoded data fragments
pub type DataCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Slot receiving a lifecycle confirmation
pub type EventCallback = Box<dyn Fn() + Send + Sync>;

/// The fixed set of callback slots a media session exposes.
///
/// Sessions must deliver callbacks one at a time, in order, and never
/// deliver data after `on_stop`.
pub struct SessionCallbacks {
    pub on_data_available: DataCallback,
    pub on_start: EventCallback,
    pub on_stop: EventCallback,
    pub on_pause: EventCallback,
    pub on_resume: EventCallback,
}

impl SessionCallbacks {
    /// Callbacks that ignore every event
    pub fn noop() -> Self {
        Self {
            on_data_available: Box::new(|_| {}),
            on_start: Box::new(|| {}),
            on_stop: Box::new(|| {}),
            on_pause: Box::new(|| {}),
            on_resume: Box::new(|| {}),
        }
    }
}

/// Refusal reported by the platform's permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("Microphone access was denied")]
    Denied,

    #[error("Microphone access was denied permanently")]
    PermanentlyDenied,
}

impl AccessDenied {
    /// Permission state the refusal corresponds to
    pub const fn permission_state(self) -> PermissionState {
        match self {
            Self::Denied => PermissionState::Denied,
            Self::PermanentlyDenied => PermissionState::PermanentlyDenied,
        }
    }
}

/// Errors raised by a media session when it rejects a command
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session cannot {0} in its current state")]
    InvalidState(&'static str),

    #[error("Failed to start capture: {0}")]
    StartFailed(String),

    #[error("Capture session is closed")]
    Closed,
}

/// Live recording session bound to a granted audio stream.
///
/// `start` may block while the device opens; the other commands return
/// immediately. The platform confirms each transition later through the
/// registered callbacks.
pub trait MediaSession: Send + Sync {
    /// Install the callback slots, replacing any previous registration
    fn register(&self, callbacks: SessionCallbacks);

    /// Begin capture, delivering data every `time_slice`
    fn start(&self, time_slice: Duration) -> Result<(), SessionError>;

    fn stop(&self) -> Result<(), SessionError>;

    fn pause(&self) -> Result<(), SessionError>;

    fn resume(&self) -> Result<(), SessionError>;
}

/// Port for the host audio platform
#[async_trait]
pub trait CapturePlatform: Send + Sync {
    /// Handle to a granted microphone stream
    type Stream: Send + 'static;

    /// Session type built over a granted stream
    type Session: MediaSession + 'static;

    /// Whether the host can capture audio
    fn supports_audio_capture(&self) -> bool;

    /// Ask for microphone access.
    ///
    /// # Returns
    /// The granted stream, or the refusal the platform reported
    async fn request_audio_stream(&self) -> Result<Self::Stream, AccessDenied>;

    /// Build a recording session over a granted stream
    fn open_session(&self, stream: Self::Stream) -> Self::Session;
}
