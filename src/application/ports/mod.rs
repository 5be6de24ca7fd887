//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod auth;
pub mod config;
pub mod platform;
pub mod uploader;

// Re-export common types
pub use auth::{AuthError, AuthProvider};
pub use config::ConfigStore;
pub use platform::{
    AccessDenied, CapturePlatform, DataCallback, EventCallback, MediaSession, SessionCallbacks,
    SessionError,
};
pub use uploader::{StorageUploader, UploadError, UploadReceipt};
