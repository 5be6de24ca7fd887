//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems like the microphone, Google Drive
//! and the local config file.

pub mod auth;
pub mod capture;
pub mod config;
pub mod storage;

// Re-export adapters
pub use auth::{TokenAuthProvider, ACCESS_TOKEN_ENV};
pub use capture::CpalPlatform;
pub use config::XdgConfigStore;
pub use storage::GoogleDriveUploader;
