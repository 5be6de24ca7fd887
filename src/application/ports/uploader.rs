//! Storage uploader port interface

use async_trait::async_trait;
use thiserror::Error;

use super::auth::AuthError;
use crate::domain::recording::AudioData;

/// Upload errors
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("Not signed in. Set DRIVE_ACCESS_TOKEN or run 'drive-recorder config set access_token <token>'")]
    NotSignedIn,

    #[error("Access token was rejected")]
    Unauthorized,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Recording is empty")]
    EmptyRecording,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Where an uploaded recording ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_id: String,
    pub folder_id: String,
}

/// Port for persisting finished recordings to cloud storage
#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Upload a recording into the named folder, creating it if needed.
    async fn upload(
        &self,
        audio: &AudioData,
        folder_name: &str,
    ) -> Result<UploadReceipt, UploadError>;
}
