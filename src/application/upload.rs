//! Upload recording use case

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::capture::FinishedRecording;

use super::ports::{AuthProvider, StorageUploader, UploadError, UploadReceipt};

/// Persists finished recordings, but only for a signed-in account.
///
/// Follows the auth provider's status channel, so a sign-in or sign-out
/// after construction decides the next upload.
pub struct UploadRecordingUseCase<U>
where
    U: StorageUploader,
{
    uploader: U,
    signed_in: watch::Receiver<bool>,
    folder_name: String,
}

impl<U> UploadRecordingUseCase<U>
where
    U: StorageUploader,
{
    /// Create a new use case instance uploading into `folder_name`
    pub fn new<A: AuthProvider>(uploader: U, auth: A, folder_name: impl Into<String>) -> Self {
        Self {
            uploader,
            signed_in: auth.subscribe(),
            folder_name: folder_name.into(),
        }
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Whether an upload would currently be attempted
    pub fn is_signed_in(&self) -> bool {
        *self.signed_in.borrow()
    }

    /// Upload a finished recording into the configured folder
    pub async fn execute(
        &self,
        recording: &FinishedRecording,
    ) -> Result<UploadReceipt, UploadError> {
        if !self.is_signed_in() {
            warn!(locator = %recording.locator, "not signed in; skipping upload");
            return Err(UploadError::NotSignedIn);
        }

        if recording.audio.is_empty() {
            return Err(UploadError::EmptyRecording);
        }

        debug!(locator = %recording.locator, folder = %self.folder_name, "uploading recording");
        let receipt = self
            .uploader
            .upload(&recording.audio, &self.folder_name)
            .await?;

        info!(
            locator = %recording.locator,
            file_id = %receipt.file_id,
            folder = %self.folder_name,
            "recording uploaded"
        );
        Ok(receipt)
    }
}
