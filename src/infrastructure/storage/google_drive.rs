//! Google Drive uploader adapter

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::application::ports::{AuthProvider, StorageUploader, UploadError, UploadReceipt};
use crate::domain::recording::AudioData;

/// Google APIs base URL
const API_BASE_URL: &str = "https://www.googleapis.com";

/// MIME type Drive uses for folders
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Boundary separating the metadata and media parts of an upload
const MULTIPART_BOUNDARY: &str = "-------314159265358979323846";

// Request types for the Drive API

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest<'a> {
    name: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    title: String,
    mime_type: String,
    parents: Vec<ParentReference>,
}

#[derive(Debug, Serialize)]
struct ParentReference {
    id: String,
}

// Response types for the Drive API

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Uploads recordings into a named Google Drive folder
pub struct GoogleDriveUploader {
    auth: Arc<dyn AuthProvider>,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleDriveUploader {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_base_url(auth, API_BASE_URL)
    }

    /// Point the uploader at a different API host
    pub fn with_base_url(auth: Arc<dyn AuthProvider>, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v2/files", self.base_url)
    }

    /// Return the id of the folder called `name`, creating it if missing
    pub async fn find_or_create_folder(&self, name: &str) -> Result<String, UploadError> {
        let token = self.auth.access_token().await?;

        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        let response = self
            .client
            .get(self.files_url())
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(|e| UploadError::RequestFailed(e.to_string()))?;

        let listing: FileList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::ParseError(e.to_string()))?;

        if let Some(folder) = listing.files.into_iter().find(|f| f.name == name) {
            debug!(folder = name, id = %folder.id, "found existing folder");
            return Ok(folder.id);
        }

        let response = self
            .client
            .post(self.files_url())
            .bearer_auth(&token)
            .json(&CreateFolderRequest {
                name,
                mime_type: FOLDER_MIME_TYPE,
            })
            .send()
            .await
            .map_err(|e| UploadError::RequestFailed(e.to_string()))?;

        let created: CreatedFile = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::ParseError(e.to_string()))?;

        info!(folder = name, id = %created.id, "created folder");
        Ok(created.id)
    }

    /// Build the metadata part for an upload
    fn build_metadata(audio: &AudioData, folder_id: &str, timestamp_ms: u128) -> FileMetadata {
        FileMetadata {
            title: format!("AUDIO-{}", timestamp_ms),
            mime_type: audio.mime_type().to_string(),
            parents: vec![ParentReference {
                id: folder_id.to_string(),
            }],
        }
    }

    /// Build the multipart/mixed body: JSON metadata, then base64 media
    fn build_multipart_body(
        metadata: &FileMetadata,
        audio: &AudioData,
    ) -> Result<String, UploadError> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| UploadError::RequestFailed(e.to_string()))?;
        let delimiter = format!("\r\n--{}\r\n", MULTIPART_BOUNDARY);
        let close_delimiter = format!("\r\n--{}--", MULTIPART_BOUNDARY);

        Ok(format!(
            "{delimiter}Content-Type: application/json\r\n\r\n{metadata_json}\
             {delimiter}Content-Type: {content_type}\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n{data}{close_delimiter}",
            content_type = audio.mime_type(),
            data = audio.to_base64(),
        ))
    }
}

#[async_trait]
impl StorageUploader for GoogleDriveUploader {
    async fn upload(
        &self,
        audio: &AudioData,
        folder_name: &str,
    ) -> Result<UploadReceipt, UploadError> {
        let folder_id = self.find_or_create_folder(folder_name).await?;
        let token = self.auth.access_token().await?;

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let metadata = Self::build_metadata(audio, &folder_id, timestamp_ms);
        let body = Self::build_multipart_body(&metadata, audio)?;

        debug!(
            title = %metadata.title,
            bytes = audio.size_bytes(),
            "uploading recording"
        );

        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/mixed; boundary=\"{}\"", MULTIPART_BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::RequestFailed(e.to_string()))?;

        let created: CreatedFile = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::ParseError(e.to_string()))?;

        Ok(UploadReceipt {
            file_id: created.id,
            folder_id,
        })
    }
}

/// Map HTTP failures onto upload errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UploadError::Unauthorized);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(UploadError::RateLimited);
    }

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(UploadError::ApiError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }

    Ok(response)
}

/// Escape a value for use inside a quoted Drive query string
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
