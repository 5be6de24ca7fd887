//! Application configuration value object

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::recording::Duration;

/// Drive folder recordings are uploaded into when none is configured
pub const DEFAULT_FOLDER_NAME: &str = "AUDIO RECORDING";

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub access_token: Option<String>,
    pub folder: Option<String>,
    pub duration: Option<String>,
    pub max_duration: Option<String>,
    pub upload: Option<bool>,
    pub output_dir: Option<String>,
    pub api_base_url: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            access_token: None,
            folder: Some(DEFAULT_FOLDER_NAME.to_string()),
            duration: None,
            max_duration: Some(Duration::default_max_duration().to_string()),
            upload: Some(true),
            output_dir: None,
            api_base_url: None,
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            access_token: other.access_token.or(self.access_token),
            folder: other.folder.or(self.folder),
            duration: other.duration.or(self.duration),
            max_duration: other.max_duration.or(self.max_duration),
            upload: other.upload.or(self.upload),
            output_dir: other.output_dir.or(self.output_dir),
            api_base_url: other.api_base_url.or(self.api_base_url),
        }
    }

    pub fn folder_or_default(&self) -> &str {
        self.folder
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_FOLDER_NAME)
    }

    /// Fixed recording length, if one is configured and valid
    pub fn duration(&self) -> Option<Duration> {
        self.duration.as_ref().and_then(|s| s.parse().ok())
    }

    /// Get max_duration as parsed Duration, or default if not set/invalid
    pub fn max_duration_or_default(&self) -> Duration {
        self.max_duration
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Duration::default_max_duration)
    }

    pub fn upload_or_default(&self) -> bool {
        self.upload.unwrap_or(true)
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir.as_ref().map(PathBuf::from)
    }
}
