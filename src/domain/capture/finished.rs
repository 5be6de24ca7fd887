//! Finished-recording artifact handed to the caller on stop

use std::fmt;

use uuid::Uuid;

use crate::domain::recording::AudioData;

/// Opaque address under which a finished recording can be played back
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingLocator(String);

impl RecordingLocator {
    /// Mint a fresh, unique locator
    pub fn generate() -> Self {
        Self(format!("recording:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stopped recording: its locator plus the raw payload
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub locator: RecordingLocator,
    pub audio: AudioData,
}

impl FinishedRecording {
    pub fn new(audio: AudioData) -> Self {
        Self {
            locator: RecordingLocator::generate(),
            audio,
        }
    }

    /// Suggested file name, e.g. `recording-<id>.ogg`
    pub fn file_name(&self) -> String {
        let id = self
            .locator
            .as_str()
            .strip_prefix("recording:")
            .unwrap_or(self.locator.as_str());
        format!("recording-{}.{}", id, self.audio.mime_type().extension())
    }
}
