//! Recording value objects

mod audio_data;
mod duration;

pub use audio_data::{format_size, AudioData, AudioMimeType};
pub use duration::{Duration, DEFAULT_MAX_DURATION_SECS};
