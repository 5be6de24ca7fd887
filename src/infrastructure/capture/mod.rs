//! Native microphone capture
//!
//! Implements the capture platform port with cpal, emitting Ogg Opus.

mod cpal_platform;
mod ogg_opus;
mod resampler;

pub use cpal_platform::{CpalPlatform, CpalSession, MicrophoneStream};
pub use ogg_opus::{EncodingError, OggOpusEncoder, FRAME_SIZE, TARGET_SAMPLE_RATE};
