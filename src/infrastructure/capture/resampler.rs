//! Streaming conversion of device audio to 16kHz mono

use rubato::{FftFixedIn, Resampler};

use super::ogg_opus::TARGET_SAMPLE_RATE;

const CHUNK_SIZE: usize = 1024;

/// Resamples a continuous mono stream to 16kHz.
///
/// Input that does not fill a resampler chunk is held until the next call
/// so slice boundaries do not introduce gaps.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32) -> Result<Self, ResampleError> {
        if source_rate == TARGET_SAMPLE_RATE {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        let inner = FftFixedIn::<f32>::new(
            source_rate as usize,
            TARGET_SAMPLE_RATE as usize,
            CHUNK_SIZE,
            2, // Sub-chunks
            1, // Mono
        )
        .map_err(|e| ResampleError(format!("Resampler init failed: {}", e)))?;

        Ok(Self {
            inner: Some(inner),
            pending: Vec::new(),
        })
    }

    /// Resample as much of the buffered input as fills whole chunks
    pub fn process(&mut self, samples: &[i16]) -> Result<Vec<i16>, ResampleError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending
            .extend(samples.iter().map(|&s| s as f32 / 32768.0));

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let resampled = resampler
                .process(&[chunk], None)
                .map_err(|e| ResampleError(format!("Resampling failed: {}", e)))?;
            output.extend(resampled[0].iter().map(|&s| to_i16(s)));
        }
        Ok(output)
    }

    /// Pad the held input with silence and resample it
    pub fn flush(&mut self) -> Result<Vec<i16>, ResampleError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let held = self.pending.len();
        let needed = resampler.input_frames_next();
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(needed.max(held), 0.0);

        let resampled = resampler
            .process(&[chunk], None)
            .map_err(|e| ResampleError(format!("Resampling failed: {}", e)))?;

        // Drop the output produced by the padding
        let ratio = resampled[0].len() as f64 / needed.max(held) as f64;
        let keep = (held as f64 * ratio).ceil() as usize;
        Ok(resampled[0].iter().take(keep).map(|&s| to_i16(s)).collect())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Average interleaved channels into a single channel
pub fn stereo_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / chunk.len() as i32) as i16
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ResampleError(String);
