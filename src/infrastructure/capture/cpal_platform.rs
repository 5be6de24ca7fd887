//! Native capture platform backed by cpal
//!
//! Each started session runs on its own worker thread. The worker owns the
//! cpal input stream (which is not `Send`), turns captured PCM into Ogg Opus
//! once per time slice and reports every transition through the registered
//! callbacks. Commands reach it over a channel, so callbacks are delivered
//! in order from a single thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tracing::{debug, error, warn};

use super::ogg_opus::{EncodingError, OggOpusEncoder, TARGET_SAMPLE_RATE};
use super::resampler::{stereo_to_mono, ResampleError, StreamResampler};
use crate::application::ports::{
    AccessDenied, CapturePlatform, MediaSession, SessionCallbacks, SessionError,
};

/// Host audio platform using the default input device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalPlatform;

impl CpalPlatform {
    pub fn new() -> Self {
        Self
    }
}

/// Granted microphone: the device plus the configuration chosen for it
#[derive(Clone)]
pub struct MicrophoneStream {
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl MicrophoneStream {
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }
}

#[async_trait]
impl CapturePlatform for CpalPlatform {
    type Stream = MicrophoneStream;
    type Session = CpalSession;

    fn supports_audio_capture(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    async fn request_audio_stream(&self) -> Result<MicrophoneStream, AccessDenied> {
        let opened = tokio::task::spawn_blocking(open_default_input)
            .await
            .map_err(|e| {
                error!(error = %e, "microphone probe task failed");
                AccessDenied::Denied
            })?;

        opened.map_err(|reason| {
            warn!(%reason, "microphone unavailable");
            AccessDenied::Denied
        })
    }

    fn open_session(&self, stream: MicrophoneStream) -> CpalSession {
        CpalSession::new(stream)
    }
}

/// Open the default input device and pick a configuration for it
fn open_default_input() -> Result<MicrophoneStream, String> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| "No audio input device found".to_string())?;
    let (config, sample_format) = select_input_config(&device)?;

    debug!(
        device = %device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        ?sample_format,
        "microphone granted"
    );

    Ok(MicrophoneStream {
        device,
        config,
        sample_format,
    })
}

/// Prefer i16/f32 configurations with the fewest channels that include 16kHz
fn select_input_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat), String> {
    let supported = device
        .supported_input_configs()
        .map_err(|e| format!("Failed to get configs: {}", e))?;

    let includes_target = |range: &cpal::SupportedStreamConfigRange| {
        range.min_sample_rate().0 <= TARGET_SAMPLE_RATE
            && range.max_sample_rate().0 >= TARGET_SAMPLE_RATE
    };

    let best = supported
        .filter(|range| matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .min_by_key(|range| (!includes_target(range), range.channels()))
        .ok_or_else(|| "No suitable config found".to_string())?;

    let sample_rate = if includes_target(&best) {
        SampleRate(TARGET_SAMPLE_RATE)
    } else {
        best.min_sample_rate()
    };

    Ok((
        StreamConfig {
            channels: best.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        },
        best.sample_format(),
    ))
}

enum Command {
    Pause,
    Resume,
    Stop,
}

/// Recording session over a granted microphone
pub struct CpalSession {
    input: Mutex<MicrophoneStream>,
    callbacks: Mutex<Arc<SessionCallbacks>>,
    worker: Mutex<Option<mpsc::Sender<Command>>>,
}

impl CpalSession {
    fn new(input: MicrophoneStream) -> Self {
        Self {
            input: Mutex::new(input),
            callbacks: Mutex::new(Arc::new(SessionCallbacks::noop())),
            worker: Mutex::new(None),
        }
    }

    fn send(&self, command: Command, action: &'static str) -> Result<(), SessionError> {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = worker.as_ref().ok_or(SessionError::InvalidState(action))?;
        sender.send(command).map_err(|_| SessionError::Closed)
    }
}

impl MediaSession for CpalSession {
    fn register(&self, callbacks: SessionCallbacks) {
        *self.callbacks.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(callbacks);
    }

    fn start(&self, time_slice: Duration) -> Result<(), SessionError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(SessionError::InvalidState("start"));
        }

        let input = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let callbacks = Arc::clone(&self.callbacks.lock().unwrap_or_else(PoisonError::into_inner));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("capture-session".to_string())
            .spawn(move || run_worker(input, time_slice, callbacks, command_rx, ready_tx))
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        // Wait until the device is open so failures surface here
        ready_rx
            .recv()
            .map_err(|_| SessionError::StartFailed("capture worker exited".to_string()))??;

        *worker = Some(command_tx);
        Ok(())
    }

    fn stop(&self) -> Result<(), SessionError> {
        let sender = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SessionError::InvalidState("stop"))?;
        sender.send(Command::Stop).map_err(|_| SessionError::Closed)
    }

    fn pause(&self) -> Result<(), SessionError> {
        self.send(Command::Pause, "pause")
    }

    fn resume(&self) -> Result<(), SessionError> {
        self.send(Command::Resume, "resume")
    }
}

/// Source of captured mono PCM at the device rate
trait PcmSource {
    /// Take everything captured since the last call
    fn drain(&mut self) -> Vec<i16>;

    fn set_paused(&self, paused: bool);
}

/// Live cpal input stream feeding a shared buffer
struct DeviceCapture {
    _stream: cpal::Stream,
    buffer: Arc<Mutex<Vec<i16>>>,
    paused: Arc<AtomicBool>,
}

impl DeviceCapture {
    fn open(input: &MicrophoneStream) -> Result<Self, SessionError> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let channels = input.channels();

        let sink = {
            let buffer = Arc::clone(&buffer);
            let paused = Arc::clone(&paused);
            move |data: &[i16]| {
                if paused.load(Ordering::SeqCst) {
                    return;
                }
                let mono = stereo_to_mono(data, channels);
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&mono);
            }
        };
        let on_error = |err: cpal::StreamError| error!(error = %err, "audio stream error");

        let stream = match input.sample_format {
            SampleFormat::I16 => input.device.build_input_stream(
                &input.config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| sink(data),
                on_error,
                None,
            ),
            SampleFormat::F32 => input.device.build_input_stream(
                &input.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> =
                        data.iter().map(|&s| (s * 32767.0) as i16).collect();
                    sink(&converted)
                },
                on_error,
                None,
            ),
            other => {
                return Err(SessionError::StartFailed(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            buffer,
            paused,
        })
    }
}

impl PcmSource for DeviceCapture {
    fn drain(&mut self) -> Vec<i16> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Encode(#[from] EncodingError),
}

/// Device PCM to Ogg Opus fragments
struct SlicePipeline {
    resampler: StreamResampler,
    encoder: OggOpusEncoder,
}

impl SlicePipeline {
    fn new(source_rate: u32) -> Result<Self, PipelineError> {
        Ok(Self {
            resampler: StreamResampler::new(source_rate)?,
            encoder: OggOpusEncoder::new()?,
        })
    }

    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, PipelineError> {
        let resampled = self.resampler.process(samples)?;
        Ok(self.encoder.encode(&resampled)?)
    }

    fn finish(&mut self, samples: &[i16]) -> Result<Vec<u8>, PipelineError> {
        let mut fragment = self.encode(samples)?;
        let tail = self.resampler.flush()?;
        fragment.extend(self.encoder.encode(&tail)?);
        fragment.extend(self.encoder.finish()?);
        Ok(fragment)
    }
}

fn run_worker(
    input: MicrophoneStream,
    time_slice: Duration,
    callbacks: Arc<SessionCallbacks>,
    commands: mpsc::Receiver<Command>,
    ready: mpsc::Sender<Result<(), SessionError>>,
) {
    let opened = SlicePipeline::new(input.sample_rate())
        .map_err(|e| SessionError::StartFailed(e.to_string()))
        .and_then(|pipeline| DeviceCapture::open(&input).map(|capture| (capture, pipeline)));

    match opened {
        Ok((capture, pipeline)) => {
            let _ = ready.send(Ok(()));
            drive(capture, pipeline, time_slice, &callbacks, &commands);
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

/// Run one recording until stopped or abandoned
fn drive<S: PcmSource>(
    mut source: S,
    mut pipeline: SlicePipeline,
    time_slice: Duration,
    callbacks: &SessionCallbacks,
    commands: &mpsc::Receiver<Command>,
) {
    let emit = |result: Result<Vec<u8>, PipelineError>| match result {
        Ok(fragment) if !fragment.is_empty() => (callbacks.on_data_available)(fragment),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to encode captured audio"),
    };

    (callbacks.on_start)();
    let mut next_slice = Instant::now() + time_slice;

    loop {
        let timeout = next_slice.saturating_duration_since(Instant::now());
        match commands.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                next_slice += time_slice;
                emit(pipeline.encode(&source.drain()));
            }
            Ok(Command::Pause) => {
                source.set_paused(true);
                (callbacks.on_pause)();
            }
            Ok(Command::Resume) => {
                source.set_paused(false);
                (callbacks.on_resume)();
            }
            Ok(Command::Stop) => {
                let remaining = source.drain();
                drop(source);
                emit(pipeline.finish(&remaining));
                (callbacks.on_stop)();
                debug!("capture session stopped");
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("capture session abandoned");
                return;
            }
        }
    }
}
