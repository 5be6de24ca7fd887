//! Main app runner for recording mode

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::ports::{AuthProvider, CapturePlatform, ConfigStore};
use crate::application::{CaptureController, CaptureError, CaptureHooks, UploadRecordingUseCase};
use crate::domain::capture::{CompatibilityState, FinishedRecording, RecordingState};
use crate::domain::config::AppConfig;
use crate::infrastructure::{
    CpalPlatform, GoogleDriveUploader, TokenAuthProvider, XdgConfigStore, ACCESS_TOKEN_ENV,
};

use super::args::RecordOptions;
use super::controls::{spawn_stdin_reader, ControlCommand, CONTROLS_HINT};
use super::presenter::Presenter;
use super::signals::ShutdownSignal;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// How often the progress line and the stop conditions are checked
const TICK: StdDuration = StdDuration::from_millis(200);

/// How long to wait for the session to confirm a stop
const STOP_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Run one recording with the native microphone
pub async fn run_record(options: RecordOptions) -> ExitCode {
    let mut presenter = Presenter::new();

    let (finished_tx, finished_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let hooks = CaptureHooks {
        on_stop: Some(Box::new(move |recording: FinishedRecording| {
            let _ = finished_tx.send(recording);
        })),
        on_recording_status_change: Some(Box::new(move |status: RecordingState| {
            let _ = status_tx.send(status);
        })),
        ..Default::default()
    };
    let controller = CaptureController::new(CpalPlatform::new(), hooks);

    let recording = match capture(&controller, &options, &mut presenter, status_rx, finished_rx)
        .await
    {
        Ok(recording) => recording,
        Err(e) => {
            presenter.stop_spinner();
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    presenter.success(&format!(
        "Recording complete ({})",
        recording.audio.human_readable_size()
    ));

    deliver(&recording, &options, &mut presenter).await
}

/// Errors that end a recording run before an artifact exists
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Recording ended without producing audio")]
    NoRecording,
}

/// Negotiate access, record until stopped and return the finished artifact
async fn capture<P: CapturePlatform>(
    controller: &CaptureController<P>,
    options: &RecordOptions,
    presenter: &mut Presenter,
    mut status_rx: mpsc::UnboundedReceiver<RecordingState>,
    mut finished_rx: mpsc::UnboundedReceiver<FinishedRecording>,
) -> Result<FinishedRecording, RunError> {
    if controller.check_compatibility() != CompatibilityState::Available {
        return Err(RunError::NoInputDevice);
    }
    controller.request_permission().await?;

    let shutdown = ShutdownSignal::new();
    shutdown.setup();

    let limit_ms = options.limit().as_millis();
    start_blocking(controller)?;
    presenter.start_spinner("Starting...");
    presenter.info(CONTROLS_HINT);

    let mut commands = spawn_stdin_reader();
    let mut ticker = tokio::time::interval(TICK);
    let mut state = RecordingState::Idle;
    let mut elapsed_ms: u64 = 0;
    let mut stopping = false;
    let mut stop_wait_ms: u64 = 0;

    loop {
        tokio::select! {
            Some(recording) = finished_rx.recv() => {
                presenter.stop_spinner();
                return Ok(recording);
            }
            Some(status) = status_rx.recv() => {
                debug!(%status, "recording status changed");
                state = status;
                presenter.recording_progress(state, elapsed_ms, limit_ms, controller.buffered_bytes());
            }
            Some(command) = commands.recv() => {
                if let Err(e) = apply(controller, command, &mut stopping) {
                    presenter.warn(&e.to_string());
                }
            }
            _ = ticker.tick() => {
                if state == RecordingState::Recording {
                    elapsed_ms += TICK.as_millis() as u64;
                }
                presenter.recording_progress(state, elapsed_ms, limit_ms, controller.buffered_bytes());

                if stopping {
                    stop_wait_ms += TICK.as_millis() as u64;
                    if stop_wait_ms >= STOP_TIMEOUT.as_millis() as u64 {
                        return Err(RunError::NoRecording);
                    }
                } else if state.is_active() && (shutdown.is_shutdown() || elapsed_ms >= limit_ms) {
                    apply(controller, ControlCommand::Stop, &mut stopping)?;
                }
            }
        }
    }
}

/// Start the recording without stalling the async worker.
///
/// A native session only returns from `start` once the input device is open.
fn start_blocking<P: CapturePlatform>(controller: &CaptureController<P>) -> Result<(), CaptureError> {
    tokio::task::block_in_place(|| controller.start_recording())
}

/// Forward an interactive command to the controller
fn apply<P: CapturePlatform>(
    controller: &CaptureController<P>,
    command: ControlCommand,
    stopping: &mut bool,
) -> Result<(), CaptureError> {
    match command {
        ControlCommand::Pause => controller.pause_recording(),
        ControlCommand::Resume => controller.resume_recording(),
        ControlCommand::Stop if *stopping => Ok(()),
        ControlCommand::Stop => {
            controller.stop_recording()?;
            *stopping = true;
            Ok(())
        }
    }
}

/// Outcome of the upload step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Uploaded,
    Skipped,
    Failed,
}

/// Save and upload a finished recording
async fn deliver(
    recording: &FinishedRecording,
    options: &RecordOptions,
    presenter: &mut Presenter,
) -> ExitCode {
    let mut exit = EXIT_SUCCESS;
    let mut saved = false;

    if let Some(ref path) = options.output {
        match save_recording(recording, path).await {
            Ok(()) => {
                presenter.success(&format!("Saved to {}", path.display()));
                presenter.output(&path.to_string_lossy());
                saved = true;
            }
            Err(e) => {
                presenter.error(&format!("Failed to write {}: {}", path.display(), e));
                exit = EXIT_ERROR;
            }
        }
    }

    let outcome = if options.upload {
        upload(recording, options, presenter).await
    } else {
        presenter.info("Upload disabled");
        UploadOutcome::Skipped
    };
    if outcome == UploadOutcome::Failed {
        exit = EXIT_ERROR;
    }

    // Never drop a recording that went nowhere
    if outcome != UploadOutcome::Uploaded && !saved {
        let path = fallback_path(recording, options.output_dir.as_deref());
        match save_recording(recording, &path).await {
            Ok(()) => {
                presenter.info(&format!("Saved locally to {}", path.display()));
                presenter.output(&path.to_string_lossy());
            }
            Err(e) => {
                presenter.error(&format!("Failed to write {}: {}", path.display(), e));
                exit = EXIT_ERROR;
            }
        }
    }

    ExitCode::from(exit)
}

/// Upload when signed in
async fn upload(
    recording: &FinishedRecording,
    options: &RecordOptions,
    presenter: &mut Presenter,
) -> UploadOutcome {
    let auth = Arc::new(TokenAuthProvider::new(options.access_token.clone()));
    let uploader = match options.api_base_url {
        Some(ref url) => GoogleDriveUploader::with_base_url(auth.clone(), url.as_str()),
        None => GoogleDriveUploader::new(auth.clone()),
    };
    let use_case = UploadRecordingUseCase::new(uploader, auth, options.folder.clone());

    if !use_case.is_signed_in() {
        presenter.warn(&format!(
            "Not signed in; skipping upload. Set {} or run 'drive-recorder auth sign-in <token>'",
            ACCESS_TOKEN_ENV
        ));
        return UploadOutcome::Skipped;
    }

    presenter.start_spinner(&format!("Uploading to '{}'...", use_case.folder_name()));
    match use_case.execute(recording).await {
        Ok(receipt) => {
            presenter.spinner_success(&format!(
                "Uploaded to '{}' (file id {})",
                use_case.folder_name(),
                receipt.file_id
            ));
            presenter.output(&receipt.file_id);
            UploadOutcome::Uploaded
        }
        Err(e) => {
            presenter.spinner_fail(&format!("Upload failed: {}", e));
            UploadOutcome::Failed
        }
    }
}

/// Where a recording goes when nothing else keeps it
fn fallback_path(recording: &FinishedRecording, output_dir: Option<&Path>) -> PathBuf {
    output_dir
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(recording.file_name())
}

async fn save_recording(recording: &FinishedRecording, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, recording.audio.data()).await
}

/// Load and merge configuration from file, env, and CLI
pub async fn load_merged_config<S: ConfigStore>(store: &S, cli_config: AppConfig) -> AppConfig {
    let file_config = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable config file");
            AppConfig::empty()
        }
    };

    let env_config = AppConfig {
        access_token: env::var(ACCESS_TOKEN_ENV).ok().filter(|s| !s.is_empty()),
        ..Default::default()
    };

    // Merge: defaults < file < env < cli
    AppConfig::defaults()
        .merge(file_config)
        .merge(env_config)
        .merge(cli_config)
}

/// Build the auth provider for the merged config
pub fn auth_provider(config: &AppConfig) -> TokenAuthProvider {
    let auth = TokenAuthProvider::new(config.access_token.clone());
    debug!(signed_in = auth.is_signed_in(), "auth provider ready");
    auth
}

/// Default config store location
pub fn config_store() -> XdgConfigStore {
    XdgConfigStore::new()
}
