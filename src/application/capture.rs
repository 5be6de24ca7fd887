//! Capture controller
//!
//! Owns compatibility and permission negotiation with the platform and the
//! recording lifecycle of the session it obtains. The controller never spawns
//! work of its own: it reacts to the permission future and to the callbacks
//! of the current media session, which may fire on platform threads.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::capture::{
    CaptureAction, ChunkBuffer, CompatibilityState, FinishedRecording, InvalidTransition,
    PermissionState, RecordingState,
};
use crate::domain::recording::AudioMimeType;

use super::ports::{AccessDenied, CapturePlatform, MediaSession, SessionCallbacks, SessionError};

/// Interval at which the session is asked to deliver data
pub const TIME_SLICE: Duration = Duration::from_millis(1000);

/// Media type of every finished recording
pub const RECORDING_MIME_TYPE: AudioMimeType = AudioMimeType::OggOpus;

/// Errors from the capture controller
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Audio capture is not available on this host")]
    NotCompatible,

    #[error("No capture session. Request microphone permission first")]
    SessionNotReady,

    #[error("Microphone permission has not been requested")]
    PermissionNotRequested,

    #[error("Microphone access was denied")]
    PermissionDenied,

    #[error("Microphone access was denied permanently")]
    PermissionPermanentlyDenied,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Capture session error: {0}")]
    Session(#[from] SessionError),
}

impl CaptureError {
    /// The denial carried by a refused permission request
    pub fn permission_state(&self) -> Option<PermissionState> {
        match self {
            Self::PermissionDenied => Some(PermissionState::Denied),
            Self::PermissionPermanentlyDenied => Some(PermissionState::PermanentlyDenied),
            _ => None,
        }
    }
}

impl From<AccessDenied> for CaptureError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::Denied => Self::PermissionDenied,
            AccessDenied::PermanentlyDenied => Self::PermissionPermanentlyDenied,
        }
    }
}

pub type LifecycleCallback = Box<dyn Fn() + Send + Sync>;
pub type StopCallback = Box<dyn Fn(FinishedRecording) + Send + Sync>;
pub type StatusCallback = Box<dyn Fn(RecordingState) + Send + Sync>;

/// Caller hooks, fixed at construction.
///
/// A panic inside any hook is caught and logged. It never reaches the
/// platform and never changes controller state.
#[derive(Default)]
pub struct CaptureHooks {
    pub on_start: Option<LifecycleCallback>,
    /// Receives the single artifact produced by each stop
    pub on_stop: Option<StopCallback>,
    pub on_pause: Option<LifecycleCallback>,
    pub on_resume: Option<LifecycleCallback>,
    /// Called with the new state on every confirmed transition
    pub on_recording_status_change: Option<StatusCallback>,
}

struct CaptureState<S> {
    compatibility: CompatibilityState,
    permission: PermissionState,
    recording: RecordingState,
    chunks: ChunkBuffer,
    session: Option<Arc<S>>,
    /// Bumped whenever the session is replaced; stale callbacks are dropped
    generation: u64,
}

impl<S> Default for CaptureState<S> {
    fn default() -> Self {
        Self {
            compatibility: CompatibilityState::Unknown,
            permission: PermissionState::Unknown,
            recording: RecordingState::Idle,
            chunks: ChunkBuffer::new(),
            session: None,
            generation: 0,
        }
    }
}

/// State reachable from session callbacks
struct Shared<S> {
    state: Mutex<CaptureState<S>>,
    hooks: CaptureHooks,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, CaptureState<S>> {
        // Hooks never run under this lock, so poisoning cannot leave
        // the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_data(&self, generation: u64, chunk: Vec<u8>) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, "dropping data from a replaced session");
            return;
        }
        state.chunks.push(chunk);
    }

    fn handle_transition(&self, generation: u64, next: RecordingState, action: CaptureAction) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(generation, %action, "ignoring confirmation from a replaced session");
                return;
            }
            state.recording = next;
        }
        info!(state = %next, "recording state changed");

        self.emit_status(next);
        let hook = match action {
            CaptureAction::Start => &self.hooks.on_start,
            CaptureAction::Pause => &self.hooks.on_pause,
            CaptureAction::Resume => &self.hooks.on_resume,
            CaptureAction::Stop => return,
        };
        if let Some(hook) = hook {
            run_hook(action.as_str(), || hook());
        }
    }

    fn handle_stop(&self, generation: u64) {
        let finished = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(generation, "ignoring stop from a replaced session");
                return;
            }
            state.recording = RecordingState::Idle;
            FinishedRecording::new(state.chunks.take_payload(RECORDING_MIME_TYPE))
        };
        info!(
            locator = %finished.locator,
            bytes = finished.audio.size_bytes(),
            "recording finished"
        );

        self.emit_status(RecordingState::Idle);
        if let Some(hook) = &self.hooks.on_stop {
            run_hook("stop recording", move || hook(finished));
        }
    }

    fn emit_status(&self, status: RecordingState) {
        if let Some(hook) = &self.hooks.on_recording_status_change {
            run_hook("recording status change", || hook(status));
        }
    }
}

/// Run a caller hook, swallowing any panic it raises
fn run_hook<F: FnOnce()>(name: &str, hook: F) {
    if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
        warn!(hook = name, "capture hook panicked; ignoring");
    }
}

/// Audio capture controller.
///
/// Drives one platform session at a time through
/// IDLE -> RECORDING <-> PAUSED -> IDLE and hands every finished recording
/// to the `on_stop` hook.
pub struct CaptureController<P: CapturePlatform> {
    platform: P,
    shared: Arc<Shared<P::Session>>,
}

impl<P: CapturePlatform> CaptureController<P> {
    /// Create a controller over a platform with the given hooks
    pub fn new(platform: P, hooks: CaptureHooks) -> Self {
        Self {
            platform,
            shared: Arc::new(Shared {
                state: Mutex::new(CaptureState::default()),
                hooks,
            }),
        }
    }

    pub fn compatibility(&self) -> CompatibilityState {
        self.shared.lock().compatibility
    }

    pub fn permission(&self) -> PermissionState {
        self.shared.lock().permission
    }

    pub fn recording_state(&self) -> RecordingState {
        self.shared.lock().recording
    }

    /// Number of fragments captured since the current recording started
    pub fn buffered_chunks(&self) -> usize {
        self.shared.lock().chunks.len()
    }

    /// Encoded bytes captured since the current recording started
    pub fn buffered_bytes(&self) -> usize {
        self.shared.lock().chunks.size_bytes()
    }

    /// Probe the platform for audio capture support and remember the answer
    pub fn check_compatibility(&self) -> CompatibilityState {
        let compatibility = if self.platform.supports_audio_capture() {
            CompatibilityState::Available
        } else {
            CompatibilityState::Unavailable
        };
        self.shared.lock().compatibility = compatibility;
        debug!(%compatibility, "checked audio capture compatibility");
        compatibility
    }

    /// Ask the platform for microphone access.
    ///
    /// On grant a new session replaces any existing one. There is no
    /// cancellation: when calls overlap, the last one to resolve wins.
    ///
    /// # Returns
    /// `Granted`, or the denial error matching what the platform reported
    pub async fn request_permission(&self) -> Result<PermissionState, CaptureError> {
        if self.compatibility() != CompatibilityState::Available {
            return Err(CaptureError::NotCompatible);
        }

        let stream = match self.platform.request_audio_stream().await {
            Ok(stream) => stream,
            Err(denied) => {
                let permission = denied.permission_state();
                self.shared.lock().permission = permission;
                warn!(%permission, "microphone access refused");
                return Err(denied.into());
            }
        };

        let session = Arc::new(self.platform.open_session(stream));
        let (generation, replaced, was_active) = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.permission = PermissionState::Granted;
            let was_active = state.recording.is_active();
            state.recording = RecordingState::Idle;
            state.chunks.clear();
            let replaced = state.session.replace(Arc::clone(&session));
            (state.generation, replaced, was_active)
        };
        session.register(self.session_callbacks(generation));

        if let Some(old) = replaced {
            debug!(generation, "released previous capture session");
            drop(old);
            if was_active {
                self.shared.emit_status(RecordingState::Idle);
            }
        }

        info!(generation, "microphone access granted");
        Ok(PermissionState::Granted)
    }

    /// Start capturing, or resume if the recording is paused
    pub fn start_recording(&self) -> Result<(), CaptureError> {
        let (session, current) = self.ready_for(CaptureAction::Start)?;
        if current == RecordingState::Paused {
            session.resume()?;
        } else {
            session.start(TIME_SLICE)?;
        }
        Ok(())
    }

    /// Finish the recording; the artifact arrives through `on_stop`
    pub fn stop_recording(&self) -> Result<(), CaptureError> {
        let (session, _) = self.ready_for(CaptureAction::Stop)?;
        session.stop()?;
        Ok(())
    }

    pub fn pause_recording(&self) -> Result<(), CaptureError> {
        let (session, _) = self.ready_for(CaptureAction::Pause)?;
        session.pause()?;
        Ok(())
    }

    pub fn resume_recording(&self) -> Result<(), CaptureError> {
        let (session, _) = self.ready_for(CaptureAction::Resume)?;
        session.resume()?;
        Ok(())
    }

    /// Readiness check shared by every transition.
    ///
    /// Returns the session handle so the caller can command it without
    /// holding the state lock.
    fn ready_for(
        &self,
        action: CaptureAction,
    ) -> Result<(Arc<P::Session>, RecordingState), CaptureError> {
        let state = self.shared.lock();
        let session = state
            .session
            .as_ref()
            .map(Arc::clone)
            .ok_or(CaptureError::SessionNotReady)?;

        match state.permission {
            PermissionState::PermanentlyDenied => {
                return Err(CaptureError::PermissionPermanentlyDenied)
            }
            PermissionState::Unknown => return Err(CaptureError::PermissionNotRequested),
            PermissionState::Denied => return Err(CaptureError::PermissionDenied),
            PermissionState::Granted => {}
        }

        action.check(state.recording)?;
        debug!(%action, state = %state.recording, "dispatching to capture session");
        Ok((session, state.recording))
    }

    fn session_callbacks(&self, generation: u64) -> SessionCallbacks {
        let transition = |next: RecordingState, action: CaptureAction| {
            let shared: Weak<Shared<P::Session>> = Arc::downgrade(&self.shared);
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.handle_transition(generation, next, action);
                }
            }) as Box<dyn Fn() + Send + Sync>
        };

        let data = Arc::downgrade(&self.shared);
        let stop = Arc::downgrade(&self.shared);

        SessionCallbacks {
            on_data_available: Box::new(move |chunk: Vec<u8>| {
                if let Some(shared) = data.upgrade() {
                    shared.handle_data(generation, chunk);
                }
            }),
            on_start: transition(RecordingState::Recording, CaptureAction::Start),
            on_stop: Box::new(move || {
                if let Some(shared) = stop.upgrade() {
                    shared.handle_stop(generation);
                }
            }),
            on_pause: transition(RecordingState::Paused, CaptureAction::Pause),
            on_resume: transition(RecordingState::Recording, CaptureAction::Resume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Session double. In auto-confirm mode every command is confirmed
    /// synchronously, like a platform that answers before returning.
    struct FakeSession {
        callbacks: Mutex<Option<Arc<SessionCallbacks>>>,
        commands: Mutex<Vec<&'static str>>,
        started: Mutex<bool>,
        auto_confirm: bool,
    }

    impl FakeSession {
        fn callbacks(&self) -> Arc<SessionCallbacks> {
            self.callbacks
                .lock()
                .unwrap()
                .clone()
                .expect("callbacks registered")
        }

        fn commands(&self) -> Vec<&'static str> {
            self.commands.lock().unwrap().clone()
        }

        fn emit(&self, chunk: &[u8]) {
            (self.callbacks().on_data_available)(chunk.to_vec());
        }

        fn confirm(&self, event: &str) {
            let callbacks = self.callbacks();
            match event {
                "start" => (callbacks.on_start)(),
                "stop" => (callbacks.on_stop)(),
                "pause" => (callbacks.on_pause)(),
                "resume" => (callbacks.on_resume)(),
                other => panic!("unknown event {other}"),
            }
        }

        fn command(&self, name: &'static str) {
            self.commands.lock().unwrap().push(name);
            if self.auto_confirm {
                self.confirm(name);
            }
        }
    }

    /// Cloneable handle so tests can keep the session the controller owns
    #[derive(Clone)]
    struct SessionHandle(Arc<FakeSession>);

    impl MediaSession for SessionHandle {
        fn register(&self, callbacks: SessionCallbacks) {
            *self.0.callbacks.lock().unwrap() = Some(Arc::new(callbacks));
        }

        fn start(&self, time_slice: Duration) -> Result<(), SessionError> {
            assert_eq!(time_slice, TIME_SLICE);
            {
                let mut started = self.0.started.lock().unwrap();
                if *started {
                    return Err(SessionError::InvalidState("start"));
                }
                *started = true;
            }
            self.0.command("start");
            Ok(())
        }

        fn stop(&self) -> Result<(), SessionError> {
            *self.0.started.lock().unwrap() = false;
            self.0.command("stop");
            Ok(())
        }

        fn pause(&self) -> Result<(), SessionError> {
            self.0.command("pause");
            Ok(())
        }

        fn resume(&self) -> Result<(), SessionError> {
            self.0.command("resume");
            Ok(())
        }
    }

    struct FakePlatform {
        compatible: bool,
        auto_confirm: bool,
        outcomes: Mutex<VecDeque<Result<(), AccessDenied>>>,
        /// Each prompt waits on the next gate, when one is queued
        gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        prompts: Arc<AtomicUsize>,
        sessions: Arc<Mutex<Vec<SessionHandle>>>,
    }

    impl FakePlatform {
        fn new() -> Self {
            Self {
                compatible: true,
                auto_confirm: true,
                outcomes: Mutex::new(VecDeque::new()),
                gates: Mutex::new(VecDeque::new()),
                prompts: Arc::new(AtomicUsize::new(0)),
                sessions: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn incompatible() -> Self {
            Self {
                compatible: false,
                ..Self::new()
            }
        }

        fn manual_confirm() -> Self {
            Self {
                auto_confirm: false,
                ..Self::new()
            }
        }

        /// Platform whose next `count` prompts block until released
        fn gated(count: usize) -> (Self, Vec<oneshot::Sender<()>>) {
            let (senders, receivers): (Vec<_>, VecDeque<_>) =
                (0..count).map(|_| oneshot::channel()).unzip();
            let platform = Self {
                gates: Mutex::new(receivers),
                ..Self::new()
            };
            (platform, senders)
        }

        fn with_outcomes(outcomes: Vec<Result<(), AccessDenied>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl CapturePlatform for FakePlatform {
        type Stream = ();
        type Session = SessionHandle;

        fn supports_audio_capture(&self) -> bool {
            self.compatible
        }

        async fn request_audio_stream(&self) -> Result<(), AccessDenied> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                gate.await.unwrap();
            }
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        fn open_session(&self, _stream: ()) -> SessionHandle {
            let session = SessionHandle(Arc::new(FakeSession {
                callbacks: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
                started: Mutex::new(false),
                auto_confirm: self.auto_confirm,
            }));
            self.sessions.lock().unwrap().push(session.clone());
            session
        }
    }

    /// Everything the hooks observed
    #[derive(Default)]
    struct Observed {
        statuses: Mutex<Vec<RecordingState>>,
        finished: Mutex<Vec<FinishedRecording>>,
        events: Mutex<Vec<&'static str>>,
    }

    fn recording_hooks(observed: &Arc<Observed>) -> CaptureHooks {
        let statuses = Arc::clone(observed);
        let finished = Arc::clone(observed);
        let started = Arc::clone(observed);
        let paused = Arc::clone(observed);
        let resumed = Arc::clone(observed);
        CaptureHooks {
            on_start: Some(Box::new(move || started.events.lock().unwrap().push("start"))),
            on_stop: Some(Box::new(move |recording: FinishedRecording| {
                finished.finished.lock().unwrap().push(recording)
            })),
            on_pause: Some(Box::new(move || paused.events.lock().unwrap().push("pause"))),
            on_resume: Some(Box::new(move || resumed.events.lock().unwrap().push("resume"))),
            on_recording_status_change: Some(Box::new(move |status: RecordingState| {
                statuses.statuses.lock().unwrap().push(status)
            })),
        }
    }

    fn session(sessions: &Arc<Mutex<Vec<SessionHandle>>>, index: usize) -> SessionHandle {
        sessions.lock().unwrap()[index].clone()
    }

    async fn granted(
        platform: FakePlatform,
    ) -> (CaptureController<FakePlatform>, SessionHandle, Arc<Observed>) {
        let sessions = Arc::clone(&platform.sessions);
        let observed = Arc::new(Observed::default());
        let controller = CaptureController::new(platform, recording_hooks(&observed));
        controller.check_compatibility();
        controller.request_permission().await.unwrap();
        (controller, session(&sessions, 0), observed)
    }

    #[tokio::test]
    async fn unavailable_host_never_prompts() {
        let platform = FakePlatform::incompatible();
        let prompts = Arc::clone(&platform.prompts);
        let controller = CaptureController::new(platform, CaptureHooks::default());

        assert_eq!(controller.check_compatibility(), CompatibilityState::Unavailable);
        assert_eq!(controller.compatibility(), CompatibilityState::Unavailable);

        let err = controller.request_permission().await.unwrap_err();
        assert!(matches!(err, CaptureError::NotCompatible));
        assert_eq!(prompts.load(Ordering::SeqCst), 0);
        assert_eq!(controller.permission(), PermissionState::Unknown);
    }

    #[tokio::test]
    async fn permission_requires_compatibility_check_first() {
        let controller = CaptureController::new(FakePlatform::new(), CaptureHooks::default());
        assert_eq!(controller.compatibility(), CompatibilityState::Unknown);

        let err = controller.request_permission().await.unwrap_err();
        assert!(matches!(err, CaptureError::NotCompatible));
    }

    #[tokio::test]
    async fn check_compatibility_is_idempotent() {
        let controller = CaptureController::new(FakePlatform::new(), CaptureHooks::default());
        assert_eq!(controller.check_compatibility(), CompatibilityState::Available);
        assert_eq!(controller.check_compatibility(), CompatibilityState::Available);
    }

    #[test]
    fn lifecycle_before_permission_fails_with_session_not_ready() {
        let controller = CaptureController::new(FakePlatform::new(), CaptureHooks::default());
        controller.check_compatibility();

        for result in [
            controller.start_recording(),
            controller.stop_recording(),
            controller.pause_recording(),
            controller.resume_recording(),
        ] {
            assert!(matches!(result, Err(CaptureError::SessionNotReady)));
        }
        assert_eq!(controller.recording_state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn refusal_records_denial_state() {
        let platform = FakePlatform::with_outcomes(vec![
            Err(AccessDenied::Denied),
            Err(AccessDenied::PermanentlyDenied),
        ]);
        let controller = CaptureController::new(platform, CaptureHooks::default());
        controller.check_compatibility();

        let err = controller.request_permission().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert_eq!(err.permission_state(), Some(PermissionState::Denied));
        assert_eq!(controller.permission(), PermissionState::Denied);

        let err = controller.request_permission().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionPermanentlyDenied));
        assert_eq!(err.permission_state(), Some(PermissionState::PermanentlyDenied));
        assert_eq!(controller.permission(), PermissionState::PermanentlyDenied);

        // No session was ever created
        assert!(matches!(
            controller.start_recording(),
            Err(CaptureError::SessionNotReady)
        ));
    }

    #[tokio::test]
    async fn later_refusal_blocks_existing_session() {
        let platform = FakePlatform::with_outcomes(vec![Ok(()), Err(AccessDenied::Denied)]);
        let (controller, _session, _observed) = granted(platform).await;

        assert!(controller.request_permission().await.is_err());
        assert!(matches!(
            controller.start_recording(),
            Err(CaptureError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn each_request_prompts_again() {
        let platform = FakePlatform::new();
        let prompts = Arc::clone(&platform.prompts);
        let (controller, _session, _observed) = granted(platform).await;

        controller.request_permission().await.unwrap();
        assert_eq!(prompts.load(Ordering::SeqCst), 2);
        assert_eq!(controller.permission(), PermissionState::Granted);
    }

    #[tokio::test]
    async fn transitions_follow_the_state_table() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;

        controller.start_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);

        controller.pause_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Paused);

        controller.resume_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);

        controller.pause_recording().unwrap();
        controller.stop_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Idle);

        assert_eq!(
            session.0.commands(),
            vec!["start", "pause", "resume", "pause", "stop"]
        );
        assert_eq!(
            *observed.statuses.lock().unwrap(),
            vec![
                RecordingState::Recording,
                RecordingState::Paused,
                RecordingState::Recording,
                RecordingState::Paused,
                RecordingState::Idle,
            ]
        );
        assert_eq!(
            *observed.events.lock().unwrap(),
            vec!["start", "pause", "resume", "pause"]
        );
        assert_eq!(observed.finished.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transitions_outside_the_table_are_rejected() {
        let (controller, session, _observed) = granted(FakePlatform::new()).await;

        let err = controller.pause_recording().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidTransition(InvalidTransition {
                action: CaptureAction::Pause,
                state: RecordingState::Idle,
            })
        ));
        assert!(controller.stop_recording().is_err());
        assert!(controller.resume_recording().is_err());

        controller.start_recording().unwrap();
        assert!(controller.start_recording().is_err());
        assert!(controller.resume_recording().is_err());

        assert_eq!(session.0.commands(), vec!["start"]);
    }

    #[tokio::test]
    async fn three_fragments_arrive_concatenated_in_order() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;

        controller.start_recording().unwrap();
        session.0.emit(b"first-");
        session.0.emit(b"second-");
        session.0.emit(b"third");
        assert_eq!(controller.buffered_chunks(), 3);
        controller.stop_recording().unwrap();

        let finished = observed.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].audio.data(), b"first-second-third");
        assert_eq!(finished[0].audio.mime_type(), AudioMimeType::OggOpus);
        assert_eq!(
            *observed.statuses.lock().unwrap(),
            vec![RecordingState::Recording, RecordingState::Idle]
        );

        assert_eq!(controller.buffered_chunks(), 0);
        assert_eq!(controller.buffered_bytes(), 0);
        assert_eq!(controller.recording_state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn start_while_paused_resumes_without_losing_data() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;

        controller.start_recording().unwrap();
        session.0.emit(b"a");
        controller.pause_recording().unwrap();
        session.0.emit(b"b");

        controller.start_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);
        assert_eq!(controller.buffered_chunks(), 2);
        session.0.emit(b"c");

        controller.stop_recording().unwrap();
        assert_eq!(session.0.commands(), vec!["start", "pause", "resume", "stop"]);
        assert_eq!(observed.finished.lock().unwrap()[0].audio.data(), b"abc");
    }

    #[tokio::test]
    async fn each_session_yields_its_own_artifact() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;

        controller.start_recording().unwrap();
        session.0.emit(b"one");
        controller.stop_recording().unwrap();

        controller.start_recording().unwrap();
        session.0.emit(b"two");
        controller.stop_recording().unwrap();

        let finished = observed.finished.lock().unwrap();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].audio.data(), b"one");
        assert_eq!(finished[1].audio.data(), b"two");
        assert_ne!(finished[0].locator, finished[1].locator);
    }

    #[tokio::test]
    async fn panicking_hooks_do_not_disturb_the_state_machine() {
        let platform = FakePlatform::new();
        let sessions = Arc::clone(&platform.sessions);
        let hooks = CaptureHooks {
            on_start: Some(Box::new(|| panic!("start hook"))),
            on_stop: Some(Box::new(|_: FinishedRecording| panic!("stop hook"))),
            on_pause: Some(Box::new(|| panic!("pause hook"))),
            on_resume: Some(Box::new(|| panic!("resume hook"))),
            on_recording_status_change: Some(Box::new(|_: RecordingState| panic!("status hook"))),
        };
        let controller = CaptureController::new(platform, hooks);
        controller.check_compatibility();
        controller.request_permission().await.unwrap();
        let session = session(&sessions, 0);

        controller.start_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);
        session.0.emit(b"data");

        controller.pause_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Paused);
        controller.resume_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);

        controller.stop_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Idle);
        assert_eq!(controller.permission(), PermissionState::Granted);
        assert_eq!(controller.buffered_chunks(), 0);

        // Still fully usable afterwards
        controller.start_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);
    }

    #[tokio::test]
    async fn state_follows_platform_confirmation() {
        let (controller, session, observed) = granted(FakePlatform::manual_confirm()).await;

        controller.start_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Idle);
        assert!(observed.statuses.lock().unwrap().is_empty());

        session.0.confirm("start");
        assert_eq!(controller.recording_state(), RecordingState::Recording);

        session.0.emit(b"x");
        controller.stop_recording().unwrap();
        assert_eq!(controller.recording_state(), RecordingState::Recording);
        assert!(observed.finished.lock().unwrap().is_empty());

        session.0.confirm("stop");
        assert_eq!(controller.recording_state(), RecordingState::Idle);
        assert_eq!(observed.finished.lock().unwrap()[0].audio.data(), b"x");
    }

    #[tokio::test]
    async fn platform_rejection_surfaces_as_session_error() {
        let (controller, _session, _observed) = granted(FakePlatform::manual_confirm()).await;

        controller.start_recording().unwrap();
        // Not yet confirmed, so the controller still believes it is idle
        let err = controller.start_recording().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Session(SessionError::InvalidState("start"))
        ));
    }

    #[tokio::test]
    async fn new_permission_replaces_active_session() {
        let platform = FakePlatform::new();
        let sessions = Arc::clone(&platform.sessions);
        let observed = Arc::new(Observed::default());
        let controller = CaptureController::new(platform, recording_hooks(&observed));
        controller.check_compatibility();
        controller.request_permission().await.unwrap();
        let old = session(&sessions, 0);

        controller.start_recording().unwrap();
        old.0.emit(b"stale");

        controller.request_permission().await.unwrap();
        let new = session(&sessions, 1);
        assert_eq!(controller.recording_state(), RecordingState::Idle);
        assert_eq!(controller.buffered_chunks(), 0);

        // Late callbacks from the replaced session are ignored
        old.0.emit(b"late");
        old.0.confirm("stop");
        assert!(observed.finished.lock().unwrap().is_empty());
        assert_eq!(controller.buffered_chunks(), 0);

        controller.start_recording().unwrap();
        new.0.emit(b"fresh");
        controller.stop_recording().unwrap();
        assert_eq!(observed.finished.lock().unwrap()[0].audio.data(), b"fresh");
        assert_eq!(
            *observed.statuses.lock().unwrap(),
            vec![
                RecordingState::Recording,
                RecordingState::Idle,
                RecordingState::Recording,
                RecordingState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn fragments_from_a_platform_thread_keep_their_order() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;
        controller.start_recording().unwrap();

        let producer = session.clone();
        std::thread::spawn(move || {
            for i in 0u8..100 {
                producer.0.emit(&[i]);
            }
        })
        .join()
        .unwrap();

        controller.stop_recording().unwrap();
        let expected: Vec<u8> = (0u8..100).collect();
        assert_eq!(observed.finished.lock().unwrap()[0].audio.data(), &expected[..]);
    }

    #[tokio::test]
    async fn hooks_may_reenter_the_controller() {
        let platform = FakePlatform::new();
        let sessions = Arc::clone(&platform.sessions);
        let controller: Arc<Mutex<Option<Arc<CaptureController<FakePlatform>>>>> =
            Arc::new(Mutex::new(None));
        let observed_state = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&controller);
        let seen = Arc::clone(&observed_state);
        let hooks = CaptureHooks {
            on_start: Some(Box::new(move || {
                if let Some(controller) = slot.lock().unwrap().as_ref() {
                    *seen.lock().unwrap() = Some(controller.recording_state());
                }
            })),
            ..Default::default()
        };

        let instance = Arc::new(CaptureController::new(platform, hooks));
        *controller.lock().unwrap() = Some(Arc::clone(&instance));
        instance.check_compatibility();
        instance.request_permission().await.unwrap();
        let _session = session(&sessions, 0);

        instance.start_recording().unwrap();
        assert_eq!(*observed_state.lock().unwrap(), Some(RecordingState::Recording));

        // Break the reference cycle held by the hook
        controller.lock().unwrap().take();
    }

    #[tokio::test]
    async fn stop_without_data_hands_over_one_empty_recording() {
        let (controller, session, observed) = granted(FakePlatform::new()).await;

        controller.start_recording().unwrap();
        assert_eq!(controller.buffered_bytes(), 0);
        controller.stop_recording().unwrap();

        let finished = observed.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].audio.is_empty());
        assert_eq!(finished[0].audio.mime_type(), AudioMimeType::OggOpus);
        assert!(finished[0].locator.to_string().starts_with("recording:"));
        assert_eq!(session.0.commands(), vec!["start", "stop"]);
        assert_eq!(controller.recording_state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn overlapping_requests_keep_the_last_to_resolve() {
        let (platform, mut gates) = FakePlatform::gated(2);
        let prompts = Arc::clone(&platform.prompts);
        let sessions = Arc::clone(&platform.sessions);
        let observed = Arc::new(Observed::default());
        let controller = CaptureController::new(platform, recording_hooks(&observed));
        controller.check_compatibility();

        let later_gate = gates.pop().unwrap();
        let earlier_gate = gates.pop().unwrap();
        let release_out_of_order = async {
            while prompts.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
            // The request that prompted second resolves first
            later_gate.send(()).unwrap();
            while sessions.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
            earlier_gate.send(()).unwrap();
        };

        let (first, second, ()) = tokio::join!(
            controller.request_permission(),
            controller.request_permission(),
            release_out_of_order
        );
        assert_eq!(first.unwrap(), PermissionState::Granted);
        assert_eq!(second.unwrap(), PermissionState::Granted);
        assert_eq!(controller.permission(), PermissionState::Granted);

        let superseded = session(&sessions, 0);
        let live = session(&sessions, 1);
        assert_eq!(sessions.lock().unwrap().len(), 2);

        controller.start_recording().unwrap();
        assert_eq!(live.0.commands(), vec!["start"]);
        assert!(superseded.0.commands().is_empty());

        // The superseded session belongs to an older generation
        superseded.0.emit(b"stale");
        superseded.0.confirm("stop");
        assert_eq!(controller.recording_state(), RecordingState::Recording);
        assert_eq!(controller.buffered_chunks(), 0);

        live.0.emit(b"kept");
        controller.stop_recording().unwrap();
        let finished = observed.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].audio.data(), b"kept");
    }
}
