//! Capture state enums and the recording transition table

use std::fmt;
use thiserror::Error;

/// Whether the host can capture audio at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompatibilityState {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

impl CompatibilityState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for CompatibilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Microphone permission as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
    PermanentlyDenied,
}

impl PermissionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::PermanentlyDenied => "permanently denied",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recording lifecycle states.
///
/// State machine:
///   IDLE -> RECORDING (start)
///   RECORDING -> PAUSED (pause)
///   PAUSED -> RECORDING (resume, or start)
///   RECORDING | PAUSED -> IDLE (stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

impl RecordingState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
        }
    }

    pub fn is_active(&self) -> bool {
        *self != Self::Idle
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-initiated recording transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureAction {
    Start,
    Stop,
    Pause,
    Resume,
}

impl CaptureAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start recording",
            Self::Stop => "stop recording",
            Self::Pause => "pause recording",
            Self::Resume => "resume recording",
        }
    }

    /// Check the action against the transition table
    pub fn check(self, state: RecordingState) -> Result<(), InvalidTransition> {
        let permitted = match self {
            Self::Start => matches!(state, RecordingState::Idle | RecordingState::Paused),
            Self::Stop => state.is_active(),
            Self::Pause => state == RecordingState::Recording,
            Self::Resume => state == RecordingState::Paused,
        };

        if permitted {
            Ok(())
        } else {
            Err(InvalidTransition {
                action: self,
                state,
            })
        }
    }
}

impl fmt::Display for CaptureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an action is not allowed from the current recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid state transition: cannot {action} while {state}")]
pub struct InvalidTransition {
    pub action: CaptureAction,
    pub state: RecordingState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unknown_and_idle() {
        assert_eq!(CompatibilityState::default(), CompatibilityState::Unknown);
        assert_eq!(PermissionState::default(), PermissionState::Unknown);
        assert_eq!(RecordingState::default(), RecordingState::Idle);
    }

    #[test]
    fn start_allowed_from_idle_and_paused() {
        assert!(CaptureAction::Start.check(RecordingState::Idle).is_ok());
        assert!(CaptureAction::Start.check(RecordingState::Paused).is_ok());

        let err = CaptureAction::Start
            .check(RecordingState::Recording)
            .unwrap_err();
        assert_eq!(err.state, RecordingState::Recording);
        assert_eq!(err.action, CaptureAction::Start);
    }

    #[test]
    fn stop_requires_active_session() {
        assert!(CaptureAction::Stop.check(RecordingState::Recording).is_ok());
        assert!(CaptureAction::Stop.check(RecordingState::Paused).is_ok());
        assert!(CaptureAction::Stop.check(RecordingState::Idle).is_err());
    }

    #[test]
    fn pause_and_resume_alternate() {
        assert!(CaptureAction::Pause.check(RecordingState::Recording).is_ok());
        assert!(CaptureAction::Pause.check(RecordingState::Paused).is_err());
        assert!(CaptureAction::Pause.check(RecordingState::Idle).is_err());

        assert!(CaptureAction::Resume.check(RecordingState::Paused).is_ok());
        assert!(CaptureAction::Resume.check(RecordingState::Recording).is_err());
        assert!(CaptureAction::Resume.check(RecordingState::Idle).is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(RecordingState::Idle.to_string(), "idle");
        assert_eq!(RecordingState::Paused.to_string(), "paused");
        assert_eq!(PermissionState::PermanentlyDenied.to_string(), "permanently denied");
        assert_eq!(CompatibilityState::Available.to_string(), "available");
    }

    #[test]
    fn error_display() {
        let err = InvalidTransition {
            action: CaptureAction::Pause,
            state: RecordingState::Idle,
        };
        let msg = err.to_string();
        assert!(msg.contains("pause recording"));
        assert!(msg.contains("idle"));
    }
}
