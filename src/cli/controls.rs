//! Interactive recording controls read from stdin

use std::io::BufRead;
use std::thread;

use tokio::sync::mpsc;
use tracing::debug;

/// A command typed while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
}

impl ControlCommand {
    /// Parse one input line. An empty line stops the recording.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "" | "s" | "stop" | "q" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// One-line help shown when recording starts
pub const CONTROLS_HINT: &str = "p = pause, r = resume, s or Enter = stop";

/// Read commands from stdin on a detached thread.
///
/// A blocking stdin read cannot be cancelled, so it must not live on the
/// runtime or it would hold up shutdown. The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<ControlCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if let Some(command) = ControlCommand::parse(&line) {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
            }
            debug!("stdin closed");
        });
    if let Err(e) = spawned {
        debug!(error = %e, "interactive controls unavailable");
    }
    rx
}
