//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::recording::Duration;

/// drive-recorder - record the microphone and upload to Google Drive
#[derive(Parser, Debug)]
#[command(name = "drive-recorder")]
#[command(version)]
#[command(about = "Record audio from the microphone and upload it to Google Drive")]
#[command(long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub record: RecordArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options for a recording run
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordArgs {
    /// Stop automatically after this long (e.g., 30s, 1m, 2m30s)
    #[arg(short = 'd', long, value_name = "TIME")]
    pub duration: Option<String>,

    /// Upper bound on recording length
    #[arg(long, value_name = "TIME")]
    pub max_duration: Option<String>,

    /// Drive folder to upload into
    #[arg(short = 'f', long, value_name = "NAME")]
    pub folder: Option<String>,

    /// Write the recording to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Keep the recording local
    #[arg(long)]
    pub no_upload: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record from the microphone (default)
    Record(RecordArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage Google Drive sign-in
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Auth action subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Show whether an access token is available
    Status,
    /// Store an OAuth access token for Google Drive
    SignIn {
        /// Access token with the drive.file scope
        token: String,
    },
    /// Forget the stored access token
    SignOut,
}

/// Resolved options for a recording run
#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// Fixed length; `None` records until stopped or `max_duration`
    pub duration: Option<Duration>,
    pub max_duration: Duration,
    pub folder: String,
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub upload: bool,
    pub access_token: Option<String>,
    pub api_base_url: Option<String>,
}

impl RecordOptions {
    /// How long the run may record before stopping on its own
    pub fn limit(&self) -> Duration {
        match self.duration {
            Some(d) if d.as_millis() < self.max_duration.as_millis() => d,
            _ => self.max_duration,
        }
    }
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "access_token",
    "folder",
    "duration",
    "max_duration",
    "upload",
    "output_dir",
    "api_base_url",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
