//! CLI layer - Command-line interface
//!
//! Contains argument parsing, output formatting, interactive controls,
//! signal handling, and the main application runners.

pub mod app;
pub mod args;
pub mod auth_cmd;
pub mod config_cmd;
pub mod controls;
pub mod presenter;
pub mod signals;

// Re-export commonly used types
pub use app::{run_record, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE_ERROR};
pub use args::{AuthAction, Cli, Commands, ConfigAction, RecordArgs, RecordOptions};
pub use presenter::Presenter;
