//! drive-recorder - microphone capture with upload to Google Drive
//!
//! This crate provides a capture controller that negotiates microphone
//! access, drives a recording through IDLE, RECORDING and PAUSED, buffers
//! the encoded fragments and hands each finished recording to the caller,
//! plus a Google Drive uploader for signed-in accounts.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Capture states, chunk buffering, recordings, config and errors
//! - **Application**: The capture controller, the upload use case and port traits
//! - **Infrastructure**: Adapter implementations (cpal capture, Google Drive, token auth, XDG config)
//! - **CLI**: Command-line interface, argument parsing, and interactive controls

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
