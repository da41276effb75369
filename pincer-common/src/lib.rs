//! Pincer Common - Shared plumbing for the Pincer crates.
//!
//! This crate provides:
//! - Configuration loaded from environment variables
//! - Error types for startup failures
//! - Logging setup with noise suppression

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, LmStudioConfig, ObservabilityConfig, TelegramConfig};
pub use error::ConfigError;
pub use logging::init_logging;
