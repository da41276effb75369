//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The bot cannot run without a Telegram token.
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingBotToken,

    /// `ALLOWED_USERS` must be a comma-separated list of numeric ids.
    #[error("ALLOWED_USERS contains a non-numeric id: {0:?}")]
    InvalidAllowedUsers(String),

    /// `MAX_TOKENS` must be a positive integer.
    #[error("MAX_TOKENS is not a valid number: {0:?}")]
    InvalidMaxTokens(String),
}
