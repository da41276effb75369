//! Configuration for the Pincer bot.
//!
//! Everything is read from environment variables once at startup. The only
//! required setting is `TELEGRAM_BOT_TOKEN`; all other values fall back to
//! defaults suitable for a local LM Studio instance.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default OpenAI-compatible endpoint exposed by LM Studio.
pub const DEFAULT_LM_STUDIO_URL: &str = "http://localhost:1234/v1";

/// Model identifier requested when `LM_STUDIO_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "mistralai/ministral-3-14b-reasoning";

/// Default completion budget per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Telegram connection and access control settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather.
    pub bot_token: String,
    /// Telegram user ids allowed to talk to the bot. Empty means open access.
    pub allowed_users: Vec<i64>,
}

impl TelegramConfig {
    /// Whether the given Telegram user may use the bot.
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}

/// Inference server settings.
#[derive(Debug, Clone)]
pub struct LmStudioConfig {
    /// Base URL including the `/v1` prefix.
    pub base_url: String,
    /// Model identifier passed through in completion requests.
    pub model: String,
    /// `max_tokens` sent with every completion request.
    pub max_tokens: u32,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Output format: "pretty" or "json".
    pub log_format: String,
}

/// Complete bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub lm_studio: LmStudioConfig,
    /// Location of the long-term memory JSON file.
    pub memory_file: PathBuf,
    /// Optional file holding the system persona text.
    pub persona_file: Option<PathBuf>,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Kept separate from [`Config::from_env`] so tests can feed in values
    /// without touching the process environment.
    fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingBotToken)?;

        let allowed_users = match lookup("ALLOWED_USERS") {
            Some(raw) => parse_allowed_users(&raw)?,
            None => Vec::new(),
        };

        let max_tokens = match lookup("MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidMaxTokens(raw))?,
            None => DEFAULT_MAX_TOKENS,
        };

        Ok(Self {
            telegram: TelegramConfig {
                bot_token,
                allowed_users,
            },
            lm_studio: LmStudioConfig {
                base_url: lookup("LM_STUDIO_URL")
                    .unwrap_or_else(|| DEFAULT_LM_STUDIO_URL.to_string()),
                model: lookup("LM_STUDIO_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens,
            },
            memory_file: lookup("MEMORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_memory_file),
            persona_file: lookup("PERSONA_FILE").map(PathBuf::from),
            observability: ObservabilityConfig {
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
            },
        })
    }
}

fn parse_allowed_users(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidAllowedUsers(entry.to_string()))
        })
        .collect()
}

/// `~/.pincer/memory.json`, falling back to a relative path when the home
/// directory cannot be resolved.
fn default_memory_file() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".pincer"))
        .unwrap_or_else(|| PathBuf::from(".pincer"))
        .join("memory.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Config::load(|key| map.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = load_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBotToken));
    }

    #[test]
    fn blank_token_is_fatal() {
        let err = load_from(&[("TELEGRAM_BOT_TOKEN", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBotToken));
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = load_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert!(config.telegram.allowed_users.is_empty());
        assert_eq!(config.lm_studio.base_url, DEFAULT_LM_STUDIO_URL);
        assert_eq!(config.lm_studio.model, DEFAULT_MODEL);
        assert_eq!(config.lm_studio.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(config.persona_file.is_none());
        assert!(config.memory_file.ends_with(".pincer/memory.json"));
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn parses_allowed_users_with_whitespace() {
        let config = load_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ALLOWED_USERS", " 12345 , 678 ,"),
        ])
        .unwrap();
        assert_eq!(config.telegram.allowed_users, vec![12345, 678]);
    }

    #[test]
    fn rejects_non_numeric_allowed_users() {
        let err = load_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("ALLOWED_USERS", "12,bob")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAllowedUsers(entry) if entry == "bob"));
    }

    #[test]
    fn rejects_bad_max_tokens() {
        let err = load_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("MAX_TOKENS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxTokens(_)));
    }

    #[test]
    fn empty_allow_list_admits_everyone() {
        let config = load_from(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap();
        assert!(config.telegram.is_allowed(1));
        assert!(config.telegram.is_allowed(-42));
    }

    #[test]
    fn allow_list_restricts_access() {
        let config =
            load_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("ALLOWED_USERS", "10,20")]).unwrap();
        assert!(config.telegram.is_allowed(10));
        assert!(!config.telegram.is_allowed(30));
    }

    #[test]
    fn overrides_apply() {
        let config = load_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("LM_STUDIO_URL", "http://10.0.0.5:8080/v1"),
            ("LM_STUDIO_MODEL", "qwen2.5-7b-instruct"),
            ("MAX_TOKENS", "1024"),
            ("MEMORY_FILE", "/tmp/mem.json"),
            ("PERSONA_FILE", "/tmp/persona.txt"),
        ])
        .unwrap();
        assert_eq!(config.lm_studio.base_url, "http://10.0.0.5:8080/v1");
        assert_eq!(config.lm_studio.model, "qwen2.5-7b-instruct");
        assert_eq!(config.lm_studio.max_tokens, 1024);
        assert_eq!(config.memory_file, PathBuf::from("/tmp/mem.json"));
        assert_eq!(config.persona_file, Some(PathBuf::from("/tmp/persona.txt")));
    }
}
