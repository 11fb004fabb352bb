//! Application configuration parsed from environment variables.
//!
//! Assistant (LLM) settings live in [`crate::llm::config`]; this module
//! covers local storage and chat behavior.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::ChatSettings;

pub const DEFAULT_STORAGE_DIR: &str = ".agriwise";
pub const DEFAULT_CANNED_REPLY_DELAY_MS: u64 = 1000;
pub const DEFAULT_ASSISTANT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgriwiseConfig {
    /// Directory backing the local key-value store.
    pub storage_dir: PathBuf,
    pub chat: ChatSettings,
}

impl Default for AgriwiseConfig {
    fn default() -> Self {
        Self { storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR), chat: ChatSettings::default() }
    }
}

impl AgriwiseConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `AGRIWISE_STORAGE_DIR`: default `.agriwise`
    /// - `AGRIWISE_CANNED_REPLY_DELAY_MS`: default 1000
    /// - `AGRIWISE_ASSISTANT_MAX_TOKENS`: default 1024
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a numeric variable is set
    /// but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_dir = std::env::var("AGRIWISE_STORAGE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);
        let delay_ms = env_parse_strict("AGRIWISE_CANNED_REPLY_DELAY_MS", DEFAULT_CANNED_REPLY_DELAY_MS)?;
        let max_tokens = env_parse_strict("AGRIWISE_ASSISTANT_MAX_TOKENS", DEFAULT_ASSISTANT_MAX_TOKENS)?;
        Ok(Self {
            storage_dir,
            chat: ChatSettings { canned_reply_delay: Duration::from_millis(delay_ms), max_tokens },
        })
    }
}

/// Parse `key` as `T`, falling back to `default` when unset or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_strict<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { var: key.to_string(), value: raw }),
        Err(_) => Ok(default),
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
