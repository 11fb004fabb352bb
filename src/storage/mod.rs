//! Storage — local key-value persistence for manager state.
//!
//! DESIGN
//! ======
//! Managers never reach for ambient storage. Each one is handed a
//! `KeyValueStore` at construction and owns a fixed set of keys in it.
//! `MemoryStore` backs tests and ephemeral sessions, `FileStore` stands in
//! for the browser's per-origin `localStorage` on a local disk.
//!
//! ERROR HANDLING
//! ==============
//! Store methods return `StoreError`, but managers treat every failure as
//! non-fatal: a failed read means "no prior state", a failed write is
//! logged and the in-memory value stays authoritative for the session.

pub mod file;
pub mod memory;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the reward-token balance as a decimal string.
pub const TOKEN_BALANCE_KEY: &str = "agriwise-reward-tokens";

/// Key holding the chat transcript as a JSON array.
pub const CHAT_HISTORY_KEY: &str = "agriwise-chat-history";

/// Key holding the selected chat language as a JSON object.
pub const CHAT_LANGUAGE_KEY: &str = "agriwise-chat-language";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Keys must be non-empty and limited to `[A-Za-z0-9_-]`.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize failed: {0}")]
    Serialize(String),

    /// The stored value exists but does not have the expected shape.
    #[error("stored value for {key} could not be parsed: {reason}")]
    Parse { key: String, reason: String },
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Synchronous string key-value store, shaped after `window.localStorage`.
///
/// Implementations must be safe to share between the UI thread and the
/// completion tasks spawned by the chat session.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for `key`, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backing medium fails.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the raw value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backing medium fails.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(StoreError::InvalidKey(key.to_string())) }
}

// =============================================================================
// JSON HELPERS
// =============================================================================

/// Load and deserialize a JSON value stored under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Parse`] when the stored text is not valid JSON for `T`,
/// or any error from the underlying store.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Parse { key: key.to_string(), reason: e.to_string() })
}

/// Serialize `value` as JSON and store it under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Serialize`] if `value` cannot be encoded, or any
/// error from the underlying store.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    store.set(key, &raw)
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
