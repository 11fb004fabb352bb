//! Chat transcript entries.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Stored as an RFC 3339 string.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    /// New message with a fresh v4 id, stamped now.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), role, content: content.into(), timestamp: OffsetDateTime::now_utc() }
    }
}
