//! The assistant widget's state.
//!
//! ARCHITECTURE
//! ============
//! `language` holds the fixed per-language tables and `message` the
//! transcript entry type. `session` owns the live state and talks to the
//! assistant.

pub mod language;
pub mod message;
mod session;

pub use language::{Language, LanguageError, SUPPORTED_LANGUAGES};
pub use message::{ChatMessage, Role};
pub use session::{ASSISTANT_FAILURE_NOTICE, ChatSession, ChatSettings, ChatSnapshot, NO_REPLY_FALLBACK, SendOutcome};
