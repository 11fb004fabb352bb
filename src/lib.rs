//! AgriWise core: reward tokens and the multilingual farming assistant.
//!
//! ARCHITECTURE
//! ============
//! - `storage`: string key-value persistence (`localStorage` semantics) with
//!   memory and file backends.
//! - `rewards`: the token ledger and the marketplace that spends from it.
//! - `chat`: the assistant widget's session: transcript, language, replies.
//! - `llm`: the chat completions client behind the `LlmChat` trait.
//! - `app`: wires the above from environment config.
//!
//! Logging goes through `tracing`; installing a subscriber is left to the
//! embedding binary.

pub mod app;
pub mod chat;
pub mod config;
pub mod llm;
pub mod rewards;
pub mod storage;

pub use app::AgriWise;
