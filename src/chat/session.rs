//! Chat session manager.
//!
//! DESIGN
//! ======
//! `ChatSession` is a clonable handle; every clone, including the ones held
//! by in-flight reply tasks, shares one transcript. The transcript and the
//! language are written to the injected store on every change; visibility
//! and the loading flag are session-only. The lock is never held across an
//! `.await`.
//!
//! ORDERING
//! ========
//! Messages are appended in completion order, not request order. Sends are
//! not mutually exclusive; `is_loading` reports whether any is outstanding.
//!
//! CANCELLATION
//! ============
//! `clear_log` bumps the session epoch. Replies and canned messages started
//! under an older epoch are dropped rather than landing in the fresh
//! transcript. Closing the widget cancels nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::language::{Language, LanguageError, StoredLanguage};
use super::message::{ChatMessage, Role};
use crate::config::{DEFAULT_ASSISTANT_MAX_TOKENS, DEFAULT_CANNED_REPLY_DELAY_MS};
use crate::llm::LlmChat;
use crate::llm::types::{LlmError, Message};
use crate::storage::{CHAT_HISTORY_KEY, CHAT_LANGUAGE_KEY, KeyValueStore, load_json, save_json};

/// Shown when the assistant answers with no usable text.
pub const NO_REPLY_FALLBACK: &str = "🤖 No response received.";

/// Shown when the assistant cannot be reached.
pub const ASSISTANT_FAILURE_NOTICE: &str = "❌ Failed to connect to assistant.";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatSettings {
    /// Delay before the canned reply that follows a language change.
    pub canned_reply_delay: Duration,
    /// Completion budget per assistant request.
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            canned_reply_delay: Duration::from_millis(DEFAULT_CANNED_REPLY_DELAY_MS),
            max_tokens: DEFAULT_ASSISTANT_MAX_TOKENS,
        }
    }
}

/// How a send ended. Every variant except `Ignored` appended the user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing appended.
    Ignored,
    /// Assistant reply (or the no-reply fallback) appended.
    Replied,
    /// Failure notice appended.
    Failed,
    /// The log was cleared while the reply was outstanding; nothing appended.
    Discarded,
}

/// Point-in-time copy of everything the widget renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub is_open: bool,
    pub is_loading: bool,
    pub language: Language,
}

#[derive(Debug, thiserror::Error)]
enum ReplyError {
    #[error("assistant not configured")]
    NotConfigured,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl ReplyError {
    fn retryable(&self) -> bool {
        matches!(self, Self::Llm(e) if e.retryable())
    }
}

struct SessionState {
    messages: Vec<ChatMessage>,
    is_open: bool,
    /// Sends awaiting an assistant reply.
    pending: usize,
    language: Language,
    /// Bumped by `clear_log`; completions from an older epoch are dropped.
    epoch: u64,
}

/// One outstanding send's share of `SessionState::pending`. Dropping it
/// unsettled (the send future was cancelled) releases the count.
struct PendingReply {
    state: Arc<Mutex<SessionState>>,
    settled: bool,
}

impl PendingReply {
    fn settle(mut self, state: &mut SessionState) {
        state.pending = state.pending.saturating_sub(1);
        self.settled = true;
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = state.pending.saturating_sub(1);
        debug!("chat: send cancelled before reply");
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn KeyValueStore>,
    assistant: Option<Arc<dyn LlmChat>>,
    settings: ChatSettings,
}

impl ChatSession {
    /// Open a session with default settings.
    ///
    /// `assistant` is `None` when no LLM is configured; sends then end in the
    /// failure notice.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, assistant: Option<Arc<dyn LlmChat>>) -> Self {
        Self::with_settings(store, assistant, ChatSettings::default())
    }

    /// Open a session, restoring the stored transcript and language. An empty
    /// transcript gets a welcome message in the active language.
    #[must_use]
    pub fn with_settings(
        store: Arc<dyn KeyValueStore>,
        assistant: Option<Arc<dyn LlmChat>>,
        settings: ChatSettings,
    ) -> Self {
        let messages = load_messages(store.as_ref());
        let language = load_language(store.as_ref());
        info!(restored = messages.len(), language = language.code(), "chat: session opened");

        let session = Self {
            state: Arc::new(Mutex::new(SessionState { messages, is_open: false, pending: 0, language, epoch: 0 })),
            store,
            assistant,
            settings,
        };
        {
            let mut state = session.lock();
            if state.messages.is_empty() {
                session.push_locked(&mut state, Role::Assistant, language.welcome_message());
            }
        }
        session
    }

    // -------------------------------------------------------------------------
    // Transcript
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.lock();
        ChatSnapshot {
            messages: state.messages.clone(),
            is_open: state.is_open,
            is_loading: state.pending > 0,
            language: state.language,
        }
    }

    /// Append a message and persist the transcript. Content is not validated.
    pub fn append_message(&self, role: Role, content: impl Into<String>) -> ChatMessage {
        let content = content.into();
        let mut state = self.lock();
        self.push_locked(&mut state, role, &content)
    }

    /// Empty the transcript and drop any reply still in flight.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.messages.clear();
        state.epoch += 1;
        self.persist_messages(&state.messages);
        info!(epoch = state.epoch, "chat: log cleared");
    }

    // -------------------------------------------------------------------------
    // Visibility
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    pub fn set_open(&self, open: bool) {
        self.lock().is_open = open;
    }

    /// Flip visibility and return the new value.
    pub fn toggle_open(&self) -> bool {
        let mut state = self.lock();
        state.is_open = !state.is_open;
        state.is_open
    }

    /// True while at least one send awaits its reply.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().pending > 0
    }

    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.lock().pending
    }

    // -------------------------------------------------------------------------
    // Language
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn language(&self) -> Language {
        self.lock().language
    }

    /// Switch the reply language.
    ///
    /// A real change is persisted and, after the configured delay, followed by
    /// one canned assistant message in the new language. Re-selecting the
    /// active language changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LanguageError::Unsupported`] for an unknown code; the session
    /// is left untouched.
    pub fn set_language(&self, code: &str) -> Result<Language, LanguageError> {
        let language = Language::from_code(code).inspect_err(|e| warn!(error = %e, "chat: language rejected"))?;
        let epoch = {
            let mut state = self.lock();
            if state.language == language {
                return Ok(language);
            }
            state.language = language;
            if let Err(e) = save_json(self.store.as_ref(), CHAT_LANGUAGE_KEY, &language) {
                warn!(error = %e, "chat: language write failed");
            }
            state.epoch
        };
        info!(language = language.code(), "chat: language changed");
        self.schedule_canned_reply(language, epoch);
        Ok(language)
    }

    fn schedule_canned_reply(&self, language: Language, epoch: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(language = language.code(), "chat: no async runtime, canned reply skipped");
            return;
        };
        let session = self.clone();
        let delay = self.settings.canned_reply_delay;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            session.append_if_current(epoch, language.canned_reply());
        });
    }

    // -------------------------------------------------------------------------
    // Assistant round-trip
    // -------------------------------------------------------------------------

    /// Submit user input and append the assistant's answer.
    ///
    /// Blank input is ignored. Assistant failures become a visible notice and
    /// are logged; nothing is returned as an error.
    pub async fn send_user_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let (language, epoch, pending) = {
            let mut state = self.lock();
            self.push_locked(&mut state, Role::User, text);
            state.pending += 1;
            let pending = PendingReply { state: Arc::clone(&self.state), settled: false };
            (state.language, state.epoch, pending)
        };
        debug!(language = language.code(), chars = text.chars().count(), "chat: user message sent");

        let result = self.request_reply(&build_prompt(language, text)).await;

        let mut state = self.lock();
        pending.settle(&mut state);
        if state.epoch != epoch {
            debug!("chat: reply discarded after log clear");
            return SendOutcome::Discarded;
        }
        match result {
            Ok(reply) => {
                self.push_locked(&mut state, Role::Assistant, &reply);
                SendOutcome::Replied
            }
            Err(e) => {
                error!(error = %e, retryable = e.retryable(), "chat: assistant request failed");
                self.push_locked(&mut state, Role::Assistant, ASSISTANT_FAILURE_NOTICE);
                SendOutcome::Failed
            }
        }
    }

    /// Fire-and-forget form of [`ChatSession::send_user_message`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_send(&self, text: impl Into<String>) -> JoinHandle<SendOutcome> {
        let session = self.clone();
        let text = text.into();
        tokio::spawn(async move { session.send_user_message(&text).await })
    }

    async fn request_reply(&self, prompt: &str) -> Result<String, ReplyError> {
        let assistant = self.assistant.as_ref().ok_or(ReplyError::NotConfigured)?;
        let response = assistant
            .chat(self.settings.max_tokens, "", &[Message::user(prompt)])
            .await?;
        debug!(
            model = %response.model,
            stop_reason = %response.stop_reason,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "chat: assistant replied"
        );
        Ok(response.text().unwrap_or_else(|| NO_REPLY_FALLBACK.to_string()))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_locked(&self, state: &mut SessionState, role: Role, content: &str) -> ChatMessage {
        let message = ChatMessage::new(role, content);
        state.messages.push(message.clone());
        self.persist_messages(&state.messages);
        message
    }

    fn append_if_current(&self, epoch: u64, content: &str) {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!("chat: canned reply discarded after log clear");
            return;
        }
        self.push_locked(&mut state, Role::Assistant, content);
    }

    fn persist_messages(&self, messages: &[ChatMessage]) {
        if let Err(e) = save_json(self.store.as_ref(), CHAT_HISTORY_KEY, messages) {
            warn!(error = %e, count = messages.len(), "chat: history write failed");
        }
    }
}

pub(crate) fn build_prompt(language: Language, text: &str) -> String {
    format!("You are an agriculture assistant. Reply in {}. Here's the query:\n{text}", language.name())
}

// =============================================================================
// PERSISTENCE
// =============================================================================

fn load_messages(store: &dyn KeyValueStore) -> Vec<ChatMessage> {
    match load_json::<Vec<ChatMessage>>(store, CHAT_HISTORY_KEY) {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "chat: stored history unreadable, starting fresh");
            Vec::new()
        }
    }
}

fn load_language(store: &dyn KeyValueStore) -> Language {
    match load_json::<StoredLanguage>(store, CHAT_LANGUAGE_KEY) {
        Ok(Some(stored)) => Language::from_code(&stored.code).unwrap_or_else(|e| {
            warn!(error = %e, "chat: stored language unsupported, using default");
            Language::default()
        }),
        Ok(None) => Language::default(),
        Err(e) => {
            warn!(error = %e, "chat: stored language unreadable, using default");
            Language::default()
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
