use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::*;
use crate::chat::language::{WELCOME_EN, WELCOME_HI};
use crate::llm::types::{ChatResponse, ContentBlock};
use crate::storage::test_helpers::{FailingStore, shared_memory_store};
use crate::storage::MemoryStore;

// =============================================================================
// MOCKS
// =============================================================================

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: vec![ContentBlock::Text { text: text.to_string() }],
        model: "mock".into(),
        stop_reason: "end_turn".into(),
        input_tokens: 12,
        output_tokens: 7,
    }
}

/// Answers from a fixed queue and records every request.
struct ScriptedLlm {
    replies: Mutex<Vec<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<(u32, String, Vec<Message>)>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<ChatResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies), requests: Mutex::new(Vec::new()) })
    }

    fn requests(&self) -> Vec<(u32, String, Vec<Message>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmChat for ScriptedLlm {
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push((max_tokens, system.to_string(), messages.to_vec()));
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::ApiParse("no scripted reply".into()));
        }
        replies.remove(0)
    }
}

/// Holds each request until its gate fires. Gates are matched by a
/// substring of the prompt so concurrent sends resolve in a chosen order.
struct GatedLlm {
    gates: Mutex<HashMap<String, (oneshot::Receiver<()>, String)>>,
}

impl GatedLlm {
    fn new(gates: Vec<(&str, oneshot::Receiver<()>, &str)>) -> Arc<Self> {
        let gates = gates
            .into_iter()
            .map(|(needle, rx, reply)| (needle.to_string(), (rx, reply.to_string())))
            .collect();
        Arc::new(Self { gates: Mutex::new(gates) })
    }
}

#[async_trait]
impl LlmChat for GatedLlm {
    async fn chat(&self, _max_tokens: u32, _system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        let prompt = &messages[0].content;
        let (rx, reply) = {
            let mut gates = self.gates.lock().unwrap();
            let key = gates.keys().find(|k| prompt.contains(k.as_str())).cloned().expect("no gate for prompt");
            gates.remove(&key).unwrap()
        };
        let _ = rx.await;
        Ok(text_response(&reply))
    }
}

fn session_with(assistant: Option<Arc<dyn LlmChat>>) -> (MemoryStore, ChatSession) {
    let (mem, store) = shared_memory_store();
    (mem, ChatSession::new(store, assistant))
}

fn stored_history(mem: &MemoryStore) -> Vec<ChatMessage> {
    crate::storage::load_json(mem, CHAT_HISTORY_KEY).unwrap().unwrap_or_default()
}

async fn wait_for_pending(session: &ChatSession, count: usize) {
    while session.pending_replies() < count {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// OPENING
// =============================================================================

#[test]
fn empty_log_gets_english_welcome() {
    let (mem, session) = session_with(None);

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].content, WELCOME_EN);
    assert_eq!(stored_history(&mem), messages);
    assert_eq!(session.language().code(), "en");
    assert!(!session.is_open());
    assert!(!session.is_loading());
}

#[test]
fn welcome_follows_stored_language() {
    let (mem, store) = shared_memory_store();
    save_json(&mem, CHAT_LANGUAGE_KEY, &Language::from_code("hi").unwrap()).unwrap();

    let session = ChatSession::new(store, None);

    assert_eq!(session.language().code(), "hi");
    assert_eq!(session.messages()[0].content, WELCOME_HI);
}

#[test]
fn stored_history_is_restored_without_welcome() {
    let (mem, store) = shared_memory_store();
    let history = vec![ChatMessage::new(Role::User, "When to sow wheat?"), ChatMessage::new(Role::Assistant, "November.")];
    save_json(&mem, CHAT_HISTORY_KEY, &history).unwrap();

    let session = ChatSession::new(store, None);

    assert_eq!(session.messages(), history);
}

#[test]
fn corrupt_history_starts_fresh() {
    let (mem, store) = shared_memory_store();
    mem.set(CHAT_HISTORY_KEY, "{not json").unwrap();

    let session = ChatSession::new(store, None);

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, WELCOME_EN);
}

#[test]
fn unsupported_stored_language_falls_back_to_default() {
    let (mem, store) = shared_memory_store();
    mem.set(CHAT_LANGUAGE_KEY, r#"{"code":"xx","name":"Nowhere"}"#).unwrap();

    let session = ChatSession::new(store, None);

    assert_eq!(session.language(), Language::default());
}

#[test]
fn unavailable_storage_still_opens() {
    let session = ChatSession::new(Arc::new(FailingStore), None);

    session.append_message(Role::User, "hello");

    assert_eq!(session.messages().len(), 2);
}

// =============================================================================
// TRANSCRIPT
// =============================================================================

#[test]
fn append_keeps_order_and_persists() {
    let (mem, session) = session_with(None);

    let first = session.append_message(Role::User, "one");
    let second = session.append_message(Role::Assistant, "two");

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], first);
    assert_eq!(messages[2], second);
    assert_ne!(first.id, second.id);
    assert_eq!(stored_history(&mem), messages);
}

#[test]
fn clear_log_empties_until_next_open() {
    let (mem, store) = shared_memory_store();
    let session = ChatSession::new(Arc::clone(&store), None);
    session.append_message(Role::User, "hello");

    session.clear_log();

    assert!(session.messages().is_empty());
    assert_eq!(mem.get(CHAT_HISTORY_KEY).unwrap().as_deref(), Some("[]"));

    let reopened = ChatSession::new(store, None);
    let messages = reopened.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, WELCOME_EN);
}

#[test]
fn toggle_flips_visibility() {
    let (_mem, session) = session_with(None);

    assert!(session.toggle_open());
    assert!(session.is_open());
    assert!(!session.toggle_open());
    session.set_open(true);
    assert!(session.snapshot().is_open);
}

// =============================================================================
// SENDING
// =============================================================================

#[tokio::test]
async fn whitespace_input_is_ignored() {
    let llm = ScriptedLlm::new(vec![]);
    let (_mem, session) = session_with(Some(llm.clone()));

    assert_eq!(session.send_user_message("   \n\t").await, SendOutcome::Ignored);

    assert_eq!(session.messages().len(), 1);
    assert!(llm.requests().is_empty());
}

#[tokio::test]
async fn reply_is_appended_after_trimmed_user_message() {
    let llm = ScriptedLlm::new(vec![Ok(text_response("Use neem oil."))]);
    let (mem, session) = session_with(Some(llm.clone()));

    let outcome = session.send_user_message("  How do I treat aphids?  ").await;

    assert_eq!(outcome, SendOutcome::Replied);
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "How do I treat aphids?");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, "Use neem oil.");
    assert!(!session.is_loading());
    assert_eq!(stored_history(&mem), messages);

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    let (max_tokens, system, sent) = &requests[0];
    assert_eq!(*max_tokens, DEFAULT_ASSISTANT_MAX_TOKENS);
    assert!(system.is_empty());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].role, "user");
    assert_eq!(
        sent[0].content,
        "You are an agriculture assistant. Reply in English. Here's the query:\nHow do I treat aphids?"
    );
}

#[tokio::test]
async fn empty_reply_uses_fallback() {
    let llm = ScriptedLlm::new(vec![Ok(text_response("   "))]);
    let (_mem, session) = session_with(Some(llm));

    assert_eq!(session.send_user_message("hi").await, SendOutcome::Replied);

    assert_eq!(session.messages().last().unwrap().content, NO_REPLY_FALLBACK);
}

#[tokio::test]
async fn reasoning_only_reply_uses_fallback() {
    let mut truncated = text_response("");
    truncated.content = vec![ContentBlock::Thinking { thinking: "Let me reason about urea dosage".into() }];
    truncated.stop_reason = "max_tokens".into();
    let llm = ScriptedLlm::new(vec![Ok(truncated)]);
    let (_mem, session) = session_with(Some(llm));

    assert_eq!(session.send_user_message("how much urea?").await, SendOutcome::Replied);

    assert_eq!(session.messages().last().unwrap().content, NO_REPLY_FALLBACK);
}

#[tokio::test]
async fn assistant_error_appends_failure_notice() {
    let llm = ScriptedLlm::new(vec![Err(LlmError::ApiResponse { status: 503, body: "busy".into() })]);
    let (_mem, session) = session_with(Some(llm));

    assert_eq!(session.send_user_message("hi").await, SendOutcome::Failed);

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].content, "hi");
    assert_eq!(messages[2].content, ASSISTANT_FAILURE_NOTICE);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn missing_assistant_appends_failure_notice() {
    let (_mem, session) = session_with(None);

    assert_eq!(session.send_user_message("hi").await, SendOutcome::Failed);

    assert_eq!(session.messages().last().unwrap().content, ASSISTANT_FAILURE_NOTICE);
}

#[tokio::test]
async fn custom_budget_is_forwarded() {
    let llm = ScriptedLlm::new(vec![Ok(text_response("ok"))]);
    let (_mem, store) = shared_memory_store();
    let settings = ChatSettings { canned_reply_delay: Duration::ZERO, max_tokens: 256 };
    let session = ChatSession::with_settings(store, Some(llm.clone()), settings);

    session.send_user_message("hi").await;

    assert_eq!(llm.requests()[0].0, 256);
}

#[tokio::test]
async fn loading_tracks_outstanding_reply() {
    let (release, gate) = oneshot::channel();
    let llm = GatedLlm::new(vec![("soil", gate, "Test the pH.")]);
    let (_mem, session) = session_with(Some(llm));

    let handle = session.spawn_send("soil advice");
    wait_for_pending(&session, 1).await;
    assert!(session.is_loading());
    assert!(session.snapshot().is_loading);

    release.send(()).unwrap();
    assert_eq!(handle.await.unwrap(), SendOutcome::Replied);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn aborted_send_releases_loading() {
    let (_release, gate) = oneshot::channel::<()>();
    let llm = GatedLlm::new(vec![("hung", gate, "never delivered")]);
    let (_mem, session) = session_with(Some(llm));

    let handle = session.spawn_send("hung question");
    wait_for_pending(&session, 1).await;
    handle.abort();

    assert!(handle.await.unwrap_err().is_cancelled());
    assert_eq!(session.pending_replies(), 0);
    assert!(!session.is_loading());
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn timed_out_send_releases_loading() {
    let (_release, gate) = oneshot::channel::<()>();
    let llm = GatedLlm::new(vec![("slow", gate, "too late")]);
    let (_mem, session) = session_with(Some(llm));

    let result = tokio::time::timeout(Duration::from_millis(10), session.send_user_message("slow answer")).await;

    assert!(result.is_err());
    assert!(!session.is_loading());
}

#[tokio::test]
async fn replies_land_in_completion_order() {
    let (release_a, gate_a) = oneshot::channel();
    let (release_b, gate_b) = oneshot::channel();
    let llm = GatedLlm::new(vec![("first", gate_a, "answer A"), ("second", gate_b, "answer B")]);
    let (_mem, session) = session_with(Some(llm));

    let a = session.spawn_send("first question");
    let b = session.spawn_send("second question");
    wait_for_pending(&session, 2).await;

    release_b.send(()).unwrap();
    assert_eq!(b.await.unwrap(), SendOutcome::Replied);
    assert!(session.is_loading());
    release_a.send(()).unwrap();
    assert_eq!(a.await.unwrap(), SendOutcome::Replied);

    let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents.len(), 5);
    assert_eq!(&contents[3..], ["answer B", "answer A"]);
}

#[tokio::test]
async fn reply_after_clear_is_discarded() {
    let (release, gate) = oneshot::channel();
    let llm = GatedLlm::new(vec![("rain", gate, "late answer")]);
    let (mem, session) = session_with(Some(llm));

    let handle = session.spawn_send("rain forecast?");
    wait_for_pending(&session, 1).await;
    session.clear_log();
    release.send(()).unwrap();

    assert_eq!(handle.await.unwrap(), SendOutcome::Discarded);
    assert!(session.messages().is_empty());
    assert!(stored_history(&mem).is_empty());
    assert!(!session.is_loading());
}

// =============================================================================
// LANGUAGE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn language_change_posts_canned_reply_after_delay() {
    let (mem, store) = shared_memory_store();
    let session = ChatSession::new(Arc::clone(&store), None);

    let language = session.set_language("hi").unwrap();
    assert_eq!(language.name(), "Hindi");
    assert_eq!(session.language().code(), "hi");

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(session.messages().len(), 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, language.canned_reply());
    assert_eq!(stored_history(&mem), messages);

    let reopened = ChatSession::new(store, None);
    assert_eq!(reopened.language().code(), "hi");
}

#[tokio::test(start_paused = true)]
async fn reselecting_language_posts_nothing() {
    let (_mem, session) = session_with(None);

    assert_eq!(session.set_language("en").unwrap().code(), "en");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(session.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_language_is_rejected() {
    let (_mem, session) = session_with(None);

    let err = session.set_language("xx").unwrap_err();
    assert_eq!(err, LanguageError::Unsupported("xx".into()));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(session.language().code(), "en");
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn canned_reply_after_clear_is_discarded() {
    let (_mem, session) = session_with(None);

    session.set_language("bn").unwrap();
    session.clear_log();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(session.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn prompt_uses_active_language() {
    let llm = ScriptedLlm::new(vec![Ok(text_response("ठीक है"))]);
    let (_mem, session) = session_with(Some(llm.clone()));

    session.set_language("hi").unwrap();
    session.send_user_message("fertilizer for rice").await;

    let prompt = &llm.requests()[0].2[0].content;
    assert!(prompt.contains("Reply in Hindi."));
    assert!(prompt.ends_with("\nfertilizer for rice"));
}

#[test]
fn language_change_outside_runtime_skips_canned_reply() {
    let (_mem, session) = session_with(None);

    assert_eq!(session.set_language("ta").unwrap().code(), "ta");
    assert_eq!(session.messages().len(), 1);
}
