//! Application wiring.
//!
//! DESIGN
//! ======
//! `AgriWise` is the composition root. The token ledger and the chat session
//! share one key-value store; the assistant is optional so the app still
//! opens without LLM credentials. Clone is cheap: every field is a handle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chat::{ChatSession, ChatSettings};
use crate::config::{AgriwiseConfig, ConfigError};
use crate::llm::{LlmChat, LlmClient};
use crate::rewards::TokenLedger;
use crate::rewards::store::TokenStore;
use crate::storage::{FileStore, KeyValueStore};

#[derive(Clone)]
pub struct AgriWise {
    pub ledger: TokenLedger,
    pub chat: ChatSession,
}

impl AgriWise {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, assistant: Option<Arc<dyn LlmChat>>, settings: ChatSettings) -> Self {
        let ledger = TokenLedger::new(Arc::clone(&store));
        let chat = ChatSession::with_settings(store, assistant, settings);
        Self { ledger, chat }
    }

    /// Open the app from environment variables (see [`AgriwiseConfig::from_env`]
    /// and [`crate::llm::config::LlmConfig::from_env`]).
    ///
    /// A missing or broken assistant config is logged and leaves the chat
    /// without an assistant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an app setting is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = AgriwiseConfig::from_env()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.storage_dir.clone()));
        let assistant: Option<Arc<dyn LlmChat>> = match LlmClient::from_env() {
            Ok(client) => {
                info!(model = client.model(), "assistant configured");
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!(error = %e, "assistant unavailable; chat replies will show the failure notice");
                None
            }
        };
        let app = Self::new(store, assistant, config.chat);
        info!(storage_dir = %config.storage_dir.display(), balance = app.ledger.balance(), "agriwise opened");
        Ok(app)
    }

    /// Marketplace view over the shared ledger, with the default catalog.
    #[must_use]
    pub fn token_store(&self) -> TokenStore {
        TokenStore::new(self.ledger.clone())
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
