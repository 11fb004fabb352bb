//! Rewards — the spendable AgriToken balance.
//!
//! DESIGN
//! ======
//! `TokenLedger` is a clonable handle over one shared balance, so every
//! screen that shows or spends tokens sees the same number. The
//! balance is written to the injected store after every mutation.
//!
//! INVARIANTS
//! ==========
//! The balance is a `u64` and debits are all-or-nothing: a debit larger
//! than the balance changes nothing and reports `false`. Running out of
//! tokens is an expected outcome, not an error.

pub mod store;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::storage::{KeyValueStore, TOKEN_BALANCE_KEY};

/// Tokens granted for contributing a disease image.
pub const CONTRIBUTION_REWARD: u64 = 10;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("credit amount must be positive")]
    NonPositiveAmount,
}

// =============================================================================
// LEDGER
// =============================================================================

#[derive(Clone)]
pub struct TokenLedger {
    balance: Arc<Mutex<u64>>,
    store: Arc<dyn KeyValueStore>,
}

impl TokenLedger {
    /// Open the ledger, restoring the last persisted balance.
    ///
    /// A missing or unreadable value starts the ledger at zero.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let balance = load_balance(store.as_ref());
        info!(balance, "rewards: ledger opened");
        Self { balance: Arc::new(Mutex::new(balance)), store }
    }

    #[must_use]
    pub fn balance(&self) -> u64 {
        *self.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `amount` tokens and return the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonPositiveAmount`] for a zero amount; the
    /// balance is left untouched.
    pub fn credit(&self, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            warn!("rewards: rejected zero credit");
            return Err(LedgerError::NonPositiveAmount);
        }
        Ok(self.add(amount))
    }

    /// Spend `amount` tokens if the balance fully covers it.
    ///
    /// Returns `false` and leaves the balance unchanged otherwise.
    pub fn debit(&self, amount: u64) -> bool {
        let mut balance = self.balance.lock().unwrap_or_else(PoisonError::into_inner);
        if *balance < amount {
            info!(balance = *balance, amount, "rewards: insufficient tokens");
            return false;
        }
        if amount == 0 {
            return true;
        }
        *balance -= amount;
        persist_balance(self.store.as_ref(), *balance);
        info!(balance = *balance, amount, "rewards: debited");
        true
    }

    /// Credit [`CONTRIBUTION_REWARD`] for an accepted image contribution.
    pub fn award_contribution(&self) -> u64 {
        self.add(CONTRIBUTION_REWARD)
    }

    fn add(&self, amount: u64) -> u64 {
        let mut balance = self.balance.lock().unwrap_or_else(PoisonError::into_inner);
        *balance = balance.saturating_add(amount);
        persist_balance(self.store.as_ref(), *balance);
        info!(balance = *balance, amount, "rewards: credited");
        *balance
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

fn load_balance(store: &dyn KeyValueStore) -> u64 {
    match store.get(TOKEN_BALANCE_KEY) {
        Ok(Some(raw)) => match raw.trim().parse::<u64>() {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, raw = %raw, "rewards: stored balance unparsable, starting at 0");
                0
            }
        },
        Ok(None) => 0,
        Err(e) => {
            warn!(error = %e, "rewards: balance read failed, starting at 0");
            0
        }
    }
}

// Called with the balance lock held so writes land in mutation order.
fn persist_balance(store: &dyn KeyValueStore, balance: u64) {
    if let Err(e) = store.set(TOKEN_BALANCE_KEY, &balance.to_string()) {
        warn!(error = %e, balance, "rewards: balance write failed");
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
