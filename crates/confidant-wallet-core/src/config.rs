// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Engine-level configuration and pricing arithmetic.
//!
//! [`Config`] is the single entry point for tuning the engine at construction
//! time.  `Config::default()` carries the production rates: 2 tokens per call
//! minute, 1 token per chat message pair, 30-day plans.
//!
//! The allocator and the settlement service both price usage through the
//! methods on [`Config`], so a grant and its settlement can never disagree on
//! rates.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::SessionKind;

/// One day in milliseconds.
pub const DAY_MS: u64 = 86_400_000;

/// Top-level configuration for [`WalletEngine`](crate::engine::WalletEngine).
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::config::Config;
///
/// let config = Config {
///     signup_free_messages: 5,
///     ..Config::default()
/// };
/// assert_eq!(config.max_transaction_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tokens charged per started call minute.
    pub call_cost_per_minute: Decimal,

    /// Tokens charged per started pair of chat messages.
    pub chat_cost_per_message_pair: Decimal,

    /// Wall-clock ceiling, in seconds, for a free-trial chat session.
    pub free_trial_chat_ceiling_secs: u64,

    /// Lifetime of a purchased plan, counted from the moment it is credited.
    pub plan_validity_ms: u64,

    /// Free-trial chat messages granted when a wallet is opened.
    pub signup_free_messages: u32,

    /// Optimistic attempts per wallet transaction before reporting
    /// contention.
    pub max_transaction_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_cost_per_minute: Decimal::from(2),
            chat_cost_per_message_pair: Decimal::ONE,
            free_trial_chat_ceiling_secs: 3 * 60 * 60,
            plan_validity_ms: 30 * DAY_MS,
            signup_free_messages: 3,
            max_transaction_attempts: 5,
        }
    }
}

impl Config {
    /// Plan units a session consumed: started minutes for calls, messages
    /// for chats.
    ///
    /// ```rust
    /// use confidant_wallet_core::{config::Config, types::SessionKind};
    ///
    /// assert_eq!(Config::billable_plan_units(SessionKind::Call, 185), 4);
    /// assert_eq!(Config::billable_plan_units(SessionKind::Call, 180), 3);
    /// assert_eq!(Config::billable_plan_units(SessionKind::Chat, 7), 7);
    /// ```
    pub fn billable_plan_units(kind: SessionKind, consumed_units: u64) -> u64 {
        match kind {
            SessionKind::Call => consumed_units.div_ceil(60),
            SessionKind::Chat => consumed_units,
        }
    }

    /// Tokens owed for a session paid from the token balance.
    ///
    /// Calls pay per started minute, chats per started message pair.  A cost
    /// beyond the decimal range saturates; settlement clamps it to the
    /// balance anyway.
    pub fn token_cost(&self, kind: SessionKind, consumed_units: u64) -> Decimal {
        match kind {
            SessionKind::Call => Decimal::from(consumed_units.div_ceil(60))
                .checked_mul(self.call_cost_per_minute),
            SessionKind::Chat => Decimal::from(consumed_units.div_ceil(2))
                .checked_mul(self.chat_cost_per_message_pair),
        }
        .unwrap_or(Decimal::MAX)
    }

    /// Whole billable units (`minutes` or `messages`) a token balance covers.
    pub fn token_capacity(&self, kind: SessionKind, tokens: Decimal) -> u64 {
        let capacity = match kind {
            SessionKind::Call => tokens.checked_div(self.call_cost_per_minute),
            SessionKind::Chat => tokens
                .checked_mul(Decimal::TWO)
                .and_then(|halves| halves.checked_div(self.chat_cost_per_message_pair))
                .or_else(|| {
                    // Balances near the decimal limit: divide first.
                    tokens
                        .checked_div(self.chat_cost_per_message_pair)
                        .map(|pairs| pairs.floor().checked_mul(Decimal::TWO).unwrap_or(Decimal::MAX))
                }),
        };
        capacity
            .map(|units| units.floor())
            .filter(|units| units.is_sign_positive())
            .map(|units| units.to_u64().unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Check the invariants the pricing arithmetic relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.call_cost_per_minute <= Decimal::ZERO {
            return Err("call_cost_per_minute must be positive".into());
        }
        if self.chat_cost_per_message_pair <= Decimal::ZERO {
            return Err("chat_cost_per_message_pair must be positive".into());
        }
        if self.free_trial_chat_ceiling_secs == 0 {
            return Err("free_trial_chat_ceiling_secs must be positive".into());
        }
        if self.plan_validity_ms == 0 {
            return Err("plan_validity_ms must be positive".into());
        }
        if self.max_transaction_attempts == 0 {
            return Err("max_transaction_attempts must be at least 1".into());
        }
        Ok(())
    }
}
