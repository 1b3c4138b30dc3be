// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Session funding decisions.
//!
//! [`PlanAllocator`] answers one question before a session starts: which
//! funding source pays for it, and up to how many units.  Allocation is a
//! read-only function of the wallet snapshot; nothing is reserved.
//!
//! Precedence, per kind:
//!
//! * call: usable call plan, then tokens at the per-minute rate
//! * chat: free-trial messages, then usable chat plan, then tokens at the
//!   per-message-pair rate
//!
//! Among several usable plans the one expiring soonest wins (ties broken by
//! lowest id), so allowances are spent before they lapse.

use tracing::debug;

use crate::config::Config;
use crate::error::EngineError;
use crate::storage::{transact, Mutation, WalletCommit, WalletStore};
use crate::types::{
    Allocation, FreeMessageOutcome, FundingSource, GrantUnit, Plan, SessionGrant, SessionKind,
    Wallet, WalletBalance,
};

/// Computes session grants and manages the free-trial counter.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::{
///     allocator::PlanAllocator,
///     config::Config,
///     storage::{InMemoryWalletStore, WalletStore},
///     types::{FundingSource, SessionKind, Wallet},
/// };
/// use rust_decimal::Decimal;
///
/// let store = InMemoryWalletStore::new();
/// let mut wallet = Wallet::new("user-1", 0, 0);
/// wallet.tokens = Decimal::from(7);
/// store.create_wallet(wallet).unwrap();
///
/// let allocator = PlanAllocator::new(Config::default(), store);
/// let allocation = allocator.request_grant("user-1", SessionKind::Call, 1_000).unwrap();
/// let grant = allocation.grant().unwrap();
///
/// // 7 tokens at 2 tokens/minute cover 3 whole minutes.
/// assert_eq!(grant.authorized_units, 180);
/// assert_eq!(grant.funding_source, FundingSource::Tokens);
/// ```
pub struct PlanAllocator<S: WalletStore> {
    config: Config,
    storage: S,
}

impl<S: WalletStore> PlanAllocator<S> {
    /// Create a new [`PlanAllocator`].
    pub fn new(config: Config, storage: S) -> Self {
        Self { config, storage }
    }

    /// Decide how `wallet` funds a session of `kind` at `now_ms`.
    ///
    /// Pure: the wallet is not modified and no funds are held back.
    pub fn allocate(&self, wallet: &Wallet, kind: SessionKind, now_ms: u64) -> Allocation {
        match kind {
            SessionKind::Call => self.allocate_call(wallet, now_ms),
            SessionKind::Chat => self.allocate_chat(wallet, now_ms),
        }
    }

    /// Load `user_id`'s wallet and [`allocate`](Self::allocate) against it.
    pub fn request_grant(
        &self,
        user_id: &str,
        kind: SessionKind,
        now_ms: u64,
    ) -> Result<Allocation, EngineError> {
        let wallet = self
            .storage
            .get_wallet(user_id)?
            .ok_or_else(|| EngineError::WalletNotFound(user_id.into()))?;

        let allocation = self.allocate(&wallet, kind, now_ms);
        match allocation {
            Allocation::Granted(ref grant) => debug!(
                user_id,
                session_kind = %kind,
                funding_source = %grant.funding_source,
                authorized_units = grant.authorized_units,
                is_free_trial = grant.is_free_trial,
                "session granted"
            ),
            Allocation::Unfunded { ref reason, .. } => {
                debug!(user_id, session_kind = %kind, reason = %reason, "session unfunded")
            }
        }
        Ok(allocation)
    }

    /// Take one free-trial chat message from `user_id`'s signup grant.
    ///
    /// Returns [`FreeMessageOutcome::Exhausted`] without writing when the
    /// counter is already zero.
    pub fn consume_free_message(&self, user_id: &str) -> Result<FreeMessageOutcome, EngineError> {
        transact(
            &self.storage,
            user_id,
            self.config.max_transaction_attempts,
            |mut wallet| {
                if wallet.free_messages == 0 {
                    return Ok(Mutation::Skip(FreeMessageOutcome::Exhausted));
                }
                wallet.free_messages -= 1;
                let remaining = wallet.free_messages;
                Ok(Mutation::Commit {
                    commit: WalletCommit::update(wallet),
                    output: FreeMessageOutcome::Consumed { remaining },
                })
            },
        )
    }

    /// Spendable balance for `user_id`, inert plans excluded.
    pub fn balance(&self, user_id: &str, now_ms: u64) -> Result<WalletBalance, EngineError> {
        self.storage
            .get_wallet(user_id)?
            .map(|wallet| wallet.balance(now_ms))
            .ok_or_else(|| EngineError::WalletNotFound(user_id.into()))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn allocate_call(&self, wallet: &Wallet, now_ms: u64) -> Allocation {
        if let Some(plan) = select_plan(wallet, SessionKind::Call, now_ms) {
            return Allocation::Granted(SessionGrant {
                session_kind: SessionKind::Call,
                funding_source: FundingSource::Plan {
                    plan_id: plan.id.clone(),
                },
                authorized_units: plan.remaining.saturating_mul(60),
                unit: GrantUnit::Seconds,
                is_free_trial: false,
            });
        }

        let minutes = self.config.token_capacity(SessionKind::Call, wallet.tokens);
        if minutes >= 1 {
            return Allocation::Granted(SessionGrant {
                session_kind: SessionKind::Call,
                funding_source: FundingSource::Tokens,
                authorized_units: minutes.saturating_mul(60),
                unit: GrantUnit::Seconds,
                is_free_trial: false,
            });
        }

        Allocation::Unfunded {
            session_kind: SessionKind::Call,
            reason: format!(
                "no usable call plan and {} tokens is below the {} tokens a minute costs",
                wallet.tokens.normalize(),
                self.config.call_cost_per_minute.normalize()
            ),
        }
    }

    fn allocate_chat(&self, wallet: &Wallet, now_ms: u64) -> Allocation {
        if wallet.free_messages > 0 {
            return Allocation::Granted(SessionGrant {
                session_kind: SessionKind::Chat,
                funding_source: FundingSource::Tokens,
                authorized_units: self.config.free_trial_chat_ceiling_secs,
                unit: GrantUnit::Seconds,
                is_free_trial: true,
            });
        }

        if let Some(plan) = select_plan(wallet, SessionKind::Chat, now_ms) {
            return Allocation::Granted(SessionGrant {
                session_kind: SessionKind::Chat,
                funding_source: FundingSource::Plan {
                    plan_id: plan.id.clone(),
                },
                authorized_units: plan.remaining,
                unit: GrantUnit::Messages,
                is_free_trial: false,
            });
        }

        let messages = self.config.token_capacity(SessionKind::Chat, wallet.tokens);
        if messages >= 1 {
            return Allocation::Granted(SessionGrant {
                session_kind: SessionKind::Chat,
                funding_source: FundingSource::Tokens,
                authorized_units: messages,
                unit: GrantUnit::Messages,
                is_free_trial: false,
            });
        }

        Allocation::Unfunded {
            session_kind: SessionKind::Chat,
            reason: format!(
                "no free messages, no usable chat plan and {} tokens cannot pay for a message",
                wallet.tokens.normalize()
            ),
        }
    }
}

/// Usable plan of `kind` expiring soonest; ties go to the lowest id.
fn select_plan(wallet: &Wallet, kind: SessionKind, now_ms: u64) -> Option<&Plan> {
    wallet.usable_plans(kind, now_ms).min_by(|left, right| {
        left.expires_at_ms
            .cmp(&right.expires_at_ms)
            .then_with(|| left.id.cmp(&right.id))
    })
}
