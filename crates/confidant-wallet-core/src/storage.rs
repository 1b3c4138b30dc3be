// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage abstraction for the wallet engine.
//!
//! The [`WalletStore`] trait is the single interface between the engine and
//! any persistence layer.  Reads are plain lookups; every mutation goes
//! through [`WalletStore::commit`], a per-user compare-and-swap that applies a
//! new wallet state together with its side records (settlement marker and
//! usage entry, or idempotency record and recharge entry) all-or-nothing.
//!
//! [`transact`] wraps `commit` in the bounded optimistic retry loop every
//! engine component uses.  This crate ships [`InMemoryWalletStore`]; the
//! file-backed store lives in `confidant-wallet-std`.  Both keep their rows in
//! a [`WalletTables`] so commit semantics are identical across backends.
//!
//! # Implementing `WalletStore`
//!
//! ```rust,no_run
//! use confidant_wallet_core::error::StoreError;
//! use confidant_wallet_core::storage::{WalletCommit, WalletStore};
//! use confidant_wallet_core::types::{
//!     LedgerFilter, RechargeLedgerEntry, UsageLedgerEntry, Wallet,
//! };
//!
//! struct MyStore;
//!
//! impl WalletStore for MyStore {
//!     fn get_wallet(&self, _user_id: &str) -> Result<Option<Wallet>, StoreError> { Ok(None) }
//!     fn create_wallet(&self, _wallet: Wallet) -> Result<Wallet, StoreError> {
//!         Err(StoreError::Backend("read-only".into()))
//!     }
//!     fn commit(&self, user_id: &str, _commit: WalletCommit) -> Result<Wallet, StoreError> {
//!         Err(StoreError::WalletNotFound(user_id.into()))
//!     }
//!     fn find_usage(&self, _user_id: &str, _session_id: &str)
//!         -> Result<Option<UsageLedgerEntry>, StoreError> { Ok(None) }
//!     fn is_payment_processed(&self, _payment_id: &str) -> Result<bool, StoreError> { Ok(false) }
//!     fn query_usage(&self, _filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, StoreError> {
//!         Ok(Vec::new())
//!     }
//!     fn query_recharges(&self, _filter: &LedgerFilter)
//!         -> Result<Vec<RechargeLedgerEntry>, StoreError> { Ok(Vec::new()) }
//! }
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, StoreError};
use crate::types::{
    LedgerFilter, ProcessedPayment, RechargeLedgerEntry, UsageLedgerEntry, Wallet,
};

// ---------------------------------------------------------------------------
// Commit payload
// ---------------------------------------------------------------------------

/// Idempotency record and ledger entry written with a payment credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCredit {
    pub processed: ProcessedPayment,
    pub recharge: RechargeLedgerEntry,
}

/// One atomic change to one user's wallet document.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletCommit {
    /// Version the change was computed from.
    pub expected_version: u64,
    /// New wallet state.  The store assigns `expected_version + 1`.
    pub wallet: Wallet,
    /// Usage entry to append; its `session_id` becomes the settlement marker.
    pub settlement: Option<UsageLedgerEntry>,
    /// Payment credit to record in the idempotency ledger.
    pub payment: Option<PaymentCredit>,
}

impl WalletCommit {
    /// A bare wallet update derived from `wallet`'s own version.
    pub fn update(wallet: Wallet) -> Self {
        Self {
            expected_version: wallet.version,
            wallet,
            settlement: None,
            payment: None,
        }
    }

    pub fn with_settlement(mut self, entry: UsageLedgerEntry) -> Self {
        self.settlement = Some(entry);
        self
    }

    pub fn with_payment(mut self, credit: PaymentCredit) -> Self {
        self.payment = Some(credit);
        self
    }
}

// ---------------------------------------------------------------------------
// WalletStore trait
// ---------------------------------------------------------------------------

/// Pluggable persistence interface for the wallet engine.
///
/// Methods take `&self`: implementations own their synchronisation so that
/// clones of one store can be handed to every engine component and unrelated
/// users never wait on each other beyond the duration of a single commit.
///
/// Implementations MUST be `Send + Sync`.
pub trait WalletStore: Send + Sync {
    /// Retrieve the wallet for `user_id`, if any.
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, StoreError>;

    /// Insert a new wallet; fails with [`StoreError::WalletExists`] when one
    /// is already present.
    fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError>;

    /// Apply `commit` atomically.
    ///
    /// Fails without side effects when the stored version differs from
    /// `commit.expected_version`, when the session is already settled, or
    /// when the payment is already processed.  Returns the stored wallet.
    fn commit(&self, user_id: &str, commit: WalletCommit) -> Result<Wallet, StoreError>;

    /// The usage entry written when `session_id` was settled, if it was.
    fn find_usage(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<UsageLedgerEntry>, StoreError>;

    /// Whether `payment_id` is in the idempotency ledger.
    fn is_payment_processed(&self, payment_id: &str) -> Result<bool, StoreError>;

    /// Usage entries matching `filter`, oldest first.
    fn query_usage(&self, filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, StoreError>;

    /// Recharge entries matching `filter`, oldest first.
    fn query_recharges(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<RechargeLedgerEntry>, StoreError>;
}

/// Lets a type-erased `Arc<dyn WalletStore>` drive the engine.
impl<T: WalletStore + ?Sized> WalletStore for Arc<T> {
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        (**self).get_wallet(user_id)
    }

    fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        (**self).create_wallet(wallet)
    }

    fn commit(&self, user_id: &str, commit: WalletCommit) -> Result<Wallet, StoreError> {
        (**self).commit(user_id, commit)
    }

    fn find_usage(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<UsageLedgerEntry>, StoreError> {
        (**self).find_usage(user_id, session_id)
    }

    fn is_payment_processed(&self, payment_id: &str) -> Result<bool, StoreError> {
        (**self).is_payment_processed(payment_id)
    }

    fn query_usage(&self, filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, StoreError> {
        (**self).query_usage(filter)
    }

    fn query_recharges(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<RechargeLedgerEntry>, StoreError> {
        (**self).query_recharges(filter)
    }
}

// ---------------------------------------------------------------------------
// WalletTables
// ---------------------------------------------------------------------------

/// Row storage shared by the bundled store implementations.
///
/// Serialisable so file-backed stores can snapshot it as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletTables {
    /// Key: user id → wallet document.
    wallets: HashMap<String, Wallet>,
    /// Key: `"{user_id}:{session_id}"` → index into `usage`.
    settled_sessions: HashMap<String, usize>,
    /// Key: payment id → idempotency record.
    processed_payments: HashMap<String, ProcessedPayment>,
    /// Append-only usage ledger.
    usage: Vec<UsageLedgerEntry>,
    /// Append-only recharge ledger.
    recharges: Vec<RechargeLedgerEntry>,
}

impl WalletTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite key for the settlement marker set.
    fn session_key(user_id: &str, session_id: &str) -> String {
        let mut key = String::with_capacity(user_id.len() + 1 + session_id.len());
        key.push_str(user_id);
        key.push(':');
        key.push_str(session_id);
        key
    }

    pub fn wallet(&self, user_id: &str) -> Option<Wallet> {
        self.wallets.get(user_id).cloned()
    }

    pub fn insert_wallet(&mut self, wallet: Wallet) -> Result<Wallet, StoreError> {
        if self.wallets.contains_key(&wallet.user_id) {
            return Err(StoreError::WalletExists(wallet.user_id));
        }
        self.wallets.insert(wallet.user_id.clone(), wallet.clone());
        Ok(wallet)
    }

    /// Validate every precondition of `commit`, then apply it.
    pub fn apply(&mut self, user_id: &str, commit: WalletCommit) -> Result<Wallet, StoreError> {
        let current = self
            .wallets
            .get(user_id)
            .ok_or_else(|| StoreError::WalletNotFound(user_id.into()))?;

        if current.version != commit.expected_version {
            return Err(StoreError::StaleWalletState {
                user_id: user_id.into(),
                expected: commit.expected_version,
                found: current.version,
            });
        }
        if commit.wallet.user_id != user_id {
            return Err(StoreError::Backend(format!(
                "commit for '{}' carries wallet of '{}'",
                user_id, commit.wallet.user_id
            )));
        }

        let session_key = commit
            .settlement
            .as_ref()
            .map(|entry| Self::session_key(user_id, &entry.session_id));
        if let (Some(key), Some(entry)) = (&session_key, &commit.settlement) {
            if self.settled_sessions.contains_key(key) {
                return Err(StoreError::SessionAlreadySettled(entry.session_id.clone()));
            }
        }
        if let Some(ref credit) = commit.payment {
            if self
                .processed_payments
                .contains_key(&credit.processed.payment_id)
            {
                return Err(StoreError::PaymentAlreadyProcessed(
                    credit.processed.payment_id.clone(),
                ));
            }
        }

        let mut wallet = commit.wallet;
        wallet.version = commit.expected_version + 1;
        self.wallets.insert(user_id.into(), wallet.clone());

        if let (Some(key), Some(entry)) = (session_key, commit.settlement) {
            self.settled_sessions.insert(key, self.usage.len());
            self.usage.push(entry);
        }
        if let Some(credit) = commit.payment {
            self.processed_payments
                .insert(credit.processed.payment_id.clone(), credit.processed);
            self.recharges.push(credit.recharge);
        }
        Ok(wallet)
    }

    pub fn find_usage(&self, user_id: &str, session_id: &str) -> Option<UsageLedgerEntry> {
        self.settled_sessions
            .get(&Self::session_key(user_id, session_id))
            .and_then(|&index| self.usage.get(index))
            .cloned()
    }

    pub fn is_payment_processed(&self, payment_id: &str) -> bool {
        self.processed_payments.contains_key(payment_id)
    }

    pub fn query_usage(&self, filter: &LedgerFilter) -> Vec<UsageLedgerEntry> {
        self.usage
            .iter()
            .filter(|entry| filter.admits_usage(entry))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn query_recharges(&self, filter: &LedgerFilter) -> Vec<RechargeLedgerEntry> {
        self.recharges
            .iter()
            .filter(|entry| filter.admits_recharge(entry))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// InMemoryWalletStore
// ---------------------------------------------------------------------------

/// A volatile [`WalletStore`] backed by [`hashbrown::HashMap`] tables.
///
/// Clones share the same tables, so one store can be handed to every engine
/// component.  All data is lost when the last clone is dropped.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::storage::{InMemoryWalletStore, WalletCommit, WalletStore};
/// use confidant_wallet_core::types::Wallet;
///
/// let store = InMemoryWalletStore::new();
/// store.create_wallet(Wallet::new("user-1", 3, 0)).unwrap();
///
/// let mut wallet = store.get_wallet("user-1").unwrap().unwrap();
/// wallet.free_messages -= 1;
/// let stored = store.commit("user-1", WalletCommit::update(wallet)).unwrap();
/// assert_eq!(stored.version, 1);
/// assert_eq!(stored.free_messages, 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryWalletStore {
    tables: Arc<Mutex<WalletTables>>,
}

impl InMemoryWalletStore {
    /// Create a new, empty [`InMemoryWalletStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for InMemoryWalletStore {
    fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.tables.lock().wallet(user_id))
    }

    fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError> {
        self.tables.lock().insert_wallet(wallet)
    }

    fn commit(&self, user_id: &str, commit: WalletCommit) -> Result<Wallet, StoreError> {
        self.tables.lock().apply(user_id, commit)
    }

    fn find_usage(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<UsageLedgerEntry>, StoreError> {
        Ok(self.tables.lock().find_usage(user_id, session_id))
    }

    fn is_payment_processed(&self, payment_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().is_payment_processed(payment_id))
    }

    fn query_usage(&self, filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, StoreError> {
        Ok(self.tables.lock().query_usage(filter))
    }

    fn query_recharges(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<RechargeLedgerEntry>, StoreError> {
        Ok(self.tables.lock().query_recharges(filter))
    }
}

// ---------------------------------------------------------------------------
// Optimistic transactions
// ---------------------------------------------------------------------------

/// What a transaction body decided after looking at a wallet snapshot.
#[derive(Debug)]
pub enum Mutation<T> {
    /// Attempt `commit`; on success the transaction yields `output`.
    Commit { commit: WalletCommit, output: T },
    /// Nothing to write; yield `T` immediately.
    Skip(T),
}

/// Run `body` against a fresh snapshot of `user_id`'s wallet and commit the
/// result, retrying on [`StoreError::StaleWalletState`] up to
/// `max_attempts` times.
///
/// Any other store error aborts immediately.  Exhausting the attempts yields
/// [`EngineError::Contention`].
pub fn transact<S, T, F>(
    store: &S,
    user_id: &str,
    max_attempts: u32,
    mut body: F,
) -> Result<T, EngineError>
where
    S: WalletStore + ?Sized,
    F: FnMut(Wallet) -> Result<Mutation<T>, EngineError>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let wallet = store
            .get_wallet(user_id)?
            .ok_or_else(|| EngineError::WalletNotFound(user_id.into()))?;

        match body(wallet)? {
            Mutation::Skip(output) => return Ok(output),
            Mutation::Commit { commit, output } => match store.commit(user_id, commit) {
                Ok(_) => return Ok(output),
                Err(StoreError::StaleWalletState { expected, found, .. }) => {
                    debug!(user_id, attempt, expected, found, "stale wallet snapshot, retrying");
                }
                Err(error) => return Err(error.into()),
            },
        }
    }
    Err(EngineError::Contention {
        user_id: user_id.into(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Charge, FundingSource, RechargeStatus, SessionKind, Purchase, PurchaseKind};
    use rust_decimal::Decimal;

    fn usage(user_id: &str, session_id: &str, timestamp_ms: u64) -> UsageLedgerEntry {
        UsageLedgerEntry {
            session_id: session_id.into(),
            user_id: user_id.into(),
            listener_id: "listener-1".into(),
            session_kind: SessionKind::Call,
            consumed_units: 60,
            funding_source: FundingSource::Tokens,
            is_free_trial: false,
            charge: Charge::Tokens { amount: Decimal::from(2) },
            balance_after: "0 tokens".into(),
            timestamp_ms,
        }
    }

    fn credit(user_id: &str, payment_id: &str) -> PaymentCredit {
        let purchase = Purchase::Tokens { amount: Decimal::from(10) };
        PaymentCredit {
            processed: ProcessedPayment {
                payment_id: payment_id.into(),
                user_id: user_id.into(),
                processed_at_ms: 0,
            },
            recharge: RechargeLedgerEntry {
                payment_id: payment_id.into(),
                order_id: "order-1".into(),
                user_id: user_id.into(),
                amount: Decimal::from(50),
                purchase_kind: PurchaseKind::Tokens,
                purchase_details: purchase,
                plan_id: None,
                status: RechargeStatus::Success,
                timestamp_ms: 0,
            },
        }
    }

    fn seeded() -> InMemoryWalletStore {
        let store = InMemoryWalletStore::new();
        store
            .create_wallet(Wallet::new("user-1", 0, 0))
            .expect("create wallet");
        store
    }

    #[test]
    fn test_duplicate_wallet_is_rejected() {
        let store = seeded();
        let error = store
            .create_wallet(Wallet::new("user-1", 5, 0))
            .expect_err("second create must fail");
        assert_eq!(error, StoreError::WalletExists("user-1".into()));
    }

    #[test]
    fn test_stale_commit_leaves_state_untouched() {
        let store = seeded();
        let snapshot = store.get_wallet("user-1").unwrap().unwrap();

        let mut first = snapshot.clone();
        first.tokens = Decimal::from(10);
        store.commit("user-1", WalletCommit::update(first)).unwrap();

        let mut second = snapshot;
        second.tokens = Decimal::from(99);
        let error = store
            .commit("user-1", WalletCommit::update(second))
            .expect_err("stale commit must fail");
        assert!(matches!(error, StoreError::StaleWalletState { expected: 0, found: 1, .. }));
        assert_eq!(
            store.get_wallet("user-1").unwrap().unwrap().tokens,
            Decimal::from(10)
        );
    }

    #[test]
    fn test_settlement_marker_blocks_second_commit() {
        let store = seeded();
        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        store
            .commit(
                "user-1",
                WalletCommit::update(wallet).with_settlement(usage("user-1", "s-1", 10)),
            )
            .unwrap();

        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        let error = store
            .commit(
                "user-1",
                WalletCommit::update(wallet).with_settlement(usage("user-1", "s-1", 20)),
            )
            .expect_err("second settlement must fail");
        assert_eq!(error, StoreError::SessionAlreadySettled("s-1".into()));
        assert_eq!(store.query_usage(&LedgerFilter::default()).unwrap().len(), 1);
        assert_eq!(
            store.find_usage("user-1", "s-1").unwrap().map(|e| e.timestamp_ms),
            Some(10)
        );
    }

    #[test]
    fn test_processed_payment_blocks_second_credit() {
        let store = seeded();
        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        store
            .commit("user-1", WalletCommit::update(wallet).with_payment(credit("user-1", "P1")))
            .unwrap();
        assert!(store.is_payment_processed("P1").unwrap());

        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        let error = store
            .commit("user-1", WalletCommit::update(wallet).with_payment(credit("user-1", "P1")))
            .expect_err("second credit must fail");
        assert_eq!(error, StoreError::PaymentAlreadyProcessed("P1".into()));
        assert_eq!(store.query_recharges(&LedgerFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_usage_query_applies_filter_and_limit() {
        let store = seeded();
        store.create_wallet(Wallet::new("user-2", 0, 0)).unwrap();
        for (user, session, at) in [("user-1", "a", 10), ("user-2", "b", 20), ("user-1", "c", 30)] {
            let wallet = store.get_wallet(user).unwrap().unwrap();
            store
                .commit(user, WalletCommit::update(wallet).with_settlement(usage(user, session, at)))
                .unwrap();
        }

        let mine = store.query_usage(&LedgerFilter::for_user("user-1")).unwrap();
        assert_eq!(mine.len(), 2);

        let recent = store
            .query_usage(&LedgerFilter {
                since_ms: Some(15),
                limit: Some(1),
                ..LedgerFilter::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].session_id, "b");
    }

    #[test]
    fn test_transact_retries_after_a_concurrent_writer() {
        let store = seeded();
        let mut interfered = false;

        let tokens = transact(&store, "user-1", 3, |mut wallet| {
            if !interfered {
                // A competing writer commits between our read and our commit.
                interfered = true;
                let mut other = store.get_wallet("user-1")?.expect("wallet");
                other.tokens += Decimal::from(5);
                store.commit("user-1", WalletCommit::update(other))?;
            }
            wallet.tokens += Decimal::ONE;
            let output = wallet.tokens;
            Ok(Mutation::Commit { commit: WalletCommit::update(wallet), output })
        })
        .expect("second attempt succeeds");

        assert_eq!(tokens, Decimal::from(6));
        assert_eq!(store.get_wallet("user-1").unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_transact_reports_contention_when_attempts_run_out() {
        let store = seeded();
        let result: Result<(), EngineError> = transact(&store, "user-1", 2, |wallet| {
            let mut other = wallet.clone();
            other.free_messages += 1;
            store.commit("user-1", WalletCommit::update(other))?;
            Ok(Mutation::Commit { commit: WalletCommit::update(wallet), output: () })
        });
        assert!(matches!(result, Err(EngineError::Contention { attempts: 2, .. })));
    }

    #[test]
    fn test_transact_on_missing_wallet_fails_fast() {
        let store = InMemoryWalletStore::new();
        let result: Result<(), EngineError> =
            transact(&store, "ghost", 3, |_| Ok(Mutation::Skip(())));
        assert!(matches!(result, Err(EngineError::WalletNotFound(ref user)) if user == "ghost"));
    }
}
