// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Read access to the usage and recharge ledgers.
//!
//! Entries are written only by settlement and payment ingestion, inside the
//! same commit as the wallet change they describe.  [`LedgerReader`] never
//! writes.

use crate::error::EngineError;
use crate::storage::WalletStore;
use crate::types::{LedgerFilter, RechargeLedgerEntry, UsageLedgerEntry};

/// Queries the append-only ledgers.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::{
///     ledger::LedgerReader,
///     storage::InMemoryWalletStore,
///     types::LedgerFilter,
/// };
///
/// let reader = LedgerReader::new(InMemoryWalletStore::new());
/// assert!(reader.usage(&LedgerFilter::for_user("user-1")).unwrap().is_empty());
/// ```
pub struct LedgerReader<S: WalletStore> {
    storage: S,
}

impl<S: WalletStore> LedgerReader<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Usage entries matching `filter`, oldest first.
    pub fn usage(&self, filter: &LedgerFilter) -> Result<Vec<UsageLedgerEntry>, EngineError> {
        Ok(self.storage.query_usage(filter)?)
    }

    /// Recharge entries matching `filter`, oldest first.
    pub fn recharges(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<RechargeLedgerEntry>, EngineError> {
        Ok(self.storage.query_recharges(filter)?)
    }

    /// The entry a settled session produced, if it was settled.
    pub fn session_entry(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<UsageLedgerEntry>, EngineError> {
        Ok(self.storage.find_usage(user_id, session_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::settlement::SettlementService;
    use crate::storage::InMemoryWalletStore;
    use crate::types::{ConsumptionReport, FundingSource, SessionKind, Wallet};
    use rust_decimal::Decimal;

    fn settle(service: &SettlementService<InMemoryWalletStore>, session_id: &str, kind: SessionKind, at: u64) {
        let report = ConsumptionReport {
            session_id: session_id.into(),
            user_id: "user-1".into(),
            listener_id: "listener-1".into(),
            funding_source: FundingSource::Tokens,
            session_kind: kind,
            consumed_units: 2,
            is_free_trial: false,
        };
        service.settle(&report, at).expect("settle");
    }

    #[test]
    fn test_filters_by_kind_and_time() {
        let store = InMemoryWalletStore::new();
        let mut wallet = Wallet::new("user-1", 0, 0);
        wallet.tokens = Decimal::from(100);
        store.create_wallet(wallet).unwrap();

        let service = SettlementService::new(Config::default(), store.clone());
        settle(&service, "s-1", SessionKind::Call, 100);
        settle(&service, "s-2", SessionKind::Chat, 200);
        settle(&service, "s-3", SessionKind::Chat, 300);

        let reader = LedgerReader::new(store);
        let chats = reader
            .usage(&LedgerFilter {
                session_kind: Some(SessionKind::Chat),
                ..LedgerFilter::for_user("user-1")
            })
            .unwrap();
        assert_eq!(chats.len(), 2);

        let window = reader
            .usage(&LedgerFilter {
                since_ms: Some(150),
                until_ms: Some(250),
                ..LedgerFilter::default()
            })
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].session_id, "s-2");

        assert!(reader.session_entry("user-1", "s-3").unwrap().is_some());
        assert!(reader.session_entry("user-2", "s-3").unwrap().is_none());
        assert!(reader.recharges(&LedgerFilter::default()).unwrap().is_empty());
    }
}
