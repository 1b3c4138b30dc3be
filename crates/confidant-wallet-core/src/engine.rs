// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Wallet engine: the top-level composition of all wallet components.
//!
//! [`WalletEngine`] hands a clone of one [`WalletStore`] to each component
//! and exposes them as public fields.  Store clones share state, so a credit
//! written by `engine.payments` is immediately visible to `engine.allocator`.
//!
//! The engine methods add two things on top of the components: the caller's
//! [`Principal`] is required for every user-facing operation, and the clock
//! is read once per operation so a grant and its logging agree on "now".
//!
//! ## Session lifecycle
//!
//! 1. **Grant**: [`request_grant`](WalletEngine::request_grant) before the
//!    session starts; the transport enforces the ceiling.
//! 2. **Settle**: [`report_consumption`](WalletEngine::report_consumption)
//!    once the session ends; repeats are harmless.
//! 3. **Recharge**: gateway webhooks arrive through
//!    [`ingest_webhook`](WalletEngine::ingest_webhook) at any time.

use tracing::info;

use crate::allocator::PlanAllocator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{EngineError, GatewayError, StoreError};
use crate::ledger::LedgerReader;
use crate::order::{self, CreateOrderRequest, GatewaySession, PaymentGateway};
use crate::payment::{IngestionReport, PaymentIngestion, WebhookRequest};
use crate::settlement::SettlementService;
use crate::signature::SignatureVerifier;
use crate::storage::WalletStore;
use crate::types::{
    Allocation, ConsumptionReport, FreeMessageOutcome, LedgerFilter, Principal, SessionKind,
    SettlementOutcome, UsageLedgerEntry, Wallet, WalletBalance,
};

/// Composes the allocator, settlement, payment ingestion and ledger reader.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::{
///     config::Config,
///     engine::WalletEngine,
///     signature::SignatureVerifier,
///     storage::InMemoryWalletStore,
///     types::{Principal, SessionKind},
/// };
///
/// let engine = WalletEngine::new(
///     Config::default(),
///     InMemoryWalletStore::new(),
///     SignatureVerifier::new("whsec"),
/// );
/// let principal = Principal::new("user-1").unwrap();
///
/// let balance = engine.open_wallet(&principal).unwrap();
/// assert_eq!(balance.free_messages, 3);
///
/// // Signup messages fund a free-trial chat.
/// let allocation = engine.request_grant(&principal, SessionKind::Chat).unwrap();
/// assert!(allocation.grant().unwrap().is_free_trial);
///
/// // Nothing funds a call yet.
/// let allocation = engine.request_grant(&principal, SessionKind::Call).unwrap();
/// assert!(allocation.grant().is_none());
/// ```
pub struct WalletEngine<S: WalletStore, C: Clock = SystemClock> {
    /// Session funding decisions and the free-trial counter.
    pub allocator: PlanAllocator<S>,
    /// Exactly-once post-session deductions.
    pub settlement: SettlementService<S>,
    /// Webhook verification and crediting.
    pub payments: PaymentIngestion<S>,
    /// Usage and recharge history.
    pub ledger: LedgerReader<S>,
    storage: S,
    config: Config,
    clock: C,
}

impl<S: WalletStore + Clone> WalletEngine<S, SystemClock> {
    /// Construct a [`WalletEngine`] on the wall clock.
    pub fn new(config: Config, storage: S, verifier: SignatureVerifier) -> Self {
        Self::with_clock(config, storage, verifier, SystemClock)
    }
}

impl<S: WalletStore + Clone, C: Clock> WalletEngine<S, C> {
    /// Construct a [`WalletEngine`] with an explicit time source.
    pub fn with_clock(config: Config, storage: S, verifier: SignatureVerifier, clock: C) -> Self {
        Self {
            allocator: PlanAllocator::new(config.clone(), storage.clone()),
            settlement: SettlementService::new(config.clone(), storage.clone()),
            payments: PaymentIngestion::new(config.clone(), storage.clone(), verifier),
            ledger: LedgerReader::new(storage.clone()),
            storage,
            config,
            clock,
        }
    }
}

impl<S: WalletStore, C: Clock> WalletEngine<S, C> {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Create `principal`'s wallet with the signup grant.
    ///
    /// Opening an existing wallet returns its balance without granting
    /// anything again.
    pub fn open_wallet(&self, principal: &Principal) -> Result<WalletBalance, EngineError> {
        let now_ms = self.now_ms();
        let user_id = principal.user_id();

        if let Some(wallet) = self.storage.get_wallet(user_id)? {
            return Ok(wallet.balance(now_ms));
        }

        let wallet = Wallet::new(user_id, self.config.signup_free_messages, now_ms);
        match self.storage.create_wallet(wallet) {
            Ok(wallet) => {
                info!(
                    user_id,
                    free_messages = wallet.free_messages,
                    "wallet opened"
                );
                Ok(wallet.balance(now_ms))
            }
            Err(StoreError::WalletExists(_)) => self.allocator.balance(user_id, now_ms),
            Err(error) => Err(error.into()),
        }
    }

    /// Funding decision for a session `principal` is about to start.
    pub fn request_grant(
        &self,
        principal: &Principal,
        kind: SessionKind,
    ) -> Result<Allocation, EngineError> {
        self.allocator
            .request_grant(principal.user_id(), kind, self.now_ms())
    }

    /// Settle a finished session.
    ///
    /// `report.user_id` must be the caller's own wallet.
    pub fn report_consumption(
        &self,
        principal: &Principal,
        report: &ConsumptionReport,
    ) -> Result<SettlementOutcome, EngineError> {
        if report.user_id != principal.user_id() {
            return Err(EngineError::InvalidRequest(format!(
                "report for '{}' submitted by '{}'",
                report.user_id,
                principal.user_id()
            )));
        }
        self.settlement.settle(report, self.now_ms())
    }

    pub fn consume_free_message(
        &self,
        principal: &Principal,
    ) -> Result<FreeMessageOutcome, EngineError> {
        self.allocator.consume_free_message(principal.user_id())
    }

    pub fn balance(&self, principal: &Principal) -> Result<WalletBalance, EngineError> {
        self.allocator.balance(principal.user_id(), self.now_ms())
    }

    /// Most recent settled sessions first, at most `limit`.
    pub fn usage_history(
        &self,
        principal: &Principal,
        limit: usize,
    ) -> Result<Vec<UsageLedgerEntry>, EngineError> {
        let mut entries = self.ledger.usage(&LedgerFilter::for_user(principal.user_id()))?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    /// Verify and apply a gateway webhook.
    pub fn ingest_webhook(&self, request: &WebhookRequest) -> Result<IngestionReport, EngineError> {
        self.payments.ingest(request, self.now_ms())
    }

    /// Open a gateway order for `principal`.
    pub fn create_order<G: PaymentGateway + ?Sized>(
        &self,
        gateway: &G,
        principal: &Principal,
        request: &CreateOrderRequest,
    ) -> Result<GatewaySession, GatewayError> {
        order::create_order(gateway, principal, request, self.now_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DAY_MS;
    use crate::payment::IngestionOutcome;
    use crate::storage::InMemoryWalletStore;
    use crate::types::{FundingSource, SettlementOutcome};
    use rust_decimal::Decimal;
    use serde_json::json;

    const SECRET: &str = "whsec_engine";

    fn engine() -> (WalletEngine<InMemoryWalletStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let engine = WalletEngine::with_clock(
            Config::default(),
            InMemoryWalletStore::new(),
            SignatureVerifier::new(SECRET),
            clock.clone(),
        );
        (engine, clock)
    }

    fn principal() -> Principal {
        Principal::new("user-1").unwrap()
    }

    fn webhook(payment_id: &str, note: &str) -> WebhookRequest {
        let body = json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": {
                "order": { "order_id": "o-1", "order_amount": 99, "order_note": note },
                "payment": { "payment_id": payment_id, "payment_status": "SUCCESS", "payment_amount": 99 }
            }
        })
        .to_string()
        .into_bytes();
        WebhookRequest {
            signature: Some(SignatureVerifier::new(SECRET).sign("42", &body).unwrap()),
            timestamp: Some("42".into()),
            body,
        }
    }

    fn report(session_id: &str, funding_source: FundingSource, kind: SessionKind, units: u64) -> ConsumptionReport {
        ConsumptionReport {
            session_id: session_id.into(),
            user_id: "user-1".into(),
            listener_id: "listener-1".into(),
            funding_source,
            session_kind: kind,
            consumed_units: units,
            is_free_trial: false,
        }
    }

    #[test]
    fn test_open_wallet_is_idempotent() {
        let (engine, _) = engine();
        engine.open_wallet(&principal()).unwrap();
        engine.consume_free_message(&principal()).unwrap();

        let reopened = engine.open_wallet(&principal()).unwrap();
        assert_eq!(reopened.free_messages, 2);
    }

    #[test]
    fn test_call_plan_lifecycle() {
        let (engine, _) = engine();
        engine.open_wallet(&principal()).unwrap();

        let note = r#"{"userId":"user-1","kind":"plan","planKind":"call","units":10,"price":99}"#;
        let credited = engine.ingest_webhook(&webhook("P1", note)).unwrap();
        assert!(matches!(credited.outcome, IngestionOutcome::Credited(_)));

        let allocation = engine.request_grant(&principal(), SessionKind::Call).unwrap();
        let grant = allocation.grant().expect("granted").clone();
        assert_eq!(grant.authorized_units, 600);

        let outcome = engine
            .report_consumption(
                &principal(),
                &report("s-1", grant.funding_source, SessionKind::Call, 185),
            )
            .unwrap();
        assert!(matches!(outcome, SettlementOutcome::Settled(_)));
        assert_eq!(engine.balance(&principal()).unwrap().call_minutes, 6);
    }

    #[test]
    fn test_expired_plan_falls_back_to_tokens() {
        let (engine, clock) = engine();
        engine.open_wallet(&principal()).unwrap();

        let plan = r#"{"userId":"user-1","kind":"plan","planKind":"call","units":30,"price":99}"#;
        engine.ingest_webhook(&webhook("P1", plan)).unwrap();
        let tokens = r#"{"userId":"user-1","kind":"tokens","amount":4}"#;
        engine.ingest_webhook(&webhook("P2", tokens)).unwrap();

        clock.advance(30 * DAY_MS);

        let allocation = engine.request_grant(&principal(), SessionKind::Call).unwrap();
        let grant = allocation.grant().expect("granted");
        assert_eq!(grant.funding_source, FundingSource::Tokens);
        assert_eq!(grant.authorized_units, 120);
        assert_eq!(engine.balance(&principal()).unwrap().call_minutes, 0);
    }

    #[test]
    fn test_reports_for_other_users_are_refused() {
        let (engine, _) = engine();
        engine.open_wallet(&principal()).unwrap();
        let intruder = Principal::new("user-2").unwrap();

        let result = engine.report_consumption(
            &intruder,
            &report("s-1", FundingSource::Tokens, SessionKind::Call, 60),
        );
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn test_usage_history_is_newest_first() {
        let (engine, clock) = engine();
        engine.open_wallet(&principal()).unwrap();
        let tokens = r#"{"userId":"user-1","kind":"tokens","amount":50}"#;
        engine.ingest_webhook(&webhook("P1", tokens)).unwrap();

        for session in ["s-1", "s-2", "s-3"] {
            clock.advance(1_000);
            engine
                .report_consumption(
                    &principal(),
                    &report(session, FundingSource::Tokens, SessionKind::Chat, 2),
                )
                .unwrap();
        }

        let history = engine.usage_history(&principal(), 2).unwrap();
        let ids: Vec<_> = history.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, ["s-3", "s-2"]);
        assert_eq!(engine.balance(&principal()).unwrap().tokens, Decimal::from(47));
    }
}
