// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Payment webhook ingestion.
//!
//! [`PaymentIngestion::ingest`] walks every notification through a linear
//! state machine and records the path it took:
//!
//! ```text
//! Received -> SignatureVerified -> Deduplicated -> Credited -> Acknowledged
//!     |               |                 |
//!     +-> Rejected    +-> Ignored       +-> Ignored
//! ```
//!
//! Only `Rejected` makes the gateway retry, and it is reserved for missing
//! headers, bad signatures and bodies that are not JSON.  Everything else,
//! including duplicates and authenticated events of an unexpected shape, is
//! acknowledged.
//! Crediting happens in one commit together with the payment id entering
//! the idempotency ledger, so replays and out-of-order retries credit once.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{EngineError, StoreError, WebhookError};
use crate::order::OrderMetadata;
use crate::signature::SignatureVerifier;
use crate::storage::{transact, Mutation, PaymentCredit, WalletCommit, WalletStore};
use crate::types::{
    Plan, ProcessedPayment, Purchase, RechargeLedgerEntry, RechargeStatus, Wallet,
};

/// Event type the gateway sends for a captured payment.
pub const PAYMENT_SUCCESS_EVENT: &str = "PAYMENT_SUCCESS_WEBHOOK";

/// Payment status of a captured payment.
pub const PAYMENT_SUCCESS_STATUS: &str = "SUCCESS";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A webhook exactly as received: raw headers and the unparsed body.
///
/// The body must stay byte-exact; the signature covers it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub body: Vec<u8>,
}

/// Gateway notification body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub order: Option<WebhookOrder>,
    #[serde(default)]
    pub payment: Option<WebhookPayment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookOrder {
    pub order_id: String,
    #[serde(default)]
    pub order_amount: Option<Decimal>,
    /// Encoded [`OrderMetadata`].
    #[serde(default)]
    pub order_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayment {
    pub payment_id: String,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub payment_amount: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// States of the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IngestionState {
    Received,
    SignatureVerified,
    Deduplicated,
    Credited,
    Acknowledged,
    Rejected,
    Ignored,
}

/// Why an authenticated notification credited nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnoreReason {
    /// Not a completed, paid transaction.
    NotCompletion,
    /// Payment id already in the idempotency ledger.
    Duplicate,
    /// The order note could not be turned into a purchase.
    MalformedOrderMetadata,
    /// Another delivery of the same payment committed first.
    ConcurrentDelivery,
    /// The credit would overflow the wallet's token balance.
    BalanceOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    Credited(RechargeLedgerEntry),
    Ignored {
        payment_id: Option<String>,
        reason: IgnoreReason,
    },
    Rejected(WebhookError),
}

/// Final outcome plus the state trail that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub trail: Vec<IngestionState>,
    pub outcome: IngestionOutcome,
}

impl IngestionReport {
    /// HTTP status the gateway should receive.
    pub fn status_code(&self) -> u16 {
        match self.outcome {
            IngestionOutcome::Credited(_) | IngestionOutcome::Ignored { .. } => 200,
            IngestionOutcome::Rejected(ref error) => error.status_code(),
        }
    }

    pub fn final_state(&self) -> Option<IngestionState> {
        self.trail.last().copied()
    }

    fn reject(mut trail: Vec<IngestionState>, error: WebhookError) -> Self {
        trail.push(IngestionState::Rejected);
        Self {
            trail,
            outcome: IngestionOutcome::Rejected(error),
        }
    }

    fn ignore(
        mut trail: Vec<IngestionState>,
        payment_id: Option<String>,
        reason: IgnoreReason,
    ) -> Self {
        trail.push(IngestionState::Ignored);
        Self {
            trail,
            outcome: IngestionOutcome::Ignored { payment_id, reason },
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentIngestion
// ---------------------------------------------------------------------------

/// Verifies gateway webhooks and credits wallets exactly once per payment.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::{
///     config::Config,
///     payment::{IngestionOutcome, PaymentIngestion, WebhookRequest},
///     signature::SignatureVerifier,
///     storage::{InMemoryWalletStore, WalletStore},
/// };
/// use rust_decimal::Decimal;
///
/// let store = InMemoryWalletStore::new();
/// let verifier = SignatureVerifier::new("whsec");
/// let ingestion = PaymentIngestion::new(Config::default(), store.clone(), verifier.clone());
///
/// let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{
///     "order":{"order_id":"o-1","order_amount":50,
///              "order_note":"{\"userId\":\"user-1\",\"kind\":\"tokens\",\"amount\":10}"},
///     "payment":{"payment_id":"P1","payment_status":"SUCCESS","payment_amount":50}}}"#;
/// let request = WebhookRequest {
///     signature: Some(verifier.sign("1700000000", body).unwrap()),
///     timestamp: Some("1700000000".into()),
///     body: body.to_vec(),
/// };
///
/// let report = ingestion.ingest(&request, 1_000).unwrap();
/// assert!(matches!(report.outcome, IngestionOutcome::Credited(_)));
/// assert_eq!(report.status_code(), 200);
/// assert_eq!(store.get_wallet("user-1").unwrap().unwrap().tokens, Decimal::from(10));
/// ```
pub struct PaymentIngestion<S: WalletStore> {
    config: Config,
    storage: S,
    verifier: SignatureVerifier,
}

impl<S: WalletStore> PaymentIngestion<S> {
    /// Create a new [`PaymentIngestion`].
    pub fn new(config: Config, storage: S, verifier: SignatureVerifier) -> Self {
        Self {
            config,
            storage,
            verifier,
        }
    }

    /// Run `request` through the state machine.
    ///
    /// Returns `Err` only for failures the gateway should retry (store
    /// failures, contention).  Every other path is an [`IngestionReport`].
    pub fn ingest(
        &self,
        request: &WebhookRequest,
        now_ms: u64,
    ) -> Result<IngestionReport, EngineError> {
        let mut trail = vec![IngestionState::Received];

        let raw = match self.authenticate(request) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "webhook rejected");
                return Ok(IngestionReport::reject(trail, error));
            }
        };
        trail.push(IngestionState::SignatureVerified);

        let raw_payment_id = raw
            .pointer("/data/payment/payment_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let payload: WebhookPayload = match serde_json::from_value(raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "authenticated webhook has an unexpected shape");
                return Ok(IngestionReport::ignore(
                    trail,
                    raw_payment_id,
                    IgnoreReason::NotCompletion,
                ));
            }
        };

        let (order, payment) = match (payload.data.order, payload.data.payment) {
            (Some(order), Some(payment))
                if payload.event_type == PAYMENT_SUCCESS_EVENT
                    && payment.payment_status == PAYMENT_SUCCESS_STATUS =>
            {
                (order, payment)
            }
            (_, payment) => {
                info!(event_type = %payload.event_type, "webhook is not a completed payment");
                return Ok(IngestionReport::ignore(
                    trail,
                    payment.map(|p| p.payment_id),
                    IgnoreReason::NotCompletion,
                ));
            }
        };
        let payment_id = payment.payment_id.clone();

        if self.storage.is_payment_processed(&payment_id)? {
            warn!(payment_id = %payment_id, "duplicate payment webhook ignored");
            return Ok(IngestionReport::ignore(
                trail,
                Some(payment_id),
                IgnoreReason::Duplicate,
            ));
        }

        let metadata = match order
            .order_note
            .as_deref()
            .ok_or_else(|| "order note is missing".to_string())
            .and_then(OrderMetadata::decode)
        {
            Ok(metadata) => metadata,
            Err(reason) => {
                warn!(
                    payment_id = %payment_id,
                    order_id = %order.order_id,
                    %reason,
                    "malformed order metadata; acknowledging without credit"
                );
                return Ok(IngestionReport::ignore(
                    trail,
                    Some(payment_id),
                    IgnoreReason::MalformedOrderMetadata,
                ));
            }
        };
        trail.push(IngestionState::Deduplicated);

        self.ensure_wallet(&metadata.user_id, now_ms)?;

        let result = transact(
            &self.storage,
            &metadata.user_id,
            self.config.max_transaction_attempts,
            |mut wallet| {
                let Some(recharge) = self.credit(&mut wallet, &order, &payment, &metadata, now_ms)
                else {
                    return Ok(Mutation::Skip(None));
                };
                let processed = ProcessedPayment {
                    payment_id: payment_id.clone(),
                    user_id: metadata.user_id.clone(),
                    processed_at_ms: now_ms,
                };
                Ok(Mutation::Commit {
                    commit: WalletCommit::update(wallet).with_payment(PaymentCredit {
                        processed,
                        recharge: recharge.clone(),
                    }),
                    output: Some(recharge),
                })
            },
        );

        match result {
            Ok(None) => {
                error!(
                    payment_id = %payment_id,
                    user_id = %metadata.user_id,
                    "token credit overflows the wallet balance; acknowledging without credit"
                );
                Ok(IngestionReport::ignore(
                    trail,
                    Some(payment_id),
                    IgnoreReason::BalanceOverflow,
                ))
            }
            Ok(Some(entry)) => {
                info!(
                    payment_id = %entry.payment_id,
                    order_id = %entry.order_id,
                    user_id = %entry.user_id,
                    purchase_kind = ?entry.purchase_kind,
                    amount = %entry.amount,
                    "payment credited"
                );
                trail.push(IngestionState::Credited);
                trail.push(IngestionState::Acknowledged);
                Ok(IngestionReport {
                    trail,
                    outcome: IngestionOutcome::Credited(entry),
                })
            }
            Err(EngineError::Store(StoreError::PaymentAlreadyProcessed(_))) => {
                warn!(payment_id = %payment_id, "concurrent delivery already credited this payment");
                Ok(IngestionReport::ignore(
                    trail,
                    Some(payment_id),
                    IgnoreReason::ConcurrentDelivery,
                ))
            }
            Err(error) => Err(error),
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Headers and signature, then JSON syntax.  The payload shape is checked
    /// by the caller once the body is known to be authentic.
    fn authenticate(&self, request: &WebhookRequest) -> Result<Value, WebhookError> {
        let signature = request
            .signature
            .as_deref()
            .ok_or(WebhookError::MissingHeader("signature"))?;
        let timestamp = request
            .timestamp
            .as_deref()
            .ok_or(WebhookError::MissingHeader("timestamp"))?;

        self.verifier.verify(signature, timestamp, &request.body)?;

        serde_json::from_slice(&request.body)
            .map_err(|err| WebhookError::MalformedPayload(err.to_string()))
    }

    /// Payments may arrive for users who never opened a wallet; they get an
    /// empty one without the signup grant.
    fn ensure_wallet(&self, user_id: &str, now_ms: u64) -> Result<(), EngineError> {
        if self.storage.get_wallet(user_id)?.is_some() {
            return Ok(());
        }
        match self.storage.create_wallet(Wallet::new(user_id, 0, now_ms)) {
            Ok(_) | Err(StoreError::WalletExists(_)) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Apply the purchase to `wallet`.  `None` when the token balance would
    /// overflow; the wallet is left untouched.
    fn credit(
        &self,
        wallet: &mut Wallet,
        order: &WebhookOrder,
        payment: &WebhookPayment,
        metadata: &OrderMetadata,
        now_ms: u64,
    ) -> Option<RechargeLedgerEntry> {
        let plan_id = match metadata.purchase {
            Purchase::Tokens { amount } => {
                wallet.tokens = wallet.tokens.checked_add(amount)?;
                None
            }
            Purchase::Plan {
                plan_kind,
                units,
                price,
            } => {
                let plan_id = format!("plan-{}", payment.payment_id);
                wallet.active_plans.push(Plan {
                    id: plan_id.clone(),
                    kind: plan_kind,
                    remaining: units,
                    price,
                    payment_id: payment.payment_id.clone(),
                    purchased_at_ms: now_ms,
                    expires_at_ms: now_ms.saturating_add(self.config.plan_validity_ms),
                });
                Some(plan_id)
            }
        };

        Some(RechargeLedgerEntry {
            payment_id: payment.payment_id.clone(),
            order_id: order.order_id.clone(),
            user_id: metadata.user_id.clone(),
            amount: payment
                .payment_amount
                .or(order.order_amount)
                .unwrap_or(Decimal::ZERO),
            purchase_kind: metadata.purchase.kind(),
            purchase_details: metadata.purchase.clone(),
            plan_id,
            status: RechargeStatus::Success,
            timestamp_ms: now_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DAY_MS;
    use crate::storage::InMemoryWalletStore;
    use crate::types::{LedgerFilter, SessionKind};
    use serde_json::json;

    const SECRET: &str = "whsec_test";
    const TS: &str = "1718000000";

    fn ingestion() -> (PaymentIngestion<InMemoryWalletStore>, InMemoryWalletStore) {
        let store = InMemoryWalletStore::new();
        let ingestion = PaymentIngestion::new(
            Config::default(),
            store.clone(),
            SignatureVerifier::new(SECRET),
        );
        (ingestion, store)
    }

    fn body(event_type: &str, status: &str, payment_id: &str, note: serde_json::Value) -> Vec<u8> {
        json!({
            "type": event_type,
            "data": {
                "order": { "order_id": "o-1", "order_amount": 50, "order_note": note },
                "payment": { "payment_id": payment_id, "payment_status": status, "payment_amount": 50 }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn tokens_note(user_id: &str, amount: u32) -> serde_json::Value {
        json!(format!(r#"{{"userId":"{user_id}","kind":"tokens","amount":{amount}}}"#))
    }

    fn signed(body: Vec<u8>) -> WebhookRequest {
        WebhookRequest {
            signature: Some(SignatureVerifier::new(SECRET).sign(TS, &body).unwrap()),
            timestamp: Some(TS.into()),
            body,
        }
    }

    fn tokens_of(store: &InMemoryWalletStore, user_id: &str) -> Decimal {
        store.get_wallet(user_id).unwrap().expect("wallet").tokens
    }

    #[test]
    fn test_credit_walks_the_full_trail() {
        let (ingestion, store) = ingestion();
        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P1", tokens_note("user-1", 10)));

        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(
            report.trail,
            vec![
                IngestionState::Received,
                IngestionState::SignatureVerified,
                IngestionState::Deduplicated,
                IngestionState::Credited,
                IngestionState::Acknowledged,
            ]
        );
        assert_eq!(tokens_of(&store, "user-1"), Decimal::from(10));
        assert!(store.is_payment_processed("P1").unwrap());
    }

    #[test]
    fn test_duplicate_payment_credits_once() {
        let (ingestion, store) = ingestion();
        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P1", tokens_note("user-1", 10)));

        let first = ingestion.ingest(&request, 1_000).unwrap();
        let second = ingestion.ingest(&request, 2_000).unwrap();

        assert!(matches!(first.outcome, IngestionOutcome::Credited(_)));
        assert_eq!(
            second.outcome,
            IngestionOutcome::Ignored {
                payment_id: Some("P1".into()),
                reason: IgnoreReason::Duplicate,
            }
        );
        assert_eq!(second.status_code(), 200);
        assert_eq!(tokens_of(&store, "user-1"), Decimal::from(10));
    }

    #[test]
    fn test_replaying_n_times_credits_once() {
        let (ingestion, store) = ingestion();
        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P7", tokens_note("user-1", 25)));

        for attempt in 0..8 {
            let report = ingestion.ingest(&request, 1_000 + attempt).unwrap();
            assert_eq!(report.status_code(), 200);
        }

        assert_eq!(tokens_of(&store, "user-1"), Decimal::from(25));
        assert_eq!(store.query_recharges(&LedgerFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_signature_is_rejected_before_any_ledger_access() {
        let (ingestion, store) = ingestion();
        let mut request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P1", tokens_note("user-1", 10)));
        request.signature = Some(SignatureVerifier::new("wrong").sign(TS, &request.body).unwrap());

        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(report.outcome, IngestionOutcome::Rejected(WebhookError::SignatureInvalid));
        assert_eq!(report.status_code(), 401);
        assert_eq!(report.final_state(), Some(IngestionState::Rejected));
        assert!(!store.is_payment_processed("P1").unwrap());
        assert!(store.get_wallet("user-1").unwrap().is_none());
    }

    #[test]
    fn test_missing_headers_are_bad_requests() {
        let (ingestion, _) = ingestion();
        let mut request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P1", tokens_note("u", 1)));
        request.timestamp = None;

        let report = ingestion.ingest(&request, 1_000).unwrap();
        assert_eq!(
            report.outcome,
            IngestionOutcome::Rejected(WebhookError::MissingHeader("timestamp"))
        );
        assert_eq!(report.status_code(), 400);
    }

    #[test]
    fn test_unreadable_body_is_a_bad_request() {
        let (ingestion, _) = ingestion();
        let report = ingestion.ingest(&signed(b"{not json".to_vec()), 1_000).unwrap();
        assert!(matches!(
            report.outcome,
            IngestionOutcome::Rejected(WebhookError::MalformedPayload(_))
        ));
        assert_eq!(report.status_code(), 400);
    }

    #[test]
    fn test_failed_payment_is_ignored() {
        let (ingestion, store) = ingestion();
        let request = signed(body("PAYMENT_FAILED_WEBHOOK", "FAILED", "P2", tokens_note("user-1", 10)));

        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(
            report.outcome,
            IngestionOutcome::Ignored {
                payment_id: Some("P2".into()),
                reason: IgnoreReason::NotCompletion,
            }
        );
        assert!(!store.is_payment_processed("P2").unwrap());
    }

    #[test]
    fn test_malformed_metadata_is_acknowledged_without_credit() {
        let (ingestion, store) = ingestion();
        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P3", json!("{broken")));

        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(report.status_code(), 200);
        assert!(matches!(
            report.outcome,
            IngestionOutcome::Ignored { reason: IgnoreReason::MalformedOrderMetadata, .. }
        ));
        assert!(store.query_recharges(&LedgerFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_plan_purchase_creates_plan_with_thirty_day_expiry() {
        let (ingestion, store) = ingestion();
        let note = json!(r#"{"userId":"user-1","kind":"plan","planKind":"call","units":60,"price":199}"#);
        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P9", note));

        let report = ingestion.ingest(&request, 5_000).unwrap();

        let entry = match report.outcome {
            IngestionOutcome::Credited(entry) => entry,
            other => panic!("expected a credit, got {other:?}"),
        };
        assert_eq!(entry.plan_id.as_deref(), Some("plan-P9"));

        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        let plan = wallet.plan("plan-P9").expect("plan credited");
        assert_eq!(plan.kind, SessionKind::Call);
        assert_eq!(plan.remaining, 60);
        assert_eq!(plan.expires_at_ms, 5_000 + 30 * DAY_MS);
        // Wallets created by a payment carry no signup grant.
        assert_eq!(wallet.free_messages, 0);
    }

    #[test]
    fn test_authenticated_event_with_null_amount_is_acknowledged() {
        let (ingestion, store) = ingestion();
        let raw = json!({
            "type": "PAYMENT_FAILED_WEBHOOK",
            "data": {
                "payment": { "payment_id": "P2", "payment_status": "FAILED", "payment_amount": null }
            }
        });
        let request = signed(raw.to_string().into_bytes());

        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(report.status_code(), 200);
        assert_eq!(
            report.outcome,
            IngestionOutcome::Ignored {
                payment_id: Some("P2".into()),
                reason: IgnoreReason::NotCompletion,
            }
        );
        assert!(!store.is_payment_processed("P2").unwrap());
    }

    #[test]
    fn test_authenticated_event_of_unexpected_shape_is_acknowledged() {
        let (ingestion, _) = ingestion();
        let raw = json!({
            "type": PAYMENT_SUCCESS_EVENT,
            "data": { "payment": { "payment_id": "P4", "payment_amount": { "value": 50 } } }
        });

        let report = ingestion.ingest(&signed(raw.to_string().into_bytes()), 1_000).unwrap();

        assert_eq!(report.status_code(), 200);
        assert_eq!(report.final_state(), Some(IngestionState::Ignored));
        assert!(report.trail.contains(&IngestionState::SignatureVerified));
    }

    #[test]
    fn test_success_without_payment_amount_records_order_amount() {
        let (ingestion, _) = ingestion();
        let raw = json!({
            "type": PAYMENT_SUCCESS_EVENT,
            "data": {
                "order": { "order_id": "o-7", "order_amount": 75, "order_note": tokens_note("user-1", 10) },
                "payment": { "payment_id": "P7", "payment_status": "SUCCESS" }
            }
        });

        let report = ingestion.ingest(&signed(raw.to_string().into_bytes()), 1_000).unwrap();

        match report.outcome {
            IngestionOutcome::Credited(entry) => assert_eq!(entry.amount, Decimal::from(75)),
            other => panic!("expected a credit, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_token_purchase_is_not_credited() {
        let (ingestion, store) = ingestion();
        let note = json!(r#"{"userId":"user-1","kind":"tokens","amount":"50000000000000000000000000000"}"#);

        for payment_id in ["P1", "P2"] {
            let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", payment_id, note.clone()));
            let report = ingestion.ingest(&request, 1_000).unwrap();
            assert_eq!(report.status_code(), 200);
            assert!(matches!(
                report.outcome,
                IngestionOutcome::Ignored { reason: IgnoreReason::MalformedOrderMetadata, .. }
            ));
        }
        assert!(store.get_wallet("user-1").unwrap().is_none());
    }

    #[test]
    fn test_credit_that_would_overflow_the_balance_is_acknowledged_without_credit() {
        let (ingestion, store) = ingestion();
        let mut wallet = Wallet::new("user-1", 0, 0);
        wallet.tokens = Decimal::MAX;
        store.create_wallet(wallet).unwrap();

        let request = signed(body(PAYMENT_SUCCESS_EVENT, "SUCCESS", "P5", tokens_note("user-1", 10)));
        let report = ingestion.ingest(&request, 1_000).unwrap();

        assert_eq!(report.status_code(), 200);
        assert_eq!(
            report.outcome,
            IngestionOutcome::Ignored {
                payment_id: Some("P5".into()),
                reason: IgnoreReason::BalanceOverflow,
            }
        );
        let wallet = store.get_wallet("user-1").unwrap().unwrap();
        assert_eq!(wallet.tokens, Decimal::MAX);
        assert_eq!(wallet.version, 0);
        assert!(!store.is_payment_processed("P5").unwrap());
    }
}
