// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Shared data types used across the wallet engine.
//!
//! All persisted and wire types implement [`Clone`], [`Debug`],
//! [`serde::Serialize`], and [`serde::Deserialize`] and use camelCase field
//! names on the wire.  Money and token quantities are
//! [`rust_decimal::Decimal`] so half-token chat costs stay exact.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// An authenticated caller with a stable identifier.
///
/// How the identity was established (OTP, identity provider) is not this
/// crate's concern; it only refuses to run any wallet logic without one.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::types::Principal;
///
/// assert!(Principal::new("user-1").is_ok());
/// assert!(Principal::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    /// Wrap a caller identifier, rejecting blank ones as
    /// [`EngineError::Unauthenticated`].
    pub fn new(user_id: impl Into<String>) -> Result<Self, EngineError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(EngineError::Unauthenticated);
        }
        Ok(Self(user_id))
    }

    /// The stable user identifier.
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// The two metered session kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Voice call, metered in seconds and billed per started minute.
    Call,
    /// Text chat, metered in messages and billed per started message pair.
    Chat,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Call => "call",
            SessionKind::Chat => "chat",
        }
    }

    /// Name of the unit a plan of this kind counts.
    pub fn plan_unit(self) -> &'static str {
        match self {
            SessionKind::Call => "minutes",
            SessionKind::Chat => "messages",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A fixed-allowance ("DT") plan: minutes for calls or messages for chats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Opaque identifier assigned when the plan was credited.
    pub id: String,
    pub kind: SessionKind,
    /// Minutes (call) or messages (chat) left.  Only settlement decrements it.
    pub remaining: u64,
    /// Price paid, in the gateway currency.
    pub price: Decimal,
    /// Gateway payment that bought this plan.
    pub payment_id: String,
    pub purchased_at_ms: u64,
    pub expires_at_ms: u64,
}

impl Plan {
    /// Whether the allocator may select this plan at `now_ms`.
    ///
    /// Expired or exhausted plans are inert: they stay in the wallet but are
    /// never selected and never shown in balances.
    pub fn is_usable(&self, now_ms: u64) -> bool {
        self.remaining > 0 && self.expires_at_ms > now_ms
    }
}

/// Per-user funding record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: String,
    /// Fungible ("MT") balance.  Never negative.
    pub tokens: Decimal,
    /// Every plan ever credited, inert ones included.
    pub active_plans: Vec<Plan>,
    /// Free-trial chat messages left from the signup grant.
    pub free_messages: u32,
    /// Revision for optimistic concurrency; bumped by every commit.
    pub version: u64,
    pub created_at_ms: u64,
}

impl Wallet {
    /// A fresh wallet: zero tokens, no plans, `free_messages` trial messages.
    pub fn new(user_id: impl Into<String>, free_messages: u32, created_at_ms: u64) -> Self {
        Self {
            user_id: user_id.into(),
            tokens: Decimal::ZERO,
            active_plans: Vec::new(),
            free_messages,
            version: 0,
            created_at_ms,
        }
    }

    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.active_plans.iter().find(|plan| plan.id == plan_id)
    }

    pub fn plan_mut(&mut self, plan_id: &str) -> Option<&mut Plan> {
        self.active_plans.iter_mut().find(|plan| plan.id == plan_id)
    }

    /// Usable plans of `kind` at `now_ms`, in wallet order.
    pub fn usable_plans(&self, kind: SessionKind, now_ms: u64) -> impl Iterator<Item = &Plan> {
        self.active_plans
            .iter()
            .filter(move |plan| plan.kind == kind && plan.is_usable(now_ms))
    }

    /// Balance summary with inert plans excluded.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use confidant_wallet_core::types::Wallet;
    ///
    /// let wallet = Wallet::new("user-1", 3, 0);
    /// let balance = wallet.balance(1_000);
    /// assert_eq!(balance.free_messages, 3);
    /// assert_eq!(balance.call_minutes, 0);
    /// ```
    pub fn balance(&self, now_ms: u64) -> WalletBalance {
        WalletBalance {
            user_id: self.user_id.clone(),
            tokens: self.tokens.normalize(),
            call_minutes: self
                .usable_plans(SessionKind::Call, now_ms)
                .fold(0, |total, plan| total.saturating_add(plan.remaining)),
            chat_messages: self
                .usable_plans(SessionKind::Chat, now_ms)
                .fold(0, |total, plan| total.saturating_add(plan.remaining)),
            free_messages: self.free_messages,
        }
    }
}

/// What a user can spend right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub user_id: String,
    pub tokens: Decimal,
    pub call_minutes: u64,
    pub chat_messages: u64,
    pub free_messages: u32,
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Where a session's usage is charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FundingSource {
    Plan {
        #[serde(rename = "planId")]
        plan_id: String,
    },
    Tokens,
}

impl fmt::Display for FundingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingSource::Plan { plan_id } => write!(f, "plan:{plan_id}"),
            FundingSource::Tokens => f.write_str("tokens"),
        }
    }
}

/// What [`SessionGrant::authorized_units`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantUnit {
    Seconds,
    Messages,
}

/// Pre-authorised ceiling handed to the transport layer at session start.
///
/// Never persisted; the transport carries the funding source on its own
/// session object and echoes it back at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub session_kind: SessionKind,
    pub funding_source: FundingSource,
    pub authorized_units: u64,
    pub unit: GrantUnit,
    /// Chat funded by the signup grant; settlement deducts nothing.
    pub is_free_trial: bool,
}

/// Result of a funding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Allocation {
    Granted(SessionGrant),
    /// No usable plan and not enough tokens for one billable unit.  The
    /// client turns this into a recharge prompt.
    Unfunded {
        #[serde(rename = "sessionKind")]
        session_kind: SessionKind,
        reason: String,
    },
}

impl Allocation {
    pub fn grant(&self) -> Option<&SessionGrant> {
        match self {
            Allocation::Granted(grant) => Some(grant),
            Allocation::Unfunded { .. } => None,
        }
    }
}

/// Result of consuming one free-trial message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum FreeMessageOutcome {
    Consumed { remaining: u32 },
    Exhausted,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Consumption reported by the transport layer when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionReport {
    pub session_id: String,
    pub user_id: String,
    pub listener_id: String,
    pub funding_source: FundingSource,
    pub session_kind: SessionKind,
    /// Seconds for calls, messages for chats.
    pub consumed_units: u64,
    #[serde(default)]
    pub is_free_trial: bool,
}

/// What settlement actually took from the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Charge {
    /// Minutes or messages removed from a plan.
    PlanUnits { units: u64 },
    Tokens { amount: Decimal },
    /// Free trial, or the plan had vanished.
    None,
}

/// Immutable audit record of one settled session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLedgerEntry {
    pub session_id: String,
    pub user_id: String,
    pub listener_id: String,
    pub session_kind: SessionKind,
    pub consumed_units: u64,
    pub funding_source: FundingSource,
    pub is_free_trial: bool,
    pub charge: Charge,
    /// Human-readable snapshot of the funding source after the deduction.
    pub balance_after: String,
    pub timestamp_ms: u64,
}

/// Result of [`SettlementService::settle`](crate::settlement::SettlementService::settle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "camelCase")]
pub enum SettlementOutcome {
    Settled(UsageLedgerEntry),
    /// A previous call already settled this session; this is its entry.
    AlreadySettled(UsageLedgerEntry),
    /// Zero consumption: nothing deducted, nothing recorded.
    NothingToSettle,
}

impl SettlementOutcome {
    pub fn entry(&self) -> Option<&UsageLedgerEntry> {
        match self {
            SettlementOutcome::Settled(entry) | SettlementOutcome::AlreadySettled(entry) => {
                Some(entry)
            }
            SettlementOutcome::NothingToSettle => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// Largest token amount or plan price a single purchase may carry.
pub const MAX_PURCHASE_AMOUNT: u64 = 1_000_000_000;

/// Largest number of minutes or messages a single plan may carry.
pub const MAX_PLAN_UNITS: u64 = 1_000_000;

/// What a payment bought.
///
/// Travels through the gateway inside the order note and is matched
/// exhaustively when crediting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Purchase {
    Tokens {
        amount: Decimal,
    },
    Plan {
        #[serde(rename = "planKind")]
        plan_kind: SessionKind,
        /// Minutes for call plans, messages for chat plans.
        units: u64,
        price: Decimal,
    },
}

impl Purchase {
    pub fn kind(&self) -> PurchaseKind {
        match self {
            Purchase::Tokens { .. } => PurchaseKind::Tokens,
            Purchase::Plan { .. } => PurchaseKind::Plan,
        }
    }

    /// Reject purchases that would credit nothing.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Purchase::Tokens { amount } if *amount <= Decimal::ZERO => {
                Err(format!("token amount must be positive, got {amount}"))
            }
            Purchase::Tokens { amount } if *amount > Decimal::from(MAX_PURCHASE_AMOUNT) => Err(
                format!("token amount must not exceed {MAX_PURCHASE_AMOUNT}, got {amount}"),
            ),
            Purchase::Plan { units: 0, .. } => Err("plan must carry at least one unit".into()),
            Purchase::Plan { units, .. } if *units > MAX_PLAN_UNITS => Err(format!(
                "plan must not exceed {MAX_PLAN_UNITS} units, got {units}"
            )),
            Purchase::Plan { price, .. } if *price < Decimal::ZERO => {
                Err(format!("plan price must not be negative, got {price}"))
            }
            Purchase::Plan { price, .. } if *price > Decimal::from(MAX_PURCHASE_AMOUNT) => Err(
                format!("plan price must not exceed {MAX_PURCHASE_AMOUNT}, got {price}"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseKind {
    Tokens,
    Plan,
}

/// Recharge entries are only ever written for verified, successful credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RechargeStatus {
    Success,
}

/// Immutable audit record of one credited payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeLedgerEntry {
    pub payment_id: String,
    pub order_id: String,
    pub user_id: String,
    /// Amount paid, in the gateway currency.
    pub amount: Decimal,
    pub purchase_kind: PurchaseKind,
    pub purchase_details: Purchase,
    /// Plan created by this credit, for plan purchases.
    pub plan_id: Option<String>,
    pub status: RechargeStatus,
    pub timestamp_ms: u64,
}

/// Idempotency-ledger row: its existence means "already credited".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPayment {
    pub payment_id: String,
    pub user_id: String,
    pub processed_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Ledger queries
// ---------------------------------------------------------------------------

/// Filter used to narrow usage and recharge ledger queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFilter {
    pub user_id: Option<String>,
    /// Only applies to usage entries.
    pub session_kind: Option<SessionKind>,
    pub since_ms: Option<u64>,
    pub until_ms: Option<u64>,
    pub limit: Option<usize>,
}

impl LedgerFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub(crate) fn admits(&self, user_id: &str, timestamp_ms: u64) -> bool {
        if let Some(ref wanted) = self.user_id {
            if wanted != user_id {
                return false;
            }
        }
        if let Some(since_ms) = self.since_ms {
            if timestamp_ms < since_ms {
                return false;
            }
        }
        if let Some(until_ms) = self.until_ms {
            if timestamp_ms > until_ms {
                return false;
            }
        }
        true
    }

    pub(crate) fn admits_usage(&self, entry: &UsageLedgerEntry) -> bool {
        if let Some(kind) = self.session_kind {
            if entry.session_kind != kind {
                return false;
            }
        }
        self.admits(&entry.user_id, entry.timestamp_ms)
    }

    pub(crate) fn admits_recharge(&self, entry: &RechargeLedgerEntry) -> bool {
        self.admits(&entry.user_id, entry.timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, kind: SessionKind, remaining: u64, expires_at_ms: u64) -> Plan {
        Plan {
            id: id.into(),
            kind,
            remaining,
            price: Decimal::from(99),
            payment_id: format!("pay-{id}"),
            purchased_at_ms: 0,
            expires_at_ms,
        }
    }

    #[test]
    fn test_inert_plans_are_excluded_from_balance() {
        let mut wallet = Wallet::new("user-1", 0, 0);
        wallet.tokens = Decimal::new(35, 1);
        wallet.active_plans = vec![
            plan("live-call", SessionKind::Call, 10, 5_000),
            plan("expired-call", SessionKind::Call, 7, 1_000),
            plan("empty-chat", SessionKind::Chat, 0, 5_000),
            plan("live-chat", SessionKind::Chat, 40, 5_000),
        ];

        let balance = wallet.balance(2_000);
        assert_eq!(balance.call_minutes, 10);
        assert_eq!(balance.chat_messages, 40);
        assert_eq!(balance.tokens, Decimal::new(35, 1));
    }

    #[test]
    fn test_plan_expiring_exactly_now_is_inert() {
        let plan = plan("p", SessionKind::Call, 3, 1_000);
        assert!(plan.is_usable(999));
        assert!(!plan.is_usable(1_000));
    }

    #[test]
    fn test_funding_source_wire_format() {
        let json = serde_json::to_string(&FundingSource::Plan { plan_id: "p-1".into() })
            .expect("serialise");
        assert_eq!(json, r#"{"type":"plan","planId":"p-1"}"#);

        let tokens: FundingSource =
            serde_json::from_str(r#"{"type":"tokens"}"#).expect("deserialise");
        assert_eq!(tokens, FundingSource::Tokens);
    }

    #[test]
    fn test_purchase_validation_rejects_empty_credits() {
        assert!(Purchase::Tokens { amount: Decimal::ZERO }.validate().is_err());
        assert!(Purchase::Plan {
            plan_kind: SessionKind::Chat,
            units: 0,
            price: Decimal::from(49),
        }
        .validate()
        .is_err());
        assert!(Purchase::Tokens { amount: Decimal::from(10) }.validate().is_ok());
    }

    #[test]
    fn test_consumption_report_defaults_free_trial_to_false() {
        let report: ConsumptionReport = serde_json::from_str(
            r#"{
                "sessionId": "s-1",
                "userId": "u-1",
                "listenerId": "l-1",
                "fundingSource": {"type": "tokens"},
                "sessionKind": "call",
                "consumedUnits": 42
            }"#,
        )
        .expect("deserialise");
        assert!(!report.is_free_trial);
        assert_eq!(report.consumed_units, 42);
    }

    #[test]
    fn test_purchases_above_the_ceiling_are_invalid() {
        let huge = Decimal::from(MAX_PURCHASE_AMOUNT) + Decimal::ONE;
        assert!(Purchase::Tokens { amount: huge }.validate().is_err());
        assert!(Purchase::Tokens { amount: Decimal::from(MAX_PURCHASE_AMOUNT) }
            .validate()
            .is_ok());
        assert!(Purchase::Plan {
            plan_kind: SessionKind::Chat,
            units: MAX_PLAN_UNITS + 1,
            price: Decimal::from(49),
        }
        .validate()
        .is_err());
        assert!(Purchase::Plan {
            plan_kind: SessionKind::Call,
            units: 30,
            price: huge,
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_balance_saturates_instead_of_overflowing() {
        let mut wallet = Wallet::new("user-1", 0, 0);
        wallet.active_plans = vec![
            plan("a", SessionKind::Call, u64::MAX, 5_000),
            plan("b", SessionKind::Call, 10, 5_000),
        ];
        assert_eq!(wallet.balance(1_000).call_minutes, u64::MAX);
    }
}
