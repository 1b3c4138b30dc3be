// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Post-session, exactly-once deduction.
//!
//! [`SettlementService::settle`] turns a [`ConsumptionReport`] into a wallet
//! deduction plus one [`UsageLedgerEntry`].  The session id is the
//! idempotency key: the settlement marker is written in the same commit as
//! the deduction, so a repeated report returns the first entry unchanged.
//!
//! Deductions are clamped at zero.  Because grants reserve nothing, two
//! concurrent sessions may have been authorised against the same funds; the
//! later settlement takes whatever is left.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{EngineError, StoreError};
use crate::storage::{transact, Mutation, WalletCommit, WalletStore};
use crate::types::{
    Charge, ConsumptionReport, FundingSource, SessionKind, SettlementOutcome, UsageLedgerEntry,
    Wallet,
};

/// Settles finished sessions against their funding source.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::{
///     config::Config,
///     settlement::SettlementService,
///     storage::{InMemoryWalletStore, WalletStore},
///     types::{ConsumptionReport, FundingSource, SessionKind, SettlementOutcome, Wallet},
/// };
/// use rust_decimal::Decimal;
///
/// let store = InMemoryWalletStore::new();
/// let mut wallet = Wallet::new("user-1", 0, 0);
/// wallet.tokens = Decimal::from(7);
/// store.create_wallet(wallet).unwrap();
///
/// let settlement = SettlementService::new(Config::default(), store.clone());
/// let report = ConsumptionReport {
///     session_id: "session-1".into(),
///     user_id: "user-1".into(),
///     listener_id: "listener-1".into(),
///     funding_source: FundingSource::Tokens,
///     session_kind: SessionKind::Call,
///     consumed_units: 170,
///     is_free_trial: false,
/// };
///
/// // 170 s bills 3 started minutes at 2 tokens each.
/// let outcome = settlement.settle(&report, 1_000).unwrap();
/// assert!(matches!(outcome, SettlementOutcome::Settled(_)));
/// assert_eq!(store.get_wallet("user-1").unwrap().unwrap().tokens, Decimal::ONE);
///
/// // Reporting again changes nothing.
/// let again = settlement.settle(&report, 2_000).unwrap();
/// assert!(matches!(again, SettlementOutcome::AlreadySettled(_)));
/// assert_eq!(store.get_wallet("user-1").unwrap().unwrap().tokens, Decimal::ONE);
/// ```
pub struct SettlementService<S: WalletStore> {
    config: Config,
    storage: S,
}

impl<S: WalletStore> SettlementService<S> {
    /// Create a new [`SettlementService`].
    pub fn new(config: Config, storage: S) -> Self {
        Self { config, storage }
    }

    /// Deduct `report`'s consumption and record it, at most once per session.
    pub fn settle(
        &self,
        report: &ConsumptionReport,
        now_ms: u64,
    ) -> Result<SettlementOutcome, EngineError> {
        validate(report)?;

        if report.consumed_units == 0 {
            return Ok(SettlementOutcome::NothingToSettle);
        }
        if let Some(entry) = self.storage.find_usage(&report.user_id, &report.session_id)? {
            return Ok(SettlementOutcome::AlreadySettled(entry));
        }

        let result = transact(
            &self.storage,
            &report.user_id,
            self.config.max_transaction_attempts,
            |mut wallet| {
                let entry = self.apply(&mut wallet, report, now_ms)?;
                Ok(Mutation::Commit {
                    commit: WalletCommit::update(wallet).with_settlement(entry.clone()),
                    output: entry,
                })
            },
        );

        match result {
            Ok(entry) => {
                info!(
                    session_id = %entry.session_id,
                    user_id = %entry.user_id,
                    session_kind = %entry.session_kind,
                    funding_source = %entry.funding_source,
                    consumed_units = entry.consumed_units,
                    balance_after = %entry.balance_after,
                    "session settled"
                );
                Ok(SettlementOutcome::Settled(entry))
            }
            Err(EngineError::Store(StoreError::SessionAlreadySettled(_))) => {
                // A concurrent report won the marker; hand back its entry.
                self.storage
                    .find_usage(&report.user_id, &report.session_id)?
                    .map(SettlementOutcome::AlreadySettled)
                    .ok_or_else(|| {
                        StoreError::Backend(format!(
                            "settlement marker for '{}' has no usage entry",
                            report.session_id
                        ))
                        .into()
                    })
            }
            Err(error) => Err(error),
        }
    }

    /// Mutate `wallet` for `report` and build the matching ledger entry.
    fn apply(
        &self,
        wallet: &mut Wallet,
        report: &ConsumptionReport,
        now_ms: u64,
    ) -> Result<UsageLedgerEntry, EngineError> {
        let (funding_source, charge, balance_after) = if report.is_free_trial {
            (
                FundingSource::Tokens,
                Charge::None,
                format!("{} free messages", wallet.free_messages),
            )
        } else {
            match report.funding_source {
                FundingSource::Plan { ref plan_id } => {
                    let (charge, balance_after) = deduct_plan(wallet, plan_id, report)?;
                    (report.funding_source.clone(), charge, balance_after)
                }
                FundingSource::Tokens => {
                    let cost = self
                        .config
                        .token_cost(report.session_kind, report.consumed_units);
                    let debit = cost.min(wallet.tokens).max(Decimal::ZERO);
                    wallet.tokens -= debit;
                    (
                        FundingSource::Tokens,
                        Charge::Tokens {
                            amount: debit.normalize(),
                        },
                        format!("{} tokens", wallet.tokens.normalize()),
                    )
                }
            }
        };

        Ok(UsageLedgerEntry {
            session_id: report.session_id.clone(),
            user_id: report.user_id.clone(),
            listener_id: report.listener_id.clone(),
            session_kind: report.session_kind,
            consumed_units: report.consumed_units,
            funding_source,
            is_free_trial: report.is_free_trial,
            charge,
            balance_after,
            timestamp_ms: now_ms,
        })
    }
}

/// Subtract the report's billable units from `plan_id`, clamped at zero.
///
/// A plan that no longer exists deducts nothing but still settles.
fn deduct_plan(
    wallet: &mut Wallet,
    plan_id: &str,
    report: &ConsumptionReport,
) -> Result<(Charge, String), EngineError> {
    let user_id = wallet.user_id.clone();
    let Some(plan) = wallet.plan_mut(plan_id) else {
        warn!(
            user_id = %user_id,
            plan_id,
            session_id = %report.session_id,
            "settling against a plan that no longer exists"
        );
        return Ok((Charge::None, format!("plan {plan_id} not found")));
    };

    if plan.kind != report.session_kind {
        return Err(EngineError::FundingMismatch {
            plan_id: plan_id.into(),
            plan_kind: plan.kind,
            session_kind: report.session_kind,
        });
    }

    let billable = Config::billable_plan_units(report.session_kind, report.consumed_units);
    let deducted = billable.min(plan.remaining);
    plan.remaining -= deducted;

    Ok((
        Charge::PlanUnits { units: deducted },
        format!(
            "{} {} left on plan {}",
            plan.remaining,
            plan.kind.plan_unit(),
            plan_id
        ),
    ))
}

fn validate(report: &ConsumptionReport) -> Result<(), EngineError> {
    if report.session_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("session id is empty".into()));
    }
    if report.user_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("user id is empty".into()));
    }
    if report.listener_id.trim().is_empty() {
        return Err(EngineError::InvalidRequest("listener id is empty".into()));
    }
    if report.is_free_trial && report.session_kind != SessionKind::Chat {
        return Err(EngineError::InvalidRequest(
            "only chat sessions can be free-trial sessions".into(),
        ));
    }
    Ok(())
}
