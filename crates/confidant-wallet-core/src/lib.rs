// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # confidant-wallet-core
//!
//! Funding, settlement and payment ingestion for Confidant wallets.
//!
//! A user funds sessions with a listener through three sources: one-off
//! free-trial chat messages granted at signup, fixed-allowance plans
//! (call minutes or chat messages, 30-day expiry), and a fungible token
//! balance.  This crate decides which source pays before a session starts,
//! deducts exactly once after it ends, and credits wallets exactly once per
//! gateway payment.
//!
//! ## Architecture
//!
//! ```text
//! WalletEngine<S: WalletStore, C: Clock>
//!   ├── PlanAllocator<S>     : grant ceilings, free-trial counter, balances
//!   ├── SettlementService<S> : exactly-once deduction per session id
//!   ├── PaymentIngestion<S>  : verify webhooks, credit once per payment id
//!   └── LedgerReader<S>      : usage and recharge history
//! ```
//!
//! Every mutation is a per-user optimistic transaction through
//! [`storage::transact`] and [`WalletStore::commit`].
//!
//! ## Quick Start
//!
//! ```rust
//! use confidant_wallet_core::{
//!     config::Config,
//!     engine::WalletEngine,
//!     signature::SignatureVerifier,
//!     storage::InMemoryWalletStore,
//!     types::{ConsumptionReport, Principal, SessionKind, SettlementOutcome},
//! };
//!
//! let engine = WalletEngine::new(
//!     Config::default(),
//!     InMemoryWalletStore::new(),
//!     SignatureVerifier::new("whsec"),
//! );
//! let principal = Principal::new("user-1").unwrap();
//! engine.open_wallet(&principal).unwrap();
//!
//! // Before the session: how much may it run?
//! let allocation = engine.request_grant(&principal, SessionKind::Chat).unwrap();
//! let grant = allocation.grant().unwrap().clone();
//! assert!(grant.is_free_trial);
//!
//! // After the session: settle what was used.
//! let report = ConsumptionReport {
//!     session_id: "session-1".into(),
//!     user_id: "user-1".into(),
//!     listener_id: "listener-7".into(),
//!     funding_source: grant.funding_source,
//!     session_kind: SessionKind::Chat,
//!     consumed_units: 12,
//!     is_free_trial: grant.is_free_trial,
//! };
//! let outcome = engine.report_consumption(&principal, &report).unwrap();
//! assert!(matches!(outcome, SettlementOutcome::Settled(_)));
//! ```

pub mod allocator;
pub mod async_engine;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod order;
pub mod payment;
pub mod settlement;
pub mod signature;
pub mod storage;
pub mod types;

pub use engine::WalletEngine;
pub use error::{EngineError, GatewayError, StoreError, WebhookError};
pub use storage::{InMemoryWalletStore, WalletStore};
pub use types::{
    Allocation, ConsumptionReport, FundingSource, Principal, Purchase, SessionGrant, SessionKind,
    SettlementOutcome, UsageLedgerEntry, Wallet, WalletBalance,
};

#[cfg(feature = "async")]
pub use async_engine::AsyncWalletEngine;
