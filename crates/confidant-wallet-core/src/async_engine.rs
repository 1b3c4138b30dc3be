// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Async wallet engine backed by Tokio.
//!
//! This module is only compiled when the `async` feature flag is enabled:
//!
//! ```toml
//! [dependencies]
//! confidant-wallet-core = { version = "0.1", features = ["async"] }
//! ```
//!
//! # Design
//!
//! [`AsyncWalletEngine`] shares one [`WalletEngine`] behind an [`Arc`] and
//! runs every operation on Tokio's blocking pool, since store commits may
//! write to disk (see `FileWalletStore`).  Concurrency control stays in the
//! store: per-user compare-and-swap, exactly as with the sync engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use confidant_wallet_core::{
//!     async_engine::AsyncWalletEngine,
//!     config::Config,
//!     signature::SignatureVerifier,
//!     storage::InMemoryWalletStore,
//!     types::{Principal, SessionKind},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncWalletEngine::new(
//!         Config::default(),
//!         InMemoryWalletStore::new(),
//!         SignatureVerifier::new("whsec"),
//!     );
//!     let principal = Principal::new("user-1").unwrap();
//!
//!     engine.open_wallet(principal.clone()).await.unwrap();
//!     let allocation = engine.request_grant(principal, SessionKind::Chat).await.unwrap();
//!     assert!(allocation.grant().is_some());
//! }
//! ```

#![cfg(feature = "async")]

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::WalletEngine;
use crate::error::{EngineError, GatewayError};
use crate::order::{CreateOrderRequest, GatewaySession, PaymentGateway};
use crate::payment::{IngestionReport, WebhookRequest};
use crate::signature::SignatureVerifier;
use crate::storage::WalletStore;
use crate::types::{
    Allocation, ConsumptionReport, FreeMessageOutcome, Principal, SessionKind,
    SettlementOutcome, UsageLedgerEntry, WalletBalance,
};

// ---------------------------------------------------------------------------
// AsyncWalletEngine
// ---------------------------------------------------------------------------

/// Async facade over a shared [`WalletEngine`].
///
/// Cloning is cheap and every clone drives the same engine.
pub struct AsyncWalletEngine<S: WalletStore, C: Clock = SystemClock> {
    inner: Arc<WalletEngine<S, C>>,
}

impl<S: WalletStore, C: Clock> Clone for AsyncWalletEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: WalletStore + Clone + 'static> AsyncWalletEngine<S, SystemClock> {
    /// Construct a new [`AsyncWalletEngine`] on the wall clock.
    pub fn new(config: Config, storage: S, verifier: SignatureVerifier) -> Self {
        Self::from_engine(WalletEngine::new(config, storage, verifier))
    }
}

impl<S: WalletStore + 'static, C: Clock + 'static> AsyncWalletEngine<S, C> {
    /// Wrap an already-built engine.
    pub fn from_engine(engine: WalletEngine<S, C>) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    /// The shared sync engine, for read-only access to its components.
    pub fn engine(&self) -> &WalletEngine<S, C> {
        &self.inner
    }

    // -----------------------------------------------------------------------
    // Wallet
    // -----------------------------------------------------------------------

    pub async fn open_wallet(&self, principal: Principal) -> Result<WalletBalance, EngineError> {
        self.run(move |engine| engine.open_wallet(&principal)).await
    }

    pub async fn balance(&self, principal: Principal) -> Result<WalletBalance, EngineError> {
        self.run(move |engine| engine.balance(&principal)).await
    }

    pub async fn consume_free_message(
        &self,
        principal: Principal,
    ) -> Result<FreeMessageOutcome, EngineError> {
        self.run(move |engine| engine.consume_free_message(&principal))
            .await
    }

    pub async fn usage_history(
        &self,
        principal: Principal,
        limit: usize,
    ) -> Result<Vec<UsageLedgerEntry>, EngineError> {
        self.run(move |engine| engine.usage_history(&principal, limit))
            .await
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub async fn request_grant(
        &self,
        principal: Principal,
        kind: SessionKind,
    ) -> Result<Allocation, EngineError> {
        self.run(move |engine| engine.request_grant(&principal, kind))
            .await
    }

    pub async fn report_consumption(
        &self,
        principal: Principal,
        report: ConsumptionReport,
    ) -> Result<SettlementOutcome, EngineError> {
        self.run(move |engine| engine.report_consumption(&principal, &report))
            .await
    }

    // -----------------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------------

    pub async fn ingest_webhook(
        &self,
        request: WebhookRequest,
    ) -> Result<IngestionReport, EngineError> {
        self.run(move |engine| engine.ingest_webhook(&request)).await
    }

    /// Open a gateway order; the gateway call blocks, so it runs off the
    /// async workers too.
    pub async fn create_order<G>(
        &self,
        gateway: Arc<G>,
        principal: Principal,
        request: CreateOrderRequest,
    ) -> Result<GatewaySession, GatewayError>
    where
        G: PaymentGateway + ?Sized + 'static,
    {
        let engine = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || engine.create_order(&*gateway, &principal, &request))
            .await
            .map_err(|err| GatewayError::Transport(format!("background task failed: {err}")))?
    }

    async fn run<T, F>(&self, task: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&WalletEngine<S, C>) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || task(&*engine))
            .await
            .map_err(|err| EngineError::TaskFailed(err.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
