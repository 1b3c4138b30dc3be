// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Error taxonomy for the wallet engine.
//!
//! Each layer owns one enum:
//!
//! * [`StoreError`]: failures of the transactional store primitive
//! * [`EngineError`]: failures returned by engine operations to callers
//! * [`WebhookError`]: reasons a gateway notification is rejected before
//!   it is trusted
//! * [`GatewayError`]: failures of the create-order pass-through
//!
//! Insufficient funds is not an error; it is the
//! [`Allocation::Unfunded`](crate::types::Allocation) outcome.  A duplicate
//! payment is acknowledged as success.

use thiserror::Error;

use crate::types::SessionKind;

/// Failure of a [`WalletStore`](crate::storage::WalletStore) primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("wallet for user '{0}' does not exist")]
    WalletNotFound(String),

    #[error("wallet for user '{0}' already exists")]
    WalletExists(String),

    /// The wallet moved on since it was read; re-read and retry.
    #[error("stale wallet state for user '{user_id}': expected version {expected}, found {found}")]
    StaleWalletState {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("session '{0}' has already been settled")]
    SessionAlreadySettled(String),

    #[error("payment '{0}' has already been processed")]
    PaymentAlreadyProcessed(String),

    /// The backing medium failed (disk, serialisation, ...).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("caller identity is missing")]
    Unauthenticated,

    #[error("wallet for user '{0}' does not exist")]
    WalletNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("plan '{plan_id}' funds {plan_kind} sessions, not {session_kind} sessions")]
    FundingMismatch {
        plan_id: String,
        plan_kind: SessionKind,
        session_kind: SessionKind,
    },

    /// Optimistic retries were exhausted. Transient: the caller may retry
    /// the whole operation.
    #[error("wallet for user '{user_id}' is busy after {attempts} attempts; please try again")]
    Contention { user_id: String, attempts: u32 },

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Contention { .. }
                | EngineError::TaskFailed(_)
                | EngineError::Store(StoreError::StaleWalletState { .. })
        )
    }
}

/// Why a gateway notification was rejected before any ledger access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("missing required header '{0}'")]
    MissingHeader(&'static str),

    #[error("webhook signature does not match")]
    SignatureInvalid,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    /// HTTP status code the gateway should receive for this rejection.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::SignatureInvalid => 401,
            WebhookError::MissingHeader(_) | WebhookError::MalformedPayload(_) => 400,
        }
    }
}

/// Failure of the create-order pass-through.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("gateway rejected the order with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("gateway transport failure: {0}")]
    Transport(String),

    #[error("unexpected gateway response: {0}")]
    UnexpectedResponse(String),
}
