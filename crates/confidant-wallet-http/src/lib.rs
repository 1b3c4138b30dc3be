// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # confidant-wallet-http
//!
//! Axum surface for the Confidant wallet engine.
//!
//! The upstream identity layer authenticates callers and forwards the user
//! id in `x-user-id`; requests without it are refused with `401`.  The
//! payment gateway calls `/v1/webhooks/payments` directly and is
//! authenticated by its HMAC signature instead.
//!
//! | Method & path                              | Operation                  |
//! |--------------------------------------------|----------------------------|
//! | `GET /healthz`                             | liveness                   |
//! | `POST /v1/wallet`                          | open wallet                |
//! | `GET /v1/wallet`                           | balance                    |
//! | `POST /v1/wallet/free-messages/consume`    | consume one free message   |
//! | `GET /v1/wallet/history?limit=N`           | recent settled sessions    |
//! | `POST /v1/sessions/grant`                  | funding decision           |
//! | `POST /v1/sessions/settle`                 | settle a finished session  |
//! | `POST /v1/orders`                          | create a gateway order     |
//! | `POST`/`GET`/`OPTIONS /v1/webhooks/payments` | payment ingestion        |
//!
//! Errors are returned as `{"status":"error","code":...,"reason":...}`.

pub mod settings;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use confidant_wallet_core::config::Config;
use confidant_wallet_core::order::{CreateOrderRequest, GatewaySession, PaymentGateway};
use confidant_wallet_core::payment::{IngestionOutcome, WebhookRequest};
use confidant_wallet_core::signature::SignatureVerifier;
use confidant_wallet_core::types::{FreeMessageOutcome, UsageLedgerEntry};
use confidant_wallet_core::{
    Allocation, AsyncWalletEngine, ConsumptionReport, EngineError, GatewayError, Principal,
    SessionKind, SettlementOutcome, StoreError, WalletBalance, WalletStore,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const SIGNATURE_HEADER: &str = "signature";
pub const TIMESTAMP_HEADER: &str = "timestamp";

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared handler state.  Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub engine: AsyncWalletEngine<Arc<dyn WalletStore>>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn WalletStore>,
        verifier: SignatureVerifier,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            engine: AsyncWalletEngine::new(config, store, verifier),
            gateway,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/wallet", post(open_wallet).get(balance))
        .route("/v1/wallet/free-messages/consume", post(consume_free_message))
        .route("/v1/wallet/history", get(usage_history))
        .route("/v1/sessions/grant", post(request_grant))
        .route("/v1/sessions/settle", post(settle))
        .route("/v1/orders", post(create_order))
        .route(
            "/v1/webhooks/payments",
            post(ingest_webhook)
                .get(webhook_health)
                .options(webhook_preflight),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response: status code plus a stable machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub reason: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            status,
            code,
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let reason = err.to_string();
        match err {
            EngineError::Unauthenticated => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", reason)
            }
            EngineError::WalletNotFound(_) | EngineError::Store(StoreError::WalletNotFound(_)) => {
                Self::new(StatusCode::NOT_FOUND, "wallet_not_found", reason)
            }
            EngineError::InvalidRequest(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_request", reason)
            }
            EngineError::FundingMismatch { .. } => {
                Self::new(StatusCode::CONFLICT, "funding_mismatch", reason)
            }
            EngineError::Contention { .. } | EngineError::Store(StoreError::StaleWalletState { .. }) => {
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "contention",
                    "wallet is busy, please try again",
                )
            }
            EngineError::TaskFailed(_) | EngineError::Store(StoreError::Backend(_)) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", reason)
            }
            EngineError::Store(_) => Self::new(StatusCode::CONFLICT, "conflict", reason),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidOrder(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_order", err.to_string())
            }
            _ => Self::new(StatusCode::BAD_GATEWAY, "gateway_error", err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, reason = %self.reason, "request failed");
        } else {
            warn!(code = self.code, reason = %self.reason, "request refused");
        }
        let body = json!({
            "status": "error",
            "code": self.code,
            "reason": self.reason,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn principal(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = header_value(headers, USER_ID_HEADER).ok_or(EngineError::Unauthenticated)?;
    Ok(Principal::new(user_id)?)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn open_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<WalletBalance> {
    let principal = principal(&headers)?;
    Ok(Json(state.engine.open_wallet(principal).await?))
}

async fn balance(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<WalletBalance> {
    let principal = principal(&headers)?;
    Ok(Json(state.engine.balance(principal).await?))
}

async fn consume_free_message(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<FreeMessageOutcome> {
    let principal = principal(&headers)?;
    Ok(Json(state.engine.consume_free_message(principal).await?))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn usage_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<UsageLedgerEntry>> {
    let principal = principal(&headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    Ok(Json(state.engine.usage_history(principal, limit).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantRequest {
    session_kind: SessionKind,
}

/// Unfunded is a `200` with `outcome: "unfunded"`, not an error.
async fn request_grant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GrantRequest>,
) -> ApiResult<Allocation> {
    let principal = principal(&headers)?;
    Ok(Json(
        state
            .engine
            .request_grant(principal, request.session_kind)
            .await?,
    ))
}

async fn settle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<ConsumptionReport>,
) -> ApiResult<SettlementOutcome> {
    let principal = principal(&headers)?;
    Ok(Json(
        state.engine.report_consumption(principal, report).await?,
    ))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<GatewaySession> {
    let principal = principal(&headers)?;
    let session = state
        .engine
        .create_order(Arc::clone(&state.gateway), principal, request)
        .await?;
    Ok(Json(session))
}

async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = WebhookRequest {
        signature: header_value(&headers, SIGNATURE_HEADER),
        timestamp: header_value(&headers, TIMESTAMP_HEADER),
        body: body.to_vec(),
    };
    let report = state.engine.ingest_webhook(request).await?;

    let status =
        StatusCode::from_u16(report.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let state_name = report.final_state();
    let body = match report.outcome {
        IngestionOutcome::Credited(ref entry) => json!({
            "status": "ok",
            "state": state_name,
            "paymentId": entry.payment_id,
        }),
        IngestionOutcome::Ignored {
            ref payment_id,
            reason,
        } => json!({
            "status": "ok",
            "state": state_name,
            "paymentId": payment_id,
            "reason": reason,
        }),
        IngestionOutcome::Rejected(ref err) => json!({
            "status": "error",
            "code": "webhook_rejected",
            "reason": err.to_string(),
        }),
    };
    Ok((status, Json(body)).into_response())
}

async fn webhook_health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "payment webhook endpoint is live" }))
}

async fn webhook_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
