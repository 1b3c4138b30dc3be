// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Create-order pass-through to the payment gateway.
//!
//! The engine never sees card data.  It validates the purchase, packs the
//! buyer and the purchase into [`OrderMetadata`], and hands that to the
//! gateway as the order note.  The gateway echoes the note back in its
//! payment webhook, which is how [`PaymentIngestion`](crate::payment::PaymentIngestion)
//! learns what to credit and to whom.

use core::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::types::{Principal, Purchase, MAX_PURCHASE_AMOUNT};

// ---------------------------------------------------------------------------
// Order metadata
// ---------------------------------------------------------------------------

/// Buyer and purchase, carried through the gateway as an opaque JSON string.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::order::OrderMetadata;
/// use confidant_wallet_core::types::Purchase;
/// use rust_decimal::Decimal;
///
/// let metadata = OrderMetadata {
///     user_id: "user-1".into(),
///     purchase: Purchase::Tokens { amount: Decimal::from(10) },
/// };
/// let note = metadata.encode().unwrap();
/// assert_eq!(OrderMetadata::decode(&note).unwrap(), metadata);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub user_id: String,
    #[serde(flatten)]
    pub purchase: Purchase,
}

impl OrderMetadata {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an order note and check it describes a creditable purchase.
    pub fn decode(note: &str) -> Result<Self, String> {
        let metadata: Self = serde_json::from_str(note).map_err(|err| err.to_string())?;
        if metadata.user_id.trim().is_empty() {
            return Err("order metadata has an empty user id".into());
        }
        metadata.purchase.validate()?;
        Ok(metadata)
    }
}

// ---------------------------------------------------------------------------
// Gateway types
// ---------------------------------------------------------------------------

/// Client request: pay `amount` for `purchase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Amount charged, in the gateway currency.
    pub amount: Decimal,
    pub purchase: Purchase,
}

/// Order as submitted to the gateway's order API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub order_amount: Decimal,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    /// Encoded [`OrderMetadata`].
    pub order_note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_id: String,
}

/// What the client needs to open the gateway's checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySession {
    pub order_id: String,
    pub payment_session_id: String,
}

/// Outbound seam to the payment gateway.
pub trait PaymentGateway: Send + Sync {
    /// ISO currency code orders are priced in.
    fn currency(&self) -> &str {
        "INR"
    }

    fn create_order(&self, order: &GatewayOrder) -> Result<GatewaySession, GatewayError>;
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

/// Connection settings for [`HttpGateway`].
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, without the `/orders` suffix.
    pub base_url: String,
    pub app_id: String,
    pub secret_key: String,
    pub api_version: String,
    pub currency: String,
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sandbox.cashfree.com/pg".into(),
            app_id: String::new(),
            secret_key: String::new(),
            api_version: "2023-08-01".into(),
            currency: "INR".into(),
            timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("secret_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("currency", &self.currency)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// [`PaymentGateway`] that POSTs orders to the gateway over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    config: GatewayConfig,
    agent: ureq::Agent,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { config, agent }
    }
}

impl PaymentGateway for HttpGateway {
    fn currency(&self) -> &str {
        &self.config.currency
    }

    fn create_order(&self, order: &GatewayOrder) -> Result<GatewaySession, GatewayError> {
        let url = format!("{}/orders", self.config.base_url.trim_end_matches('/'));
        let response = self
            .agent
            .post(&url)
            .set("content-type", "application/json")
            .set("x-client-id", &self.config.app_id)
            .set("x-client-secret", &self.config.secret_key)
            .set("x-api-version", &self.config.api_version)
            .send_json(order);

        match response {
            Ok(resp) => resp
                .into_json::<GatewaySession>()
                .map_err(|err| GatewayError::UnexpectedResponse(err.to_string())),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(GatewayError::Rejected { status, body })
            }
            Err(ureq::Error::Transport(err)) => Err(GatewayError::Transport(err.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Validate `request` and open a gateway order for `principal`.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::error::GatewayError;
/// use confidant_wallet_core::order::{
///     create_order, CreateOrderRequest, GatewayOrder, GatewaySession, PaymentGateway,
/// };
/// use confidant_wallet_core::types::{Principal, Purchase};
/// use rust_decimal::Decimal;
///
/// struct Echo;
///
/// impl PaymentGateway for Echo {
///     fn create_order(&self, order: &GatewayOrder) -> Result<GatewaySession, GatewayError> {
///         Ok(GatewaySession {
///             order_id: order.order_id.clone(),
///             payment_session_id: "ps-1".into(),
///         })
///     }
/// }
///
/// let request = CreateOrderRequest {
///     amount: Decimal::from(50),
///     purchase: Purchase::Tokens { amount: Decimal::from(10) },
/// };
/// let principal = Principal::new("user-1").unwrap();
/// let session = create_order(&Echo, &principal, &request, 1_000).unwrap();
/// assert_eq!(session.payment_session_id, "ps-1");
/// ```
pub fn create_order<G: PaymentGateway + ?Sized>(
    gateway: &G,
    principal: &Principal,
    request: &CreateOrderRequest,
    now_ms: u64,
) -> Result<GatewaySession, GatewayError> {
    if request.amount <= Decimal::ZERO {
        return Err(GatewayError::InvalidOrder(format!(
            "amount must be positive, got {}",
            request.amount
        )));
    }
    if request.amount > Decimal::from(MAX_PURCHASE_AMOUNT) {
        return Err(GatewayError::InvalidOrder(format!(
            "amount must not exceed {MAX_PURCHASE_AMOUNT}, got {}",
            request.amount
        )));
    }
    request.purchase.validate().map_err(GatewayError::InvalidOrder)?;

    let metadata = OrderMetadata {
        user_id: principal.user_id().into(),
        purchase: request.purchase.clone(),
    };
    let order = GatewayOrder {
        order_id: format!("order_{}_{}", principal.user_id(), now_ms),
        order_amount: request.amount,
        order_currency: gateway.currency().into(),
        customer_details: CustomerDetails {
            customer_id: principal.user_id().into(),
        },
        order_note: metadata
            .encode()
            .map_err(|err| GatewayError::InvalidOrder(err.to_string()))?,
    };

    match gateway.create_order(&order) {
        Ok(session) => {
            info!(
                user_id = principal.user_id(),
                order_id = %session.order_id,
                amount = %request.amount,
                purchase_kind = ?request.purchase.kind(),
                "gateway order created"
            );
            Ok(session)
        }
        Err(error) => {
            warn!(user_id = principal.user_id(), order_id = %order.order_id, %error, "gateway order failed");
            Err(error)
        }
    }
}
