//! # Payment Gateway Adapter
//!
//! The seam to the external mobile-money network. The adapter owns all
//! protocol detail; the engine only asks it to start a collection and
//! later receives the outcome through `Engine::on_payment_result`.
//!
//! ```text
//! Engine ──request_payment(PaymentRequest)──► adapter ──► mobile-money network
//!    ▲                                                          │
//!    └──────────── on_payment_result(sale_id, PaymentResult) ◄──┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use kasa_core::Money;

/// Collection request for one pending sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub sale_id: String,
    pub department_id: String,
    pub receipt_number: String,
    pub amount: Money,
    pub customer_label: Option<String>,
}

/// Terminal outcome reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PaymentResult {
    Confirmed { reference: Option<String> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct GatewayError(pub String);

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a collection. Returning `Ok` means the request was accepted,
    /// not that the customer has paid.
    async fn request_payment(&self, request: PaymentRequest) -> Result<(), GatewayError>;
}
