//! # Engine Error Type
//!
//! Unified error returned by every engine operation.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kasa POS                               │
//! │                                                                         │
//! │  Caller (UI / API)              Engine                                  │
//! │  ─────────────────              ──────                                  │
//! │                                                                         │
//! │  engine.complete_sale(None)                                             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Result<T, EngineError>                                          │  │
//! │  │         │                                                        │  │
//! │  │  CoreError::InsufficientStock ──► code INSUFFICIENT_STOCK ──┐   │  │
//! │  │  CoreError::CommitConflict    ──► code COMMIT_CONFLICT    ──┤   │  │
//! │  │  CoreError::Validation        ──► code VALIDATION_ERROR   ──┤   │  │
//! │  │  DbError::QueryFailed         ──► code DATABASE_ERROR     ──┤   │  │
//! │  │                                                              ▼   │  │
//! │  │                                   ErrorPayload { code, message } │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  switch (e.code) { case 'INSUFFICIENT_STOCK': highlightLine(...) }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use kasa_core::CoreError;
use kasa_db::DbError;

/// Error codes for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input rejected before any side effect; fix and retry
    ValidationError,

    /// Not enough stock; adjust the cart and retry
    InsufficientStock,

    /// Stock changed between pre-check and commit; nothing was written
    CommitConflict,

    /// Mobile-money gateway failure; the sale is left pending
    PaymentGatewayError,

    /// Entity not found
    NotFound,

    /// Tab / parked cart / checkout-lock problem
    SessionError,

    /// Storage failed
    DatabaseError,

    /// Anything else
    Internal,
}

/// Serialisable error for the UI/API boundary.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for Rice 5kg: available 1, requested 2" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Department could not be resolved: {0}")]
    Department(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Core(e) => match e {
                CoreError::Validation(_) | CoreError::StaleStockCheck { .. } => ErrorCode::ValidationError,
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::CommitConflict { .. } => ErrorCode::CommitConflict,
                CoreError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                CoreError::ItemNotFound(_)
                | CoreError::VariantNotFound { .. }
                | CoreError::LineNotFound(_)
                | CoreError::SaleNotFound(_) => ErrorCode::NotFound,
                CoreError::TabNotFound(_)
                | CoreError::TabNotEmpty(_)
                | CoreError::LastTab
                | CoreError::CartBusy(_)
                | CoreError::ParkedCartNotFound(_) => ErrorCode::SessionError,
                CoreError::InvalidSaleStatus { .. } | CoreError::InvalidTransition { .. } => {
                    ErrorCode::ValidationError
                }
            },
            EngineError::Db(DbError::NotFound { .. }) => ErrorCode::NotFound,
            EngineError::Db(_) => ErrorCode::DatabaseError,
            EngineError::Config(_) | EngineError::Department(_) | EngineError::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Payload for the caller. Storage details are logged, not exposed.
    pub fn to_payload(&self) -> ErrorPayload {
        let message = match self {
            EngineError::Db(DbError::NotFound { entity, id }) => format!("{} not found: {}", entity, id),
            EngineError::Db(e) => {
                tracing::error!(error = %e, "Database operation failed");
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };
        ErrorPayload {
            code: self.code(),
            message,
        }
    }
}

impl From<&EngineError> for ErrorPayload {
    fn from(err: &EngineError) -> Self {
        err.to_payload()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
