use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single payment verification.
///
/// Display strings are what the caller sees in the `error` field, so they
/// carry observed values only where those are safe to echo back.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("Transaction already processed")]
    AlreadyProcessed,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Transaction not confirmed yet, please wait")]
    NotConfirmed,

    #[error("Transaction failed on chain")]
    TransactionFailed,

    #[error("No token transfer found in transaction")]
    NoTransferFound,

    #[error("Payment not sent to correct merchant address")]
    WrongRecipient,

    #[error("Incorrect payment amount: expected {expected}, received {received}")]
    IncorrectAmount { expected: String, received: String },

    #[error("Insufficient confirmations: {confirmations}/{required}")]
    InsufficientConfirmations { confirmations: u64, required: u64 },

    #[error("Transaction already being processed")]
    AlreadyBeingProcessed,

    #[error("Failed to record transaction")]
    RecordFailed,

    #[error("Internal server error")]
    Internal(String),
}

/// Coarse classification used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Pending,
    Mismatch,
    Duplicate,
    Infrastructure,
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidRequest(_) | PaymentError::InvalidTier(_) => ErrorKind::Validation,
            PaymentError::TransactionNotFound => ErrorKind::NotFound,
            PaymentError::NotConfirmed | PaymentError::InsufficientConfirmations { .. } => {
                ErrorKind::Pending
            }
            PaymentError::TransactionFailed
            | PaymentError::NoTransferFound
            | PaymentError::WrongRecipient
            | PaymentError::IncorrectAmount { .. } => ErrorKind::Mismatch,
            PaymentError::AlreadyProcessed | PaymentError::AlreadyBeingProcessed => {
                ErrorKind::Duplicate
            }
            PaymentError::RecordFailed | PaymentError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Pending | ErrorKind::NotFound)
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::InvalidRequest(_) => "INVALID_REQUEST",
            PaymentError::InvalidTier(_) => "INVALID_TIER",
            PaymentError::AlreadyProcessed => "ALREADY_PROCESSED",
            PaymentError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            PaymentError::NotConfirmed => "NOT_CONFIRMED",
            PaymentError::TransactionFailed => "TRANSACTION_FAILED",
            PaymentError::NoTransferFound => "NO_TRANSFER_FOUND",
            PaymentError::WrongRecipient => "WRONG_RECIPIENT",
            PaymentError::IncorrectAmount { .. } => "INCORRECT_AMOUNT",
            PaymentError::InsufficientConfirmations { .. } => "INSUFFICIENT_CONFIRMATIONS",
            PaymentError::AlreadyBeingProcessed => "ALREADY_BEING_PROCESSED",
            PaymentError::RecordFailed => "RECORD_FAILED",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(#[from] ethers::providers::ProviderError),

    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Balance overflow for user {0}")]
    BalanceOverflow(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub retryable: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let status = self.status_code();

        if let PaymentError::Internal(detail) = &self {
            tracing::error!(
                request_id = %request_id,
                detail = %detail,
                "Request failed"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = self.error_code(),
                "Verification rejected: {}",
                self
            );
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: self.error_code().to_string(),
            retryable: self.retryable(),
            timestamp: Utc::now(),
            request_id,
        };

        (status, Json(body)).into_response()
    }
}
