use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Errors raised while talking to the chain.
///
/// Each variant maps to one explicit ledger transition in the coordinator:
/// reads skip the cycle, submissions and timeouts resolve the subscriber
/// as failed.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chain read failed: {0}")]
    ChainRead(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("No receipt for {tx_hash} after {waited_secs}s")]
    Timeout { tx_hash: String, waited_secs: u64 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode chain response: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::Timeout { .. })
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                reason.clone(),
            ),
            AppError::Chain(_) => (
                StatusCode::BAD_GATEWAY,
                "CHAIN_ERROR",
                "The chain node could not be reached".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(error: reqwest::Error) -> Self {
        ChainError::ChainRead(format!("HTTP request error: {:?}", error))
    }
}

impl From<hex::FromHexError> for ChainError {
    fn from(error: hex::FromHexError) -> Self {
        ChainError::Decode(format!("Invalid hex: {}", error))
    }
}

impl From<alloy_sol_types::Error> for ChainError {
    fn from(error: alloy_sol_types::Error) -> Self {
        ChainError::Decode(format!("ABI decode failed: {}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for chain calls
pub type ChainResult<T> = Result<T, ChainError>;
