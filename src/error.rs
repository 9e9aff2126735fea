//! Error types for the school library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes returned in API error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StorageFailure = 3,
    NoSuchData = 4,
    Conflict = 5,
    InvalidState = 6,
    StockAnomaly = 7,
    BadValue = 8,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Borrower already has an open loan, or a duplicate waitlist entry / unique row
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Loan is not in the state the requested transition needs
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Stock would drop below zero without an explicit force flag
    #[error("Stock anomaly: {0}")]
    StockAnomaly(String),

    /// The persistence boundary failed; nothing was committed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Classified schema or permission failure, used to pick a simpler read shape
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::StockAnomaly(_) => ErrorCode::StockAnomaly,
            AppError::StorageUnavailable(_) => ErrorCode::StorageFailure,
            AppError::Schema(_) => ErrorCode::Failure,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Authorization(_) => ErrorCode::NotAuthorized,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation
                Some("23505") => AppError::Conflict(db.message().to_string()),
                // foreign_key_violation
                Some("23503") => AppError::Conflict(db.message().to_string()),
                // check_violation
                Some("23514") => AppError::StockAnomaly(db.message().to_string()),
                // undefined_table, undefined_column, insufficient_privilege
                Some("42P01") | Some("42703") | Some("42501") => {
                    AppError::Schema(db.message().to_string())
                }
                _ => AppError::StorageUnavailable(e.to_string()),
            },
            _ => AppError::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StockAnomaly(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::StorageUnavailable(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable".to_string(),
                )
            }
            AppError::Schema(msg) => {
                tracing::error!("Schema error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
