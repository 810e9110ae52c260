//! Error types for HireLens services
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Authorization errors (2xxx)
    Forbidden,
    OwnerMismatch,

    // Resource errors (3xxx)
    NotFound,
    DocumentNotFound,
    JobNotFound,

    // State errors (4xxx)
    InvalidTransition,
    ConcurrencyConflict,

    // External service errors (5xxx)
    LlmQuotaExhausted,
    LlmUnavailable,
    QueueError,
    UpstreamError,

    // Persistence errors (6xxx)
    DatabaseError,
    ConnectionError,
    PersistenceError,

    // Internal errors (9xxx)
    EngineError,
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            // Authz (2xxx)
            ErrorCode::Forbidden => 2001,
            ErrorCode::OwnerMismatch => 2002,

            // Resources (3xxx)
            ErrorCode::NotFound => 3001,
            ErrorCode::DocumentNotFound => 3002,
            ErrorCode::JobNotFound => 3003,

            // State (4xxx)
            ErrorCode::InvalidTransition => 4001,
            ErrorCode::ConcurrencyConflict => 4002,

            // External (5xxx)
            ErrorCode::LlmQuotaExhausted => 5001,
            ErrorCode::LlmUnavailable => 5002,
            ErrorCode::QueueError => 5003,
            ErrorCode::UpstreamError => 5004,

            // Persistence (6xxx)
            ErrorCode::DatabaseError => 6001,
            ErrorCode::ConnectionError => 6002,
            ErrorCode::PersistenceError => 6003,

            // Internal (9xxx)
            ErrorCode::EngineError => 9001,
            ErrorCode::InternalError => 9002,
            ErrorCode::ConfigurationError => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    #[error("Evaluation job not found: {id}")]
    JobNotFound { id: String },

    // State errors
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Concurrent update conflict on job {job_id} after {attempts} attempts")]
    Concurrency { job_id: String, attempts: u32 },

    // External service errors
    #[error("LLM service is temporarily unavailable due to API usage limits")]
    LlmQuota { retry_after_secs: Option<u64> },

    #[error("LLM service error: {message}")]
    LlmUnavailable { message: String },

    #[error("Queue error: {message}")]
    QueueError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Persistence errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // Internal errors
    #[error("Evaluation engine error: {message}")]
    Engine { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::JobNotFound { .. } => ErrorCode::JobNotFound,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Concurrency { .. } => ErrorCode::ConcurrencyConflict,
            AppError::LlmQuota { .. } => ErrorCode::LlmQuotaExhausted,
            AppError::LlmUnavailable { .. } => ErrorCode::LlmUnavailable,
            AppError::QueueError { .. } => ErrorCode::QueueError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Persistence { .. } => ErrorCode::PersistenceError,
            AppError::Engine { .. } => ErrorCode::EngineError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::DocumentNotFound { .. }
            | AppError::JobNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::InvalidTransition { .. } | AppError::Concurrency { .. } => {
                StatusCode::CONFLICT
            }

            // 429 Too Many Requests
            AppError::LlmQuota { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Persistence { .. }
            | AppError::Engine { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::LlmUnavailable { .. } | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::QueueError { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Single-sentence message suitable for storing on a failed job.
    /// Never includes backtraces or nested source chains.
    pub fn job_message(&self) -> String {
        let text = self.to_string();
        match text.find('\n') {
            Some(idx) => text[..idx].to_string(),
            None => text,
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let retry_after_secs = match &self {
            AppError::LlmQuota { retry_after_secs } => *retry_after_secs,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                retry_after_secs,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
