//! Error types for tunevault
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Database, Materialize, Provider)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for tunevault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tunevault
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "vault.root_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Artifact materialization failed
    #[error("materialization error: {0}")]
    Materialize(#[from] MaterializeError),

    /// Generation provider API error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Request payload failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate provider task id)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Artifact materialization errors
///
/// Each variant identifies the stage that failed so callers can log a
/// precise per-item skip reason without aborting the batch.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The descriptor carried no usable source URL
    #[error("no artifact source URL in descriptor at index {index}")]
    MissingSourceUrl {
        /// Index of the descriptor within the notification
        index: usize,
    },

    /// The remote fetch could not be performed
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// The remote URL that was being fetched
        url: String,
        /// The underlying failure
        reason: String,
    },

    /// The remote server answered with a non-success status
    #[error("upstream returned HTTP {status} for {url}")]
    UpstreamStatus {
        /// The remote URL that was being fetched
        url: String,
        /// The HTTP status code the upstream returned
        status: u16,
    },

    /// Writing the bytes into the vault failed
    #[error("failed to persist artifact at {path}: {reason}")]
    Persist {
        /// The vault-relative destination path
        path: String,
        /// The underlying failure
        reason: String,
    },
}

/// Generation provider API errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is not configured (missing API key or base URL)
    #[error("provider credentials not configured")]
    MissingCredentials,

    /// The request could not be sent or the response not received
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider answered with an application-level error
    #[error("provider API error {code}: {message}")]
    Api {
        /// Provider status code from the response envelope
        code: i64,
        /// Provider-supplied message
        message: String,
    },

    /// The response body did not have the expected shape
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// API error response format
///
/// Returned by API endpoints when an error occurs: a machine-readable
/// code, a human-readable message, and optional contextual details.
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "task 123 not found"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "provider_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 422, // Unprocessable Entity

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            // 409 Conflict - duplicate correlation id
            Error::Database(DatabaseError::ConstraintViolation(_)) => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - External service errors
            Error::Provider(_) => 502,
            Error::Materialize(_) => 502,
            Error::Network(_) => 502,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(e) => match e {
                DatabaseError::NotFound(_) => "not_found",
                DatabaseError::ConstraintViolation(_) => "duplicate_task",
                _ => "database_error",
            },
            Error::Sqlx(_) => "database_error",
            Error::Materialize(e) => match e {
                MaterializeError::MissingSourceUrl { .. } => "missing_source_url",
                MaterializeError::Fetch { .. } => "artifact_fetch_failed",
                MaterializeError::UpstreamStatus { .. } => "artifact_upstream_error",
                MaterializeError::Persist { .. } => "artifact_persist_failed",
            },
            Error::Provider(e) => match e {
                ProviderError::MissingCredentials => "provider_not_configured",
                ProviderError::Request(_) => "provider_unreachable",
                ProviderError::Api { .. } => "provider_error",
                ProviderError::MalformedResponse(_) => "provider_malformed_response",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "validation_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let code = err.error_code().to_string();
        let message = err.to_string();

        let details = match &err {
            Error::Materialize(MaterializeError::UpstreamStatus { url, status }) => {
                Some(serde_json::json!({ "url": url, "upstream_status": status }))
            }
            Error::Provider(ProviderError::Api { code, .. }) => {
                Some(serde_json::json!({ "provider_code": code }))
            }
            _ => None,
        };

        Self {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
