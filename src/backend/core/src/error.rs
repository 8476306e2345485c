//! Error handling for Conveyor Core.
//!
//! This module provides:
//! - A central error type with machine-readable error codes
//! - HTTP status code mapping for API responses
//! - User-facing messages vs detailed internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use conveyor_core::error::{ConveyorError, Result, ErrorContext};
//!
//! fn my_function() -> Result<()> {
//!     some_operation()
//!         .context("Failed to perform operation")?;
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Conveyor operations.
pub type Result<T> = std::result::Result<T, ConveyorError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error
/// handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Job Errors (1000-1099)
    JobNotFound,
    MissingPayload,
    MalformedPayload,
    ItemFailed,

    // Worker Errors (1100-1199)
    LockHeld,
    QueueEmpty,
    DispatchFailed,

    // Store Errors (2000-2099)
    StoreError,
    StoreConnectionFailed,

    // Cache Errors (2100-2199)
    CacheError,
    CacheConnectionFailed,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Network Errors (3000-3099)
    NetworkError,

    // Authentication (4000-4099)
    InvalidToken,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::JobNotFound => 1000,
            Self::MissingPayload => 1001,
            Self::MalformedPayload => 1002,
            Self::ItemFailed => 1003,

            Self::LockHeld => 1100,
            Self::QueueEmpty => 1101,
            Self::DispatchFailed => 1102,

            Self::StoreError => 2000,
            Self::StoreConnectionFailed => 2001,

            Self::CacheError => 2100,
            Self::CacheConnectionFailed => 2101,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::NetworkError => 3000,

            Self::InvalidToken => 4000,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::JobNotFound => StatusCode::NOT_FOUND,

            // A held lock or an empty queue are precondition misses, not faults
            Self::LockHeld | Self::QueueEmpty => StatusCode::CONFLICT,

            Self::MissingPayload
            | Self::MalformedPayload
            | Self::ValidationError
            | Self::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,

            Self::InvalidToken => StatusCode::FORBIDDEN,

            Self::StoreConnectionFailed | Self::CacheConnectionFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            Self::DispatchFailed | Self::NetworkError => StatusCode::BAD_GATEWAY,

            Self::ItemFailed
            | Self::StoreError
            | Self::CacheError
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Dispatch failures are retryable because the periodic health-check is
    /// expected to re-trigger the worker regardless.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreConnectionFailed
                | Self::StoreError
                | Self::CacheConnectionFailed
                | Self::CacheError
                | Self::NetworkError
                | Self::DispatchFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "job",
            1100..=1199 => "worker",
            2000..=2099 => "store",
            2100..=2199 => "cache",
            2200..=2299 => "serialization",
            3000..=3099 => "network",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Conveyor Core.
///
/// Supports structured error codes, user-facing vs internal messages, error
/// chaining, and HTTP status mapping.
#[derive(Error, Debug)]
pub struct ConveyorError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-facing error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ConveyorError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a job-not-found error.
    pub fn job_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", id))
    }

    /// Create a missing-payload error: the job document has no entry under
    /// the configured payload key.
    pub fn missing_payload(key: &str, job_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MissingPayload,
            format!("Job {} has no payload under key '{}'", job_id, key),
        )
    }

    /// Create a malformed-payload error: the payload entry is not an array.
    pub fn malformed_payload(key: &str, job_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MalformedPayload,
            format!("Job {} payload under key '{}' is not a sequence", job_id, key),
        )
    }

    /// Create an item-failed error from the per-item handler.
    pub fn item_failed(processor: &str, index: u64, message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ItemFailed,
            format!("Item {} failed in processor '{}'", index, processor),
            message,
        )
    }

    /// Create a dispatch-failed error.
    pub fn dispatch_failed(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::DispatchFailed,
            "Failed to dispatch worker trigger",
            message,
        )
    }

    /// Create an invalid-token error.
    pub fn invalid_token(handler: &str) -> Self {
        Self::new(
            ErrorCode::InvalidToken,
            format!("Invalid trigger token for handler '{}'", handler),
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add an internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-facing message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error at a level appropriate to its category.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.http_status() {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "Error"
                );
            }
            StatusCode::BAD_GATEWAY | StatusCode::CONFLICT => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Error"
                );
            }
            _ => {
                debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "conveyor_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response body for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Machine-readable error code
    pub error_code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-facing error message
    pub error: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&ConveyorError> for ErrorResponse {
    fn from(error: &ConveyorError) -> Self {
        Self {
            success: false,
            error_code: error.code,
            numeric_code: error.code.numeric_code(),
            error: error.user_message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl IntoResponse for ConveyorError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a specific error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ConveyorError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ConveyorError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(ErrorCode::JobNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| ConveyorError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for ConveyorError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (
                ErrorCode::StoreConnectionFailed,
                "Unable to connect to the backing store",
            )
        } else if error.is_timeout() {
            (ErrorCode::StoreError, "Store operation timed out")
        } else {
            (ErrorCode::StoreError, "A store error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for ConveyorError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<reqwest::Error> for ConveyorError {
    fn from(error: reqwest::Error) -> Self {
        let (code, user_msg) = if error.is_timeout() {
            (ErrorCode::DispatchFailed, "Outbound request timed out")
        } else if error.is_connect() {
            (ErrorCode::NetworkError, "Failed to connect to endpoint")
        } else {
            (ErrorCode::NetworkError, "Network error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for ConveyorError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An I/O error occurred",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for ConveyorError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

impl From<anyhow::Error> for ConveyorError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ConveyorError>() {
            Ok(conveyor_error) => conveyor_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::MissingPayload.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorCode::LockHeld.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::InvalidToken.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::StoreConnectionFailed.is_retryable());
        assert!(ErrorCode::DispatchFailed.is_retryable());
        assert!(!ErrorCode::MissingPayload.is_retryable());
        assert!(!ErrorCode::JobNotFound.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::MissingPayload.category(), "job");
        assert_eq!(ErrorCode::LockHeld.category(), "worker");
        assert_eq!(ErrorCode::CacheError.category(), "cache");
        assert_eq!(ErrorCode::InvalidToken.category(), "authentication");
    }

    #[test]
    fn test_error_creation() {
        let error = ConveyorError::job_not_found("abc-123");
        assert_eq!(error.code(), ErrorCode::JobNotFound);
        assert_eq!(error.http_status(), StatusCode::NOT_FOUND);
        assert!(!error.is_retryable());
        assert!(error.user_message().contains("abc-123"));
    }

    #[test]
    fn test_payload_errors() {
        let missing = ConveyorError::missing_payload("data", "job-1");
        assert_eq!(missing.code(), ErrorCode::MissingPayload);
        assert!(missing.user_message().contains("data"));

        let malformed = ConveyorError::malformed_payload("data", "job-1");
        assert_eq!(malformed.code(), ErrorCode::MalformedPayload);
        assert!(malformed.user_message().contains("not a sequence"));
    }

    #[test]
    fn test_error_context_on_option() {
        let value: Option<u32> = None;
        let err = value.context("widget missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobNotFound);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ConveyorError::validation("Attributes cannot be empty");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(json.contains("Attributes cannot be empty"));
    }

    #[test]
    fn test_error_display() {
        let error = ConveyorError::with_internal(
            ErrorCode::StoreError,
            "A store error occurred",
            "connection refused: localhost:6379",
        );

        let display = format!("{}", error);
        assert!(display.contains("StoreError"));
        assert!(display.contains("A store error occurred"));
        assert!(display.contains("connection refused"));
    }
}
