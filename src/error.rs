//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Alveolo.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConnectionFailed`: Database connection errors
//! - `QueryFailed`: Query execution errors
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `EngineError`: Engine-specific database errors (metadata fetches included)
//! - `ConfigError`: Configuration file or connection registry errors
//! - `MalformedTable`: Table metadata that is internally inconsistent
//! - `SqlRejected`: SQL text refused by the safety gate
//!
//! SQL rejections are first-class [`Verdict`](crate::safety::Verdict) values.
//! `SqlRejected` only exists so callers that want `?` can convert one.

use thiserror::Error;

use crate::safety::Rejection;

/// Main error type for Alveolo operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlveoloError {
    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Table metadata is inconsistent and cannot be classified
    #[error("Malformed table '{table}': {detail}")]
    MalformedTable { table: String, detail: String },

    /// SQL refused by the safety gate
    #[error("SQL rejected: {0}")]
    SqlRejected(Rejection),
}

impl AlveoloError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineError { .. } => "ENGINE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::MalformedTable { .. } => "MALFORMED_TABLE",
            Self::SqlRejected(_) => "SQL_REJECTED",
        }
    }

    /// Get human-readable error message (no credentials or file contents)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError { engine: engine.into(), detail: detail.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a malformed table error
    pub fn malformed_table(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedTable { table: table.into(), detail: detail.into() }
    }
}

impl From<Rejection> for AlveoloError {
    fn from(rejection: Rejection) -> Self {
        Self::SqlRejected(rejection)
    }
}

/// Result type alias for Alveolo operations
pub type Result<T> = std::result::Result<T, AlveoloError>;
