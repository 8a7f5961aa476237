//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for all Alveolo commands.
//! Every command prints exactly one `SuccessEnvelope` or `ErrorEnvelope` on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! SQL rejections use the gate code (`DANGEROUS_OPERATION`, `MULTIPLE_STATEMENTS`, ...)
//! and carry a `retryable` hint for the caller that produced the SQL.

use serde::{Deserialize, Serialize};

use crate::error::AlveoloError;
use crate::safety::Rejection;

/// Success envelope for command results
///
/// Generic over the data type to support different command return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine used for this command (postgres, sqlite, snapshot)
    pub engine: String,

    /// Command that was executed (introspect, discover, check, validate, query, ...)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        engine: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self { ok: true, engine: engine.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Database engine (empty string if not engine-specific)
    pub engine: String,

    /// Command that was attempted
    pub command: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(engine: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), command: command.into(), error }
    }

    /// Create error envelope from `AlveoloError`
    ///
    /// A wrapped SQL rejection is reported with its gate code.
    pub fn from_error(
        engine: impl Into<String>,
        command: impl Into<String>,
        err: &AlveoloError,
    ) -> Self {
        let error = match err {
            AlveoloError::SqlRejected(rejection) => ErrorInfo::from(rejection),
            other => ErrorInfo::new(other.error_code(), other.message()),
        };
        Self::new(engine, command, error)
    }

    /// Create error envelope from a validator rejection
    pub fn from_rejection(
        engine: impl Into<String>,
        command: impl Into<String>,
        rejection: &Rejection,
    ) -> Self {
        Self::new(engine, command, ErrorInfo::from(rejection))
    }
}

/// Error information structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "CONNECTION_FAILED", "WRITE_NOT_PERMITTED")
    pub code: String,

    /// Human-readable error message (no credentials)
    pub message: String,

    /// Whether regenerating the SQL may succeed (rejections only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), retryable: None }
    }
}

impl From<&Rejection> for ErrorInfo {
    fn from(rejection: &Rejection) -> Self {
        Self {
            code: rejection.reason.code().to_string(),
            message: rejection.detail.clone(),
            retryable: Some(rejection.reason.is_retryable()),
        }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,

    /// Number of tables analyzed (discovery only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_analyzed: Option<usize>,
}

impl Metadata {
    /// Create new metadata with just execution time
    #[must_use]
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, ..Self::default() }
    }

    /// Create new metadata with execution time and row count
    #[must_use]
    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned), ..Self::default() }
    }

    /// Create new metadata with execution time and analyzed table count
    #[must_use]
    pub fn with_tables(execution_ms: u64, tables_analyzed: usize) -> Self {
        Self { execution_ms, tables_analyzed: Some(tables_analyzed), ..Self::default() }
    }
}
