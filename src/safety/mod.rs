//! SQL Safety Gate
//!
//! This module screens free-text SQL (typically produced by a language model)
//! before it reaches the database.
//!
//! # Validation Strategy
//! An ordered, fail-fast pipeline. The first failing gate decides the verdict:
//! 1. Empty text or the producer's error marker (`--`) -> `NO_VALID_SQL`
//! 2. Denylisted keyword anywhere, any case -> `DANGEROUS_OPERATION`
//! 3. Read-only call that does not start with `SELECT` -> `WRITE_NOT_PERMITTED`
//! 4. Statement separator before the end of the text -> `MULTIPLE_STATEMENTS`
//!
//! The denylist is plain substring matching. It will reject benign text that
//! happens to contain a keyword inside a literal or identifier; that is accepted
//! in exchange for never missing one.
//!
//! Validation is pure: no I/O, no shared state, safe to call from any thread.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AlveoloError, Result};

/// Keywords whose presence unconditionally rejects the text (checked in order)
pub const DANGEROUS_KEYWORDS: &[&str] = &["DROP", "TRUNCATE", "DELETE FROM", "ALTER TABLE", "EXEC"];

/// Prefix the SQL producer emits when it could not generate a statement
pub const ERROR_MARKER: &str = "--";

/// Statement separator
const SEPARATOR: char = ';';

/// Why a piece of SQL was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Empty text, or the producer signalled failure
    NoValidSql,
    /// A denylisted keyword was found
    DangerousOperation { keyword: String },
    /// Write statement on a read-only call
    WriteNotPermitted,
    /// More than one statement
    MultipleStatements,
}

impl RejectionReason {
    /// Stable code for logs and JSON output
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoValidSql => "NO_VALID_SQL",
            Self::DangerousOperation { .. } => "DANGEROUS_OPERATION",
            Self::WriteNotPermitted => "WRITE_NOT_PERMITTED",
            Self::MultipleStatements => "MULTIPLE_STATEMENTS",
        }
    }

    /// Whether asking the SQL producer for a new statement can help
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NoValidSql | Self::MultipleStatements)
    }
}

/// A refused statement: the failing gate plus operator-facing detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub detail: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason.code(), self.detail)
    }
}

/// Outcome of [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    /// SQL passed every gate; carries the original text unchanged
    Accepted { sql: String },
    /// SQL was refused
    Rejected(Rejection),
}

impl Verdict {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The rejection reason, if any
    #[must_use]
    pub const fn reason(&self) -> Option<&RejectionReason> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected(rejection) => Some(&rejection.reason),
        }
    }

    /// Convert into a `Result` for callers that propagate with `?`
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Accepted { sql } => Ok(sql),
            Self::Rejected(rejection) => Err(AlveoloError::SqlRejected(rejection)),
        }
    }

    fn rejected(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self::Rejected(Rejection { reason, detail: detail.into() })
    }
}

/// Validate SQL text before execution
///
/// # Arguments
/// * `sql` - SQL text as produced upstream
/// * `allow_write` - whether non-`SELECT` statements are permitted for this call
///
/// Returns `Verdict::Accepted` with `sql` untouched, or the first failing gate.
#[must_use]
pub fn validate(sql: &str, allow_write: bool) -> Verdict {
    let verdict = run_gates(sql, allow_write);
    if let Verdict::Rejected(rejection) = &verdict {
        tracing::debug!(code = rejection.reason.code(), detail = %rejection.detail, "SQL rejected");
    }
    verdict
}

fn run_gates(sql: &str, allow_write: bool) -> Verdict {
    let trimmed = sql.trim();

    if trimmed.is_empty() {
        return Verdict::rejected(RejectionReason::NoValidSql, "SQL text is empty");
    }
    if trimmed.starts_with(ERROR_MARKER) {
        return Verdict::rejected(
            RejectionReason::NoValidSql,
            "SQL producer returned an error marker instead of a statement",
        );
    }

    let upper = sql.to_uppercase();

    if let Some(keyword) = find_dangerous_keyword(&upper) {
        return Verdict::rejected(
            RejectionReason::DangerousOperation { keyword: keyword.to_string() },
            format!("SQL contains dangerous operation: {keyword}"),
        );
    }

    if !allow_write && !upper.trim().starts_with("SELECT") {
        return Verdict::rejected(
            RejectionReason::WriteNotPermitted,
            "Only SELECT statements are permitted in read-only mode",
        );
    }

    if has_stacked_statement(trimmed) {
        return Verdict::rejected(
            RejectionReason::MultipleStatements,
            "Multiple SQL statements are not permitted",
        );
    }

    Verdict::Accepted { sql: sql.to_string() }
}

/// First denylisted keyword contained in already upper-cased text
fn find_dangerous_keyword(upper: &str) -> Option<&'static str> {
    DANGEROUS_KEYWORDS.iter().copied().find(|keyword| upper.contains(keyword))
}

/// True when a separator appears anywhere but the very last character
fn has_stacked_statement(trimmed: &str) -> bool {
    let body = trimmed.strip_suffix(SEPARATOR).unwrap_or(trimmed);
    body.contains(SEPARATOR)
}
