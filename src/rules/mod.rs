//! Business Rules
//!
//! A [`BusinessRule`] is a derived validation or integrity fact attached to a
//! table (and usually a column). Rules are produced by the classifier, appended
//! to a flat list by the inference engine and never modified afterwards. The
//! same column may carry several independent rules.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern attached to email-like columns
pub const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";

/// Pattern attached to phone-like columns
pub const PHONE_PATTERN: &str = r"^\+?[0-9]{9,15}$";

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(EMAIL_PATTERN).expect("email pattern is valid");
    static ref PHONE_RE: Regex = Regex::new(PHONE_PATTERN).expect("phone pattern is valid");
}

/// Date layouts accepted by temporal rules (besides RFC 3339)
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

/// Kind of a business rule
///
/// Declaration order is the persistence priority order (see [`RuleKind::priority`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    ReferentialIntegrity,
    RequiredField,
    Uniqueness,
    CheckConstraint,
    MonetaryValidation,
    TemporalValidation,
    FormatValidation,
    StateMachine,
}

impl RuleKind {
    /// Stable wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReferentialIntegrity => "REFERENTIAL_INTEGRITY",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::Uniqueness => "UNIQUENESS",
            Self::CheckConstraint => "CHECK_CONSTRAINT",
            Self::MonetaryValidation => "MONETARY_VALIDATION",
            Self::TemporalValidation => "TEMPORAL_VALIDATION",
            Self::FormatValidation => "FORMAT_VALIDATION",
            Self::StateMachine => "STATE_MACHINE",
        }
    }

    /// Priority of the rule's configuration record (lower is applied first)
    #[must_use]
    pub const fn priority(&self) -> u32 {
        match self {
            Self::ReferentialIntegrity => 10,
            Self::RequiredField => 20,
            Self::Uniqueness => 30,
            Self::CheckConstraint => 40,
            Self::MonetaryValidation => 50,
            Self::TemporalValidation => 60,
            Self::FormatValidation => 70,
            Self::StateMachine => 80,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the validation a rule asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    NonNegativeNumber,
    ValidDateFormat,
    EmailFormat,
    PhoneFormat,
    ValidStateTransition,
    NationalIdFormat,
    RecordExists,
    NotNull,
    UniqueValue,
    CheckCondition,
}

/// Structured data carried by some rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePayload {
    /// Parent table/column a value must exist in
    References { table: String, column: String },
    /// Regular expression a value must match
    Pattern { regex: String },
    /// Raw CHECK expression, verbatim
    Expression { constraint_name: String, definition: String },
}

/// A derived validation or integrity fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub kind: RuleKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub predicate: Predicate,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<RulePayload>,
}

impl BusinessRule {
    /// Column-scoped rule without payload
    pub fn for_column(
        kind: RuleKind,
        table: impl Into<String>,
        column: impl Into<String>,
        predicate: Predicate,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            column: Some(column.into()),
            predicate,
            message: message.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: RulePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Evaluate the rule against a candidate textual value
    ///
    /// Returns `None` when the rule cannot be decided locally (state machines,
    /// national ids, referential, uniqueness and CHECK rules need the database
    /// or an external lookup). `None` input means SQL NULL.
    #[must_use]
    pub fn check_value(&self, value: Option<&str>) -> Option<bool> {
        if self.predicate == Predicate::NotNull {
            return Some(value.is_some_and(|v| !v.trim().is_empty()));
        }

        // NULL is handled by the required-field rule alone
        let Some(value) = value else {
            return match self.predicate {
                Predicate::NonNegativeNumber
                | Predicate::ValidDateFormat
                | Predicate::EmailFormat
                | Predicate::PhoneFormat => Some(true),
                _ => None,
            };
        };
        let value = value.trim();

        match self.predicate {
            Predicate::NonNegativeNumber => {
                Some(value.parse::<f64>().is_ok_and(|n| n.is_finite() && n >= 0.0))
            }
            Predicate::ValidDateFormat => Some(is_valid_date(value)),
            Predicate::EmailFormat => Some(EMAIL_RE.is_match(value)),
            Predicate::PhoneFormat => Some(PHONE_RE.is_match(value)),
            _ => None,
        }
    }
}

fn is_valid_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || DATE_FORMATS.iter().any(|f| NaiveDate::parse_from_str(value, f).is_ok())
        || DATETIME_FORMATS.iter().any(|f| NaiveDateTime::parse_from_str(value, f).is_ok())
}
