//! Persistence Records
//!
//! Flattens a [`Discovery`] into key/value records for a configuration table.
//! Storage is up to the caller; this module only shapes the rows.
//!
//! # Record Layout
//! | category            | key                                   | type |
//! |---------------------|---------------------------------------|------|
//! | `PROMPT`            | `SYSTEM_BASE`                         | TEXT |
//! | `BUSINESS_RULE`     | `{KIND}_{table}_{column\|GENERAL}_{i}` | JSON |
//! | `TABLE_DESCRIPTION` | table name                            | TEXT |
//! | `CONFIGURATION`     | fixed metadata keys                   | mixed |
//!
//! `i` is the rule's position in [`Discovery::rules`], so keys stay unique even
//! when one column carries several rules of the same kind.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AlveoloError, Result};
use crate::inference::Discovery;
use crate::rules::BusinessRule;

/// Value of `source` on every generated record
pub const RECORD_SOURCE: &str = "AUTO_DISCOVERY";

pub const CATEGORY_PROMPT: &str = "PROMPT";
pub const CATEGORY_BUSINESS_RULE: &str = "BUSINESS_RULE";
pub const CATEGORY_TABLE_DESCRIPTION: &str = "TABLE_DESCRIPTION";
pub const CATEGORY_CONFIGURATION: &str = "CONFIGURATION";

const PROMPT_PRIORITY: u32 = 1;
const DESCRIPTION_PRIORITY: u32 = 50;
const CONFIGURATION_PRIORITY: u32 = 100;

/// How a record's value should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Text,
    Json,
    Number,
    Boolean,
}

/// One configuration row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub category: String,
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
    pub priority: u32,
    pub source: String,
    pub reason: String,
}

impl ConfigRecord {
    fn new(
        category: &str,
        key: impl Into<String>,
        value: impl Into<String>,
        value_type: ValueType,
        priority: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category: category.to_string(),
            key: key.into(),
            value: value.into(),
            value_type,
            priority,
            source: RECORD_SOURCE.to_string(),
            reason: reason.into(),
        }
    }

    /// Decode the rule held by a `BUSINESS_RULE` record
    pub fn rule(&self) -> Result<BusinessRule> {
        if self.category != CATEGORY_BUSINESS_RULE {
            return Err(AlveoloError::invalid_input(format!(
                "Record '{}' is not a business rule",
                self.key
            )));
        }
        serde_json::from_str(&self.value).map_err(|e| {
            AlveoloError::invalid_input(format!("Invalid rule JSON in record '{}': {e}", self.key))
        })
    }
}

/// Decode every `BUSINESS_RULE` record, keeping their order
///
/// Records of other categories are skipped.
pub fn decode_rules(records: &[ConfigRecord]) -> Result<Vec<BusinessRule>> {
    records
        .iter()
        .filter(|record| record.category == CATEGORY_BUSINESS_RULE)
        .map(ConfigRecord::rule)
        .collect()
}

/// Values that vary per run and are not derived from the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContext {
    pub analyzed_at: DateTime<Utc>,
    pub schema_version: String,
    pub language: String,
}

impl RecordContext {
    /// Context stamped with the current time
    pub fn now(schema_version: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            analyzed_at: Utc::now(),
            schema_version: schema_version.into(),
            language: language.into(),
        }
    }
}

/// Key of the `index`-th rule
#[must_use]
pub fn rule_key(rule: &BusinessRule, index: usize) -> String {
    format!(
        "{}_{}_{}_{index}",
        rule.kind,
        rule.table,
        rule.column.as_deref().unwrap_or("GENERAL")
    )
}

/// Shape a discovery into configuration records
///
/// Output order: prompt, rules, descriptions, configuration. Apart from
/// `ANALYZED_AT` the records depend only on the discovery.
pub fn config_records(discovery: &Discovery, ctx: &RecordContext) -> Result<Vec<ConfigRecord>> {
    let mut records = Vec::with_capacity(discovery.rules.len() + discovery.descriptions.len() + 7);

    records.push(ConfigRecord::new(
        CATEGORY_PROMPT,
        "SYSTEM_BASE",
        discovery.system_prompt.as_str(),
        ValueType::Text,
        PROMPT_PRIORITY,
        "Base system prompt generated from the database schema",
    ));

    for (index, rule) in discovery.rules.iter().enumerate() {
        let value = serde_json::to_string(rule).map_err(|e| {
            AlveoloError::invalid_input(format!("Failed to serialize rule {index}: {e}"))
        })?;
        records.push(ConfigRecord::new(
            CATEGORY_BUSINESS_RULE,
            rule_key(rule, index),
            value,
            ValueType::Json,
            rule.kind.priority(),
            format!("Rule inferred automatically from the structure of {}", rule.table),
        ));
    }

    for (table, description) in &discovery.descriptions {
        records.push(ConfigRecord::new(
            CATEGORY_TABLE_DESCRIPTION,
            table.as_str(),
            description.as_str(),
            ValueType::Text,
            DESCRIPTION_PRIORITY,
            "Description inferred from the table name and structure",
        ));
    }

    let configuration = [
        ("SCHEMA_VERSION", ctx.schema_version.clone(), ValueType::Text, "Schema analysis version"),
        (
            "ANALYZED_AT",
            ctx.analyzed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ValueType::Text,
            "Time of the last automatic analysis",
        ),
        (
            "TOTAL_TABLES",
            discovery.tables_analyzed.to_string(),
            ValueType::Number,
            "Number of tables analyzed",
        ),
        (
            "TOTAL_RULES",
            discovery.rules.len().to_string(),
            ValueType::Number,
            "Number of business rules inferred",
        ),
        ("WRITE_MODE", "false".to_string(), ValueType::Boolean, "Writes are disabled by default"),
        ("LANGUAGE", ctx.language.clone(), ValueType::Text, "Language of assistant responses"),
    ];
    for (key, value, value_type, reason) in configuration {
        records.push(ConfigRecord::new(
            CATEGORY_CONFIGURATION,
            key,
            value,
            value_type,
            CONFIGURATION_PRIORITY,
            reason,
        ));
    }

    tracing::debug!(records = records.len(), "built configuration records");
    Ok(records)
}
