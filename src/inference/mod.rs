//! Rule Inference Engine
//!
//! Walks a [`Schema`], applies the classifiers and assembles a [`Discovery`]:
//! the flat rule list, one description per table, one mapping per column and
//! the generated system prompt.
//!
//! # Determinism
//! Output depends only on the schema and the [`PromptSettings`]. Rules are
//! ordered by table declaration order, then within a table:
//! 1. column naming rules (column order, then predicate order)
//! 2. referential rules
//! 3. required-field rules
//! 4. uniqueness rules
//! 5. CHECK rules
//!
//! Running the engine twice on the same schema yields byte-identical output, so
//! results can be persisted and diffed across runs.
//!
//! # Isolation
//! A table that fails [`Table::validate`] contributes nothing and is reported
//! in [`Discovery::failures`]; the rest of the pass continues.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::{self, is_catalog_name, ColumnMapping, TablePurpose};
use crate::engine::MetadataSource;
use crate::error::Result;
use crate::rules::{BusinessRule, RuleKind};
use crate::schema::{self, Schema, SchemaExtraction, Table, TableFailure};

/// Inputs of the system prompt template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Name the assistant introduces itself with
    pub assistant_name: String,

    /// Organization the assistant works for
    pub organization: String,

    /// How the database is referred to in the prompt
    pub database_label: String,

    /// Maximum number of table descriptions listed in the prompt
    pub preview_limit: usize,

    /// Response language (BCP 47 tag)
    pub language: String,

    /// Version stamped into the persisted configuration
    pub schema_version: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            assistant_name: "Alveolo".to_string(),
            organization: "the dental clinic".to_string(),
            database_label: "the clinic database".to_string(),
            preview_limit: 15,
            language: "es-ES".to_string(),
            schema_version: "1.0.0".to_string(),
        }
    }
}

/// Classification result for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAnalysis {
    pub purpose: TablePurpose,
    pub description: String,
    pub rules: Vec<BusinessRule>,
    pub mappings: Vec<ColumnMapping>,
}

/// Aggregate output of one inference pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    /// Rules in deterministic order
    pub rules: Vec<BusinessRule>,

    /// Table name -> one sentence
    pub descriptions: BTreeMap<String, String>,

    /// Column mappings of the analyzed tables, in declaration order
    pub mappings: Vec<ColumnMapping>,

    /// Generated system prompt
    pub system_prompt: String,

    /// Tables the pass was asked to analyze
    pub tables_requested: usize,

    /// Tables that contributed rules and a description
    pub tables_analyzed: usize,

    /// Tables that could not be extracted or analyzed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TableFailure>,
}

impl Discovery {
    /// Whether every requested table was analyzed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.tables_analyzed == self.tables_requested
    }

    /// Number of rules per kind
    #[must_use]
    pub fn rule_counts(&self) -> BTreeMap<RuleKind, usize> {
        let mut counts = BTreeMap::new();
        for rule in &self.rules {
            *counts.entry(rule.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Classify one table
///
/// Fails only when the table metadata is inconsistent.
pub fn analyze_table(table: &Table) -> Result<TableAnalysis> {
    table.validate()?;

    let purpose = classifier::classify_table(table.name(), table.foreign_keys());
    let description = purpose.describe(table.name());

    let mut rules: Vec<BusinessRule> = table
        .columns()
        .iter()
        .flat_map(|column| classifier::classify_column(table.name(), column))
        .collect();
    rules.extend(classifier::referential_rules(table));
    rules.extend(classifier::required_field_rules(table));
    rules.extend(classifier::uniqueness_rules(table));
    rules.extend(classifier::check_constraint_rules(table));

    let mappings = table
        .columns()
        .iter()
        .map(|column| classifier::map_column(table.name(), column))
        .collect();

    Ok(TableAnalysis { purpose, description, rules, mappings })
}

/// Orchestrates the classifiers over a whole schema
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    settings: PromptSettings,
}

impl InferenceEngine {
    #[must_use]
    pub const fn new(settings: PromptSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &PromptSettings {
        &self.settings
    }

    /// Analyze every table of a schema
    #[must_use]
    pub fn infer(&self, schema: &Schema) -> Discovery {
        tracing::info!(tables = schema.len(), "starting rule inference");

        let mut rules = Vec::new();
        let mut descriptions = BTreeMap::new();
        let mut mappings = Vec::new();
        let mut failures = Vec::new();
        let mut analyzed = 0;

        for table in schema.tables() {
            match analyze_table(table) {
                Ok(analysis) => {
                    tracing::debug!(
                        table = table.name(),
                        rules = analysis.rules.len(),
                        "analyzed table"
                    );
                    descriptions.entry(table.name().to_string()).or_insert(analysis.description);
                    rules.extend(analysis.rules);
                    mappings.extend(analysis.mappings);
                    analyzed += 1;
                }
                Err(err) => {
                    tracing::warn!(table = table.name(), error = %err, "skipping malformed table");
                    failures.push(TableFailure::new(table.name(), &err));
                }
            }
        }

        let system_prompt = self.system_prompt(schema, &descriptions, rules.len());
        tracing::info!(rules = rules.len(), analyzed, "rule inference completed");

        Discovery {
            rules,
            descriptions,
            mappings,
            system_prompt,
            tables_requested: schema.len(),
            tables_analyzed: analyzed,
            failures,
        }
    }

    /// Analyze an extraction, carrying over its per-table failures
    #[must_use]
    pub fn run(&self, extraction: &SchemaExtraction) -> Discovery {
        let discovery = self.infer(&extraction.schema);

        let mut failures = extraction.failures.clone();
        failures.extend(discovery.failures);

        Discovery {
            tables_requested: extraction.requested.max(discovery.tables_requested),
            failures,
            ..discovery
        }
    }

    /// Extract a schema from `source` and analyze it
    pub async fn discover<S: MetadataSource + Sync>(&self, source: &S) -> Result<Discovery> {
        let extraction = schema::extract(source).await?;
        Ok(self.run(&extraction))
    }

    /// Render the system prompt
    ///
    /// Table counts cover every table of `schema`, including the ones that
    /// failed analysis. The preview takes the first `preview_limit`
    /// descriptions by name and then drops the catalog tables among them.
    #[must_use]
    pub fn system_prompt(
        &self,
        schema: &Schema,
        descriptions: &BTreeMap<String, String>,
        rule_count: usize,
    ) -> String {
        let s = &self.settings;
        let total = schema.len();
        let catalog = schema.tables().iter().filter(|t| is_catalog_name(t.name())).count();
        let main = total - catalog;

        let preview: String = descriptions
            .iter()
            .take(s.preview_limit)
            .filter(|(name, _)| !is_catalog_name(name))
            .map(|(name, description)| format!("• {name}: {description}\n"))
            .collect();

        format!(
            "You are {assistant}, an AI assistant specialized in managing {organization}.

**MISSION:**
Help the staff query and manage patients, appointments, treatments and budgets efficiently and safely.

**DATABASE:**
You have access to {database} with {total} tables:
- {main} main data tables
- {catalog} catalog/configuration tables

**MAIN TABLES:**
{preview}
**CAPABILITIES:**
1. Look up patients, appointments, treatments and budgets
2. Generate SQL queries from natural language requests
3. Validate data before any write operation
4. Provide statistics and analysis about the clinic
5. Answer questions about patient status and the schedule

**BUSINESS RULES DETECTED AUTOMATICALLY:**
{rule_count} validation and business rules were identified in the schema.

**INSTRUCTIONS:**
- Always validate data against the business rules before writing
- Use prepared statements to prevent SQL injection
- Give clear and professional answers
- If you are unsure about something, ask before acting
- Record every important operation in the history

**LANGUAGE:** {language}
**TONE:** Professional, friendly and efficient
",
            assistant = s.assistant_name,
            organization = s.organization,
            database = s.database_label,
            language = s.language,
        )
    }
}
