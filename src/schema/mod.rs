//! Schema Model
//!
//! An immutable snapshot of one database's structure, built from raw
//! introspection results.
//!
//! # Construction
//! A [`MetadataSource`] delivers one [`RawTableMetadata`] per table. Missing
//! optional collections (keys, constraints, unique columns) are simply empty.
//! [`extract`] drives a source table by table: a failure describing one table is
//! recorded and the remaining tables are still extracted.
//!
//! # Immutability
//! There is no mutation API. Re-running extraction produces a new [`Schema`], so
//! inference always sees an internally consistent snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::engine::MetadataSource;
use crate::error::{AlveoloError, Result};

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,

    /// Declared data type (engine-specific)
    pub data_type: String,

    /// Maximum character length, when the type declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,

    /// Whether the column allows NULL values
    pub nullable: bool,

    /// Default value expression (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Column {
    /// Convenience constructor for a column without length or default
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            nullable,
            default: None,
        }
    }
}

/// Foreign key as delivered by a metadata source (owning table implied)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl RawForeignKey {
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

/// Referential relationship from one column to a column of another table
///
/// Composite keys are flattened into one `ForeignKey` per column pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// CHECK constraint with its raw boolean expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub definition: String,
}

impl CheckConstraint {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self { name: name.into(), definition: definition.into() }
    }
}

/// Raw metadata for one table, as returned by `describe_table`
///
/// This is also the on-disk snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTableMetadata {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub primary_keys: Vec<String>,

    #[serde(default)]
    pub foreign_keys: Vec<RawForeignKey>,

    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,

    #[serde(default)]
    pub unique_columns: Vec<String>,
}

impl RawTableMetadata {
    /// Empty metadata for a named table
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// One table of a [`Schema`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_keys: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    check_constraints: Vec<CheckConstraint>,
    unique_columns: Vec<String>,
}

impl Table {
    /// Build a table from raw metadata
    ///
    /// Never fails. Key and unique column lists keep their first occurrence
    /// order with duplicates removed.
    #[must_use]
    pub fn from_raw(raw: RawTableMetadata) -> Self {
        let foreign_keys = raw
            .foreign_keys
            .into_iter()
            .map(|fk| ForeignKey {
                table: raw.name.clone(),
                column: fk.column,
                referenced_table: fk.referenced_table,
                referenced_column: fk.referenced_column,
            })
            .collect();

        Self {
            name: raw.name,
            columns: raw.columns,
            primary_keys: dedup_preserving_order(raw.primary_keys),
            foreign_keys,
            check_constraints: raw.check_constraints,
            unique_columns: dedup_preserving_order(raw.unique_columns),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    #[must_use]
    pub fn check_constraints(&self) -> &[CheckConstraint] {
        &self.check_constraints
    }

    #[must_use]
    pub fn unique_columns(&self) -> &[String] {
        &self.unique_columns
    }

    /// Check that the table's parts refer to each other consistently
    ///
    /// Classification assumes every key and unique column names a real column
    /// of this table and every check constraint carries an expression.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlveoloError::malformed_table(&self.name, "table name is empty"));
        }
        if let Some(column) = self.columns.iter().find(|c| c.name.trim().is_empty()) {
            return Err(AlveoloError::malformed_table(
                &self.name,
                format!("column with empty name (type '{}')", column.data_type),
            ));
        }

        let known = |column: &str| self.columns.iter().any(|c| c.name == column);

        if let Some(pk) = self.primary_keys.iter().find(|pk| !known(pk)) {
            return Err(AlveoloError::malformed_table(
                &self.name,
                format!("primary key refers to unknown column '{pk}'"),
            ));
        }
        if let Some(unique) = self.unique_columns.iter().find(|u| !known(u)) {
            return Err(AlveoloError::malformed_table(
                &self.name,
                format!("unique constraint refers to unknown column '{unique}'"),
            ));
        }
        for fk in &self.foreign_keys {
            if !known(&fk.column) {
                return Err(AlveoloError::malformed_table(
                    &self.name,
                    format!("foreign key refers to unknown column '{}'", fk.column),
                ));
            }
            if fk.referenced_table.trim().is_empty() || fk.referenced_column.trim().is_empty() {
                return Err(AlveoloError::malformed_table(
                    &self.name,
                    format!("foreign key on '{}' has no referenced target", fk.column),
                ));
            }
        }
        let empty_check = self.check_constraints.iter().find(|c| c.definition.trim().is_empty());
        if let Some(check) = empty_check {
            return Err(AlveoloError::malformed_table(
                &self.name,
                format!("check constraint '{}' has an empty expression", check.name),
            ));
        }

        Ok(())
    }
}

/// Immutable schema snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    tables: Vec<Table>,
}

impl Schema {
    /// Build a schema from tables in declaration order
    ///
    /// Fails when two tables share a name (the table name is the unique key).
    pub fn new(tables: Vec<Table>) -> Result<Self> {
        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.name.as_str()) {
                return Err(AlveoloError::invalid_input(format!(
                    "Duplicate table name '{}' in schema",
                    table.name
                )));
            }
        }
        Ok(Self { tables })
    }

    /// Build a schema directly from raw metadata
    pub fn from_raw(raw: Vec<RawTableMetadata>) -> Result<Self> {
        Self::new(raw.into_iter().map(Table::from_raw).collect())
    }

    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A table that could not be extracted or analyzed, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub code: String,
    pub message: String,
}

impl TableFailure {
    pub fn new(table: impl Into<String>, err: &AlveoloError) -> Self {
        Self { table: table.into(), code: err.error_code().to_string(), message: err.message() }
    }
}

/// Result of one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaExtraction {
    /// Tables that were described successfully
    pub schema: Schema,

    /// Number of distinct tables the source listed
    pub requested: usize,

    /// Tables that could not be described
    pub failures: Vec<TableFailure>,
}

/// Extract a schema snapshot from a metadata source
///
/// Listing the tables must succeed. Each table is then described on its own;
/// a failing table is recorded in `failures` and skipped.
pub async fn extract<S: MetadataSource + Sync>(source: &S) -> Result<SchemaExtraction> {
    let listed = source.list_tables().await?;
    let names = dedup_preserving_order(listed);
    tracing::info!(tables = names.len(), "extracting schema");

    let mut tables = Vec::with_capacity(names.len());
    let mut failures = Vec::new();

    for name in &names {
        match source.describe_table(name).await {
            Ok(raw) => {
                tracing::debug!(table = %name, columns = raw.columns.len(), "described table");
                tables.push(Table::from_raw(RawTableMetadata { name: name.clone(), ..raw }));
            }
            Err(err) => {
                tracing::warn!(table = %name, error = %err, "skipping table, metadata unavailable");
                failures.push(TableFailure::new(name, &err));
            }
        }
    }

    Ok(SchemaExtraction { schema: Schema::new(tables)?, requested: names.len(), failures })
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
