//! Offline schema snapshots
//!
//! A snapshot is the JSON document emitted by `alveolo introspect`:
//! `{"tables": [RawTableMetadata, ...]}`. Loading one gives a
//! [`MetadataSource`] that needs no database, which is handy for running
//! discovery on a machine without network access to the clinic server.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::MetadataSource;
use crate::error::{AlveoloError, Result};
use crate::schema::{CheckConstraint, Column, RawForeignKey, RawTableMetadata, Schema, Table};

/// Serialized form of a whole schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<RawTableMetadata>,
}

impl SchemaSnapshot {
    /// Snapshot of an extracted schema, in declaration order
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        Self { tables: schema.tables().iter().map(to_raw).collect() }
    }
}

fn to_raw(table: &Table) -> RawTableMetadata {
    RawTableMetadata {
        name: table.name().to_string(),
        columns: table.columns().to_vec(),
        primary_keys: table.primary_keys().to_vec(),
        foreign_keys: table
            .foreign_keys()
            .iter()
            .map(|fk| RawForeignKey::new(&fk.column, &fk.referenced_table, &fk.referenced_column))
            .collect(),
        check_constraints: table.check_constraints().to_vec(),
        unique_columns: table.unique_columns().to_vec(),
    }
}

/// [`MetadataSource`] backed by an in-memory snapshot
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    snapshot: SchemaSnapshot,
}

impl SnapshotSource {
    #[must_use]
    pub const fn new(snapshot: SchemaSnapshot) -> Self {
        Self { snapshot }
    }

    #[must_use]
    pub fn from_tables(tables: Vec<RawTableMetadata>) -> Self {
        Self::new(SchemaSnapshot { tables })
    }

    /// Load a snapshot file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlveoloError::invalid_input(format!(
                "Failed to read snapshot {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse snapshot JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: SchemaSnapshot = serde_json::from_str(content)
            .map_err(|e| AlveoloError::invalid_input(format!("Invalid snapshot JSON: {e}")))?;
        Ok(Self::new(snapshot))
    }

    fn table(&self, name: &str) -> Result<&RawTableMetadata> {
        self.snapshot.tables.iter().find(|t| t.name == name).ok_or_else(|| {
            AlveoloError::engine_error("snapshot", format!("Table '{name}' is not in the snapshot"))
        })
    }
}

impl MetadataSource for SnapshotSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.snapshot.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn fetch_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.primary_keys.clone())
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }

    async fn fetch_check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        Ok(self.table(table)?.check_constraints.clone())
    }

    async fn fetch_unique_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.unique_columns.clone())
    }
}
