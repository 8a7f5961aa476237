//! Alveolo - Schema-Driven Business Rule Discovery
//!
//! Alveolo reads the structure of a relational database, infers the business
//! rules its schema implies, writes a one-sentence description of each table
//! and generates the system prompt for a database assistant. It also screens
//! free-text SQL before it reaches the database.
//!
//! # Core Principles
//! - Deterministic output (same schema and settings, byte-identical results)
//! - Per-table fault isolation (one bad table never aborts a pass)
//! - Read-only by default (writes need an explicit opt-in per call)
//! - JSON-only stdout for the CLI, logs on stderr
//!
//! # Module Organization
//! - [`schema`] - Immutable schema snapshot and extraction driver
//! - [`classifier`] - Name and structure based classification
//! - [`rules`] - Business rule model and local value checks
//! - [`inference`] - Rule inference engine and system prompt
//! - [`safety`] - SQL safety gate
//! - [`records`] - Configuration records for persisting a discovery
//! - [`engine`] - Database collaborators (`SQLite`, `PostgreSQL`, snapshots)
//! - [`config`] - Connection registry and discovery settings
//! - [`output`] - JSON output envelope types
//! - [`error`] - Error types and handling

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one engine feature: `sqlite` or `postgres`");

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod output;
pub mod records;
pub mod rules;
pub mod safety;
pub mod schema;

// Re-export commonly used types for convenience
pub use classifier::{
    classify_column, classify_table, ColumnKind, ColumnMapping, Domain, SemanticCategory,
    TablePurpose,
};
pub use config::{
    list_connections, resolve_connection, save_connection, AlveoloConfig, ConfigLocation,
    StoredConnection,
};
pub use engine::snapshot::{SchemaSnapshot, SnapshotSource};
pub use engine::{
    Capabilities, ConnectionConfig, ConnectionInfo, Database, DatabaseType, MetadataSource,
    QueryExecutor, QueryResult,
};
pub use error::{AlveoloError, Result};
pub use inference::{Discovery, InferenceEngine, PromptSettings};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use records::{config_records, decode_rules, ConfigRecord, RecordContext, ValueType};
pub use rules::{BusinessRule, Predicate, RuleKind, RulePayload};
pub use safety::{validate, Rejection, RejectionReason, Verdict};
pub use schema::{extract, Column, ForeignKey, RawTableMetadata, Schema, SchemaExtraction, Table};
