//! Database Collaborators and Core Types
//!
//! This module defines the two seams between the reasoning core and a database:
//! - [`MetadataSource`]: raw schema metadata, fetched table by table
//! - [`QueryExecutor`]: execution of SQL that already passed the safety gate
//!
//! Each engine (`PostgreSQL`, `SQLite`) implements both traits. A JSON schema
//! snapshot ([`snapshot::SnapshotSource`]) implements [`MetadataSource`] for
//! offline discovery.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! No shared SQL helpers or cross-engine abstractions.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;

use crate::error::{AlveoloError, Result};
use crate::schema::{CheckConstraint, Column, RawForeignKey, RawTableMetadata};

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod snapshot;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = AlveoloError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::SQLite),
            other => Err(AlveoloError::invalid_input(format!("Unsupported engine '{other}'"))),
        }
    }
}

/// Connection configuration for database engines
///
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine type
    pub engine: DatabaseType,

    /// Hostname (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (for postgres)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Schema to introspect (for postgres, defaults to `current_schema()`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Database file path (for sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            schema: None,
            file: None,
        }
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            schema: None,
            file: Some(file),
        }
    }
}

/// Connection metadata returned by `connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Database version (e.g., "15.3", "3.45.1")
    pub database_version: String,

    /// Server information string
    pub server_info: String,

    /// Connected database name (file name for `SQLite`)
    pub connected_database: String,

    /// Connected user ("N/A" for `SQLite`)
    pub user: String,
}

/// Execution limits for one query
///
/// Defaults are the most restrictive settings (read-only, no limits).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Allow statements other than `SELECT`
    /// Default: false (read-only)
    #[serde(default)]
    pub allow_write: bool,

    /// Maximum number of rows to return (enforced by engine)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,

    /// Query timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Capabilities {
    /// Create read-only capabilities (default)
    #[must_use]
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Create write-enabled capabilities
    #[must_use]
    pub fn with_write() -> Self {
        Self { allow_write: true, ..Default::default() }
    }
}

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows, values in column order
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows affected (for write statements)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

/// Source of raw schema metadata
///
/// Every fetch may fail on its own. [`crate::schema::extract`] isolates those
/// failures per table.
pub trait MetadataSource {
    /// Names of all base tables, in the order they should be analyzed
    fn list_tables(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Columns of a table, in ordinal order
    fn fetch_columns(&self, table: &str) -> impl Future<Output = Result<Vec<Column>>> + Send;

    /// Primary key column names
    fn fetch_primary_keys(&self, table: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Foreign keys, one entry per column pair
    fn fetch_foreign_keys(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<RawForeignKey>>> + Send;

    /// CHECK constraints with their raw expressions
    fn fetch_check_constraints(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<CheckConstraint>>> + Send;

    /// Columns covered by UNIQUE constraints
    fn fetch_unique_columns(&self, table: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// All metadata of one table
    fn describe_table(&self, table: &str) -> impl Future<Output = Result<RawTableMetadata>> + Send
    where
        Self: Sync,
    {
        async move {
            Ok(RawTableMetadata {
                name: table.to_string(),
                columns: self.fetch_columns(table).await?,
                primary_keys: self.fetch_primary_keys(table).await?,
                foreign_keys: self.fetch_foreign_keys(table).await?,
                check_constraints: self.fetch_check_constraints(table).await?,
                unique_columns: self.fetch_unique_columns(table).await?,
            })
        }
    }
}

/// Executes SQL against a live database
///
/// Implementations MUST run the text through [`crate::safety::validate`] with
/// `caps.allow_write` before touching the database.
pub trait QueryExecutor {
    fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        caps: &Capabilities,
    ) -> impl Future<Output = Result<QueryResult>> + Send;
}

/// Any supported live database connection
pub enum Database {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteSource),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresSource),
}

impl Database {
    /// Open a connection for the configured engine
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match config.engine {
            #[cfg(feature = "sqlite")]
            DatabaseType::SQLite => Ok(Self::Sqlite(sqlite::SqliteSource::open(config)?)),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => {
                Ok(Self::Postgres(postgres::PostgresSource::connect(config).await?))
            }
            #[allow(unreachable_patterns)]
            other => Err(AlveoloError::invalid_input(format!(
                "Engine '{other}' is not enabled in this build"
            ))),
        }
    }

    /// Engine type of this connection
    #[must_use]
    pub const fn engine(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => DatabaseType::SQLite,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => DatabaseType::Postgres,
        }
    }

    /// Server version and connection details
    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.connection_info(),
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.connection_info().await,
        }
    }
}

impl MetadataSource for Database {
    async fn list_tables(&self) -> Result<Vec<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.list_tables().await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.list_tables().await,
        }
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<Column>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.fetch_columns(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.fetch_columns(table).await,
        }
    }

    async fn fetch_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.fetch_primary_keys(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.fetch_primary_keys(table).await,
        }
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.fetch_foreign_keys(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.fetch_foreign_keys(table).await,
        }
    }

    async fn fetch_check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.fetch_check_constraints(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.fetch_check_constraints(table).await,
        }
    }

    async fn fetch_unique_columns(&self, table: &str) -> Result<Vec<String>> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.fetch_unique_columns(table).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.fetch_unique_columns(table).await,
        }
    }
}

impl QueryExecutor for Database {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        caps: &Capabilities,
    ) -> Result<QueryResult> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(source) => source.execute(sql, params, caps).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(source) => source.execute(sql, params, caps).await,
        }
    }
}
