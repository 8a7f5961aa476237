//! `SQLite` Database Engine Implementation
//!
//! This module implements [`MetadataSource`] and [`QueryExecutor`] for `SQLite`
//! databases.
//!
//! # Features
//! - File-based connections (`/path/to/clinica.db`)
//! - In-memory connections (`:memory:`)
//! - Metadata via the `pragma_*` table-valued functions
//! - CHECK constraints recovered from the `CREATE TABLE` text in `sqlite_master`
//! - Safety-gated query execution with bound parameters
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver). The connection sits behind a mutex
//!   and no lock is held across an `.await`.
//! - BLOB data is Base64-encoded for JSON safety
//! - Timeouts enforced via `busy_timeout`
//! - Row limits enforced in application code
//! - Character lengths parsed from declared types such as `VARCHAR(100)`

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, Row};
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{
    Capabilities, ConnectionConfig, ConnectionInfo, DatabaseType, MetadataSource, QueryExecutor,
    QueryResult,
};
use crate::error::{AlveoloError, Result};
use crate::safety;
use crate::schema::{CheckConstraint, Column, RawForeignKey};

lazy_static! {
    static ref LENGTH_RE: Regex = Regex::new(r"\(\s*(\d+)\s*\)").expect("length pattern is valid");
    static ref CONSTRAINT_NAME_RE: Regex =
        Regex::new(r#"(?i)\bCONSTRAINT\s+("[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)\s*$"#)
            .expect("constraint name pattern is valid");
}

/// `SQLite` metadata source and query executor
pub struct SqliteSource {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteSource {
    /// Open the database file named in `config`
    ///
    /// The file must exist; it is never created.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        if config.engine != DatabaseType::SQLite {
            return Err(AlveoloError::invalid_input(format!(
                "Expected SQLite engine, got {}",
                config.engine
            )));
        }

        let file_path = config
            .file
            .as_ref()
            .ok_or_else(|| AlveoloError::invalid_input("SQLite requires 'file' parameter"))?;
        let path_str = file_path.to_str().ok_or_else(|| {
            AlveoloError::invalid_input("SQLite file path contains invalid UTF-8 characters")
        })?;

        let conn = Connection::open_with_flags(path_str, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| {
                AlveoloError::connection_failed(format!("Failed to open SQLite database: {e}"))
            })?;

        let label = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path_str)
            .to_string();

        tracing::debug!(database = %label, "opened sqlite database");
        Ok(Self { conn: Mutex::new(conn), label })
    }

    /// Wrap an already open connection
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn), label: ":memory:".to_string() }
    }

    /// Library version and database name
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        let version: String = self.with_conn(|conn| {
            conn.query_row("SELECT sqlite_version()", [], |row| row.get(0)).map_err(|e| {
                AlveoloError::connection_failed(format!("Failed to query SQLite version: {e}"))
            })
        })?;

        Ok(ConnectionInfo {
            server_info: format!("SQLite {version}"),
            database_version: version,
            connected_database: self.label.clone(),
            user: "N/A".to_string(),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AlveoloError::engine_error("sqlite", "connection lock poisoned"))?;
        f(&conn)
    }
}

impl MetadataSource for SqliteSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            query_strings(
                conn,
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
                [],
            )
            .map_err(|e| {
                AlveoloError::engine_error("sqlite", format!("Failed to list tables: {e}"))
            })
        })
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"SELECT name, type, "notnull", dflt_value
                       FROM pragma_table_info(?1)
                       ORDER BY cid"#,
                )
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to prepare table_info for {table}: {e}"),
                    )
                })?;

            let columns = stmt
                .query_map([table], |row| {
                    let data_type: String = row.get(1)?;
                    Ok(Column {
                        name: row.get(0)?,
                        max_length: declared_length(&data_type),
                        data_type,
                        // notnull column: 0 = nullable, 1 = not null
                        nullable: row.get::<_, i32>(2)? == 0,
                        default: row.get(3)?,
                    })
                })
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<Column>>>())
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to query columns for {table}: {e}"),
                    )
                })?;

            if columns.is_empty() {
                return Err(AlveoloError::engine_error(
                    "sqlite",
                    format!("Table '{table}' does not exist"),
                ));
            }
            Ok(columns)
        })
    }

    async fn fetch_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| primary_keys(conn, table))
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    // ids count from the last declared key, so DESC is declaration order
                    r#"SELECT "from", "table", "to", seq
                       FROM pragma_foreign_key_list(?1)
                       ORDER BY id DESC, seq"#,
                )
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to prepare foreign_key_list for {table}: {e}"),
                    )
                })?;

            let rows = stmt
                .query_map([table], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, usize>(3)?,
                    ))
                })
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to query foreign keys for {table}: {e}"),
                    )
                })?;

            rows.into_iter()
                .map(|(column, referenced_table, to, seq)| -> Result<RawForeignKey> {
                    // `REFERENCES parent` without a column list targets the parent's primary key
                    let referenced_column = match to {
                        Some(to) => to,
                        None => primary_keys(conn, &referenced_table)?
                            .into_iter()
                            .nth(seq)
                            .unwrap_or_default(),
                    };
                    Ok(RawForeignKey { column, referenced_table, referenced_column })
                })
                .collect()
        })
    }

    async fn fetch_check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        self.with_conn(|conn| {
            let ddl: Option<String> = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to read DDL for {table}: {e}"),
                    )
                })?;

            Ok(ddl.map(|ddl| parse_check_constraints(table, &ddl)).unwrap_or_default())
        })
    }

    async fn fetch_unique_columns(&self, table: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            // origin 'u' = UNIQUE constraint (not CREATE INDEX, not the primary key)
            let indexes = query_strings(
                conn,
                r#"SELECT name FROM pragma_index_list(?1)
                   WHERE "unique" = 1 AND origin = 'u'
                   ORDER BY name"#,
                [table],
            )
            .map_err(|e| {
                AlveoloError::engine_error(
                    "sqlite",
                    format!("Failed to query indexes for {table}: {e}"),
                )
            })?;

            let mut columns = Vec::new();
            for index in indexes {
                let index_columns = query_strings(
                    conn,
                    "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
                    [index.as_str()],
                )
                .map_err(|e| {
                    AlveoloError::engine_error(
                        "sqlite",
                        format!("Failed to query index columns for {index}: {e}"),
                    )
                })?;
                columns.extend(index_columns);
            }
            Ok(columns)
        })
    }
}

impl QueryExecutor for SqliteSource {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        caps: &Capabilities,
    ) -> Result<QueryResult> {
        let sql = safety::validate(sql, caps.allow_write).into_result()?;

        self.with_conn(|conn| {
            if let Some(timeout_ms) = caps.timeout_ms {
                conn.busy_timeout(Duration::from_millis(timeout_ms)).map_err(|e| {
                    AlveoloError::engine_error("sqlite", format!("Failed to set timeout: {e}"))
                })?;
            }
            execute_query(conn, &sql, params, caps)
        })
    }
}

fn query_strings<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn primary_keys(conn: &Connection, table: &str) -> Result<Vec<String>> {
    // pk column: position within the primary key, 0 when not part of it
    query_strings(
        conn,
        "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
        [table],
    )
    .map_err(|e| {
        AlveoloError::engine_error(
            "sqlite",
            format!("Failed to query primary keys for {table}: {e}"),
        )
    })
}

/// Length of a character type such as `VARCHAR(100)` or `NCHAR(9)`
fn declared_length(data_type: &str) -> Option<i64> {
    let upper = data_type.to_ascii_uppercase();
    if !(upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB")) {
        return None;
    }
    LENGTH_RE.captures(data_type).and_then(|caps| caps[1].parse().ok())
}

/// Extract CHECK constraints from a `CREATE TABLE` statement
///
/// Column and table constraints are both picked up, in source order. Unnamed
/// checks are called `{table}_check_{n}`, counting from 1.
fn parse_check_constraints(table: &str, ddl: &str) -> Vec<CheckConstraint> {
    let bytes = ddl.as_bytes();
    let mut checks = Vec::new();
    let mut anonymous = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'[' => quote = Some(b']'),
            _ if keyword_at(bytes, i, b"CHECK") => {
                let mut open = i + 5;
                while open < bytes.len() && bytes[open].is_ascii_whitespace() {
                    open += 1;
                }
                let close = bytes
                    .get(open)
                    .filter(|&&c| c == b'(')
                    .and_then(|_| matching_paren(bytes, open));
                if let Some(close) = close {
                    let name = constraint_name_before(&ddl[..i]).unwrap_or_else(|| {
                        anonymous += 1;
                        format!("{table}_check_{anonymous}")
                    });
                    checks.push(CheckConstraint::new(name, ddl[open + 1..close].trim()));
                    i = close + 1;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    checks
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn keyword_at(bytes: &[u8], at: usize, keyword: &[u8]) -> bool {
    let end = at + keyword.len();
    end <= bytes.len()
        && bytes[at..end].eq_ignore_ascii_case(keyword)
        && (at == 0 || !is_ident_byte(bytes[at - 1]))
        && (end == bytes.len() || !is_ident_byte(bytes[end]))
}

/// Index of the parenthesis closing the one at `open`, skipping quoted text
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'[' => quote = Some(b']'),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn constraint_name_before(prefix: &str) -> Option<String> {
    CONSTRAINT_NAME_RE.captures(prefix).map(|caps| {
        caps[1].trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_string()
    })
}

/// Execute query and return `QueryResult`
fn execute_query(
    conn: &Connection,
    query: &str,
    params: &[serde_json::Value],
    caps: &Capabilities,
) -> Result<QueryResult> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| AlveoloError::query_failed(format!("Failed to prepare query: {e}")))?;

    let expected = stmt.parameter_count();
    if expected != params.len() {
        return Err(AlveoloError::invalid_input(format!(
            "Query expects {expected} parameters, got {}",
            params.len()
        )));
    }
    let bound: Vec<SqlValue> = params.iter().map(json_to_sqlite).collect();
    let bound = rusqlite::params_from_iter(bound);

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    // Statements without a result set (INSERT, UPDATE, ...)
    if column_names.is_empty() {
        stmt.execute(bound)
            .map_err(|e| AlveoloError::query_failed(format!("Failed to execute query: {e}")))?;
        return Ok(QueryResult {
            columns: column_names,
            rows: Vec::new(),
            rows_affected: Some(conn.changes()),
        });
    }

    let mut rows = stmt
        .query(bound)
        .map_err(|e| AlveoloError::query_failed(format!("Failed to execute query: {e}")))?;

    let mut rows_data = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| AlveoloError::query_failed(format!("Failed to fetch row: {e}")))?
    {
        if caps.max_rows.is_some_and(|max_rows| rows_data.len() >= max_rows) {
            break;
        }
        let values = row_to_json(column_names.len(), row)
            .map_err(|e| AlveoloError::query_failed(format!("Failed to fetch row: {e}")))?;
        rows_data.push(values);
    }

    Ok(QueryResult { columns: column_names, rows: rows_data, rows_affected: None })
}

fn json_to_sqlite(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        // Nested JSON is stored as its text
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(
    column_count: usize,
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..column_count).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
