//! `PostgreSQL` Database Engine Implementation
//!
//! This module implements [`MetadataSource`] and [`QueryExecutor`] for
//! `PostgreSQL` databases.
//!
//! # Features
//! - Client-server connections via TCP
//! - Metadata via `information_schema`, CHECK constraints via `pg_constraint`
//! - Safety-gated query execution with typed parameter binding
//! - Rich type system support (JSON/JSONB, timestamps, UUID, etc.)
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - One client per source; the connection task is spawned on connect
//! - JSON/JSONB preserved as nested JSON
//! - BYTEA data is Base64-encoded for JSON safety
//! - Timeouts enforced via `tokio::time::timeout`
//! - Row limits enforced in application code
//! - Metadata is read from one schema (`config.schema` or `current_schema()`)

use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::engine::{
    Capabilities, ConnectionConfig, ConnectionInfo, DatabaseType, MetadataSource, QueryExecutor,
    QueryResult,
};
use crate::error::{AlveoloError, Result};
use crate::safety;
use crate::schema::{CheckConstraint, Column, RawForeignKey};

type Param = Box<dyn ToSql + Sync + Send>;

/// `PostgreSQL` metadata source and query executor
pub struct PostgresSource {
    client: Client,
    schema: String,
}

impl PostgresSource {
    /// Connect and resolve the schema to introspect
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        if config.engine != DatabaseType::Postgres {
            return Err(AlveoloError::invalid_input(format!(
                "Expected PostgreSQL engine, got {}",
                config.engine
            )));
        }

        let pg_config = build_pg_config(config)?;

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            AlveoloError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        // Connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let schema = match &config.schema {
            Some(schema) => schema.clone(),
            None => {
                let row = client.query_one("SELECT current_schema()", &[]).await.map_err(|e| {
                    AlveoloError::engine_error(
                        "postgres",
                        format!("Failed to query current schema: {e}"),
                    )
                })?;
                row.get(0)
            }
        };

        tracing::debug!(schema = %schema, "connected to postgres");
        Ok(Self { client, schema })
    }

    /// Schema whose tables are introspected
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Server version, database and user
    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        let row = self
            .client
            .query_one("SELECT version(), current_database(), current_user::text", &[])
            .await
            .map_err(|e| {
                AlveoloError::connection_failed(format!("Failed to query server info: {e}"))
            })?;

        let server_info: String = row.get(0);
        // "PostgreSQL 15.3 on x86_64..." -> "15.3"
        let database_version =
            server_info.split_whitespace().nth(1).unwrap_or("unknown").to_string();

        Ok(ConnectionInfo {
            database_version,
            server_info,
            connected_database: row.get(1),
            user: row.get(2),
        })
    }

    async fn query_strings(&self, what: &str, sql: &str, table: &str) -> Result<Vec<String>> {
        let rows = self.client.query(sql, &[&self.schema, &table]).await.map_err(|e| {
            AlveoloError::engine_error(
                "postgres",
                format!("Failed to query {what} for {}.{table}: {e}", self.schema),
            )
        })?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

impl MetadataSource for PostgresSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await
            .map_err(|e| {
                AlveoloError::engine_error(
                    "postgres",
                    format!("Failed to list tables in {}: {e}", self.schema),
                )
            })?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = "
            SELECT column_name, data_type, character_maximum_length, is_nullable, column_default
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position";

        let rows = self.client.query(query, &[&self.schema, &table]).await.map_err(|e| {
            AlveoloError::engine_error(
                "postgres",
                format!("Failed to query columns for {}.{table}: {e}", self.schema),
            )
        })?;

        if rows.is_empty() {
            return Err(AlveoloError::engine_error(
                "postgres",
                format!("Table '{}.{table}' does not exist", self.schema),
            ));
        }

        Ok(rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                max_length: row.get::<_, Option<i32>>(2).map(i64::from),
                nullable: row.get::<_, String>(3) == "YES",
                default: row.get(4),
            })
            .collect())
    }

    async fn fetch_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        self.query_strings(
            "primary key",
            "SELECT kcu.column_name
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
               AND tc.table_schema = kcu.table_schema
               AND tc.table_name = kcu.table_name
             WHERE tc.constraint_type = 'PRIMARY KEY'
               AND tc.table_schema = $1
               AND tc.table_name = $2
             ORDER BY kcu.ordinal_position",
            table,
        )
        .await
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        // Constraint oids follow declaration order; conkey/confkey pair child
        // and parent columns by position so composite keys line up
        let query = "
            SELECT child.attname::text, parent_rel.relname::text, parent.attname::text
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
            JOIN pg_class parent_rel ON parent_rel.oid = con.confrelid
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
              WITH ORDINALITY AS k(child_attnum, parent_attnum, position)
            JOIN pg_attribute child
              ON child.attrelid = con.conrelid AND child.attnum = k.child_attnum
            JOIN pg_attribute parent
              ON parent.attrelid = con.confrelid AND parent.attnum = k.parent_attnum
            WHERE con.contype = 'f'
              AND nsp.nspname = $1
              AND rel.relname = $2
            ORDER BY con.oid, k.position";

        let rows = self.client.query(query, &[&self.schema, &table]).await.map_err(|e| {
            AlveoloError::engine_error(
                "postgres",
                format!("Failed to query foreign keys for {}.{table}: {e}", self.schema),
            )
        })?;

        Ok(rows
            .iter()
            .map(|row| RawForeignKey {
                column: row.get(0),
                referenced_table: row.get(1),
                referenced_column: row.get(2),
            })
            .collect())
    }

    async fn fetch_check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        let query = "
            SELECT con.conname::text, pg_get_constraintdef(con.oid)
            FROM pg_constraint con
            JOIN pg_class rel ON rel.oid = con.conrelid
            JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
            WHERE con.contype = 'c'
              AND nsp.nspname = $1
              AND rel.relname = $2
            ORDER BY con.conname";

        let rows = self.client.query(query, &[&self.schema, &table]).await.map_err(|e| {
            AlveoloError::engine_error(
                "postgres",
                format!("Failed to query check constraints for {}.{table}: {e}", self.schema),
            )
        })?;

        Ok(rows
            .iter()
            .map(|row| {
                let definition: String = row.get(1);
                CheckConstraint::new(row.get::<_, String>(0), check_expression(&definition))
            })
            .collect())
    }

    async fn fetch_unique_columns(&self, table: &str) -> Result<Vec<String>> {
        self.query_strings(
            "unique constraints",
            "SELECT kcu.column_name
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
               AND tc.table_schema = kcu.table_schema
               AND tc.table_name = kcu.table_name
             WHERE tc.constraint_type = 'UNIQUE'
               AND tc.table_schema = $1
               AND tc.table_name = $2
             ORDER BY tc.constraint_name, kcu.ordinal_position",
            table,
        )
        .await
    }
}

impl QueryExecutor for PostgresSource {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        caps: &Capabilities,
    ) -> Result<QueryResult> {
        let sql = safety::validate(sql, caps.allow_write).into_result()?;

        match caps.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                execute_query(&self.client, &sql, params, caps),
            )
            .await
            .map_err(|_| {
                AlveoloError::query_failed(format!("Query exceeded timeout of {timeout_ms}ms"))
            })?,
            None => execute_query(&self.client, &sql, params, caps).await,
        }
    }
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| AlveoloError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| AlveoloError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| AlveoloError::invalid_input("PostgreSQL requires 'database' parameter"))?;

    let mut pg_config = Config::new();
    pg_config.host(host).port(config.port.unwrap_or(5432)).user(user).dbname(database);

    // Trust/peer authentication needs no password
    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    Ok(pg_config)
}

/// Strip `CHECK (...)` and `NOT VALID` from `pg_get_constraintdef` output
fn check_expression(definition: &str) -> String {
    let body = definition.trim();
    let body = body.strip_suffix("NOT VALID").map_or(body, str::trim_end);
    let body = body.strip_prefix("CHECK").map_or(body, str::trim_start);
    body.strip_prefix('(')
        .and_then(|b| b.strip_suffix(')'))
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Bind a JSON value to a parameter of the prepared statement's type
fn json_to_param(value: &serde_json::Value, ty: &Type) -> Result<Param> {
    use serde_json::Value as Json;

    let mismatch = || {
        AlveoloError::invalid_input(format!(
            "Cannot bind {value} to a parameter of type {}",
            ty.name()
        ))
    };
    let int = || match value {
        Json::Null => Ok(None),
        Json::Number(n) => n.as_i64().map(Some).ok_or_else(mismatch),
        _ => Err(mismatch()),
    };
    let float = || match value {
        Json::Null => Ok(None),
        Json::Number(n) => n.as_f64().map(Some).ok_or_else(mismatch),
        _ => Err(mismatch()),
    };

    let param: Param = match *ty {
        Type::BOOL => Box::new(match value {
            Json::Null => None,
            Json::Bool(b) => Some(*b),
            _ => return Err(mismatch()),
        }),
        Type::INT2 => {
            Box::new(int()?.map(i16::try_from).transpose().map_err(|_| mismatch())?)
        }
        Type::INT4 => {
            Box::new(int()?.map(i32::try_from).transpose().map_err(|_| mismatch())?)
        }
        Type::INT8 => Box::new(int()?),
        #[allow(clippy::cast_possible_truncation)]
        Type::FLOAT4 => Box::new(float()?.map(|f| f as f32)),
        Type::FLOAT8 => Box::new(float()?),
        Type::JSON | Type::JSONB => {
            Box::new(if value.is_null() { None } else { Some(value.clone()) })
        }
        _ => Box::new(match value {
            Json::Null => None,
            Json::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }),
    };
    Ok(param)
}

/// Execute query and return `QueryResult`
async fn execute_query(
    client: &Client,
    query: &str,
    params: &[serde_json::Value],
    caps: &Capabilities,
) -> Result<QueryResult> {
    let stmt = client
        .prepare(query)
        .await
        .map_err(|e| AlveoloError::query_failed(format!("Failed to prepare query: {e}")))?;

    if stmt.params().len() != params.len() {
        return Err(AlveoloError::invalid_input(format!(
            "Query expects {} parameters, got {}",
            stmt.params().len(),
            params.len()
        )));
    }
    let bound = params
        .iter()
        .zip(stmt.params())
        .map(|(value, ty)| json_to_param(value, ty))
        .collect::<Result<Vec<Param>>>()?;
    let refs: Vec<&(dyn ToSql + Sync)> =
        bound.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect();

    // Statements without a result set (INSERT, UPDATE, ...)
    if stmt.columns().is_empty() {
        let rows_affected = client
            .execute(&stmt, &refs)
            .await
            .map_err(|e| AlveoloError::query_failed(format!("Failed to execute query: {e}")))?;

        return Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        });
    }

    let rows = client
        .query(&stmt, &refs)
        .await
        .map_err(|e| AlveoloError::query_failed(format!("Failed to execute query: {e}")))?;

    let column_names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    let limit = caps.max_rows.unwrap_or(usize::MAX);
    let rows_data = rows
        .iter()
        .take(limit)
        .map(|row| row_to_json(column_names.len(), row))
        .collect::<Result<Vec<_>>>()?;

    Ok(QueryResult { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a `PostgreSQL` row to a JSON-safe `Vec`
fn row_to_json(column_count: usize, row: &Row) -> Result<Vec<serde_json::Value>> {
    (0..column_count).map(|idx| postgres_value_to_json(row, idx)).collect()
}

fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    what: &str,
) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| AlveoloError::query_failed(format!("Failed to get {what} value: {e}")))
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde_json::Value as Json;

    let col_type = row.columns()[idx].type_();

    let number = |n: Option<serde_json::Number>| n.map_or(Json::Null, Json::Number);
    let string = |s: Option<String>| s.map_or(Json::Null, Json::String);

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx, "boolean")?.map_or(Json::Null, Json::Bool),
        Type::INT2 => number(get::<i16>(row, idx, "i16")?.map(Into::into)),
        Type::INT4 => number(get::<i32>(row, idx, "i32")?.map(Into::into)),
        Type::INT8 => number(get::<i64>(row, idx, "i64")?.map(Into::into)),
        // NaN/Infinity become null
        Type::FLOAT4 => number(
            get::<f32>(row, idx, "f32")?.and_then(|v| serde_json::Number::from_f64(f64::from(v))),
        ),
        Type::FLOAT8 => number(get::<f64>(row, idx, "f64")?.and_then(serde_json::Number::from_f64)),
        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            string(get::<String>(row, idx, "string")?)
        }
        Type::JSON | Type::JSONB => get::<Json>(row, idx, "JSON")?.unwrap_or(Json::Null),
        Type::BYTEA => {
            use base64::Engine;
            string(
                get::<Vec<u8>>(row, idx, "bytea")?
                    .map(|v| base64::engine::general_purpose::STANDARD.encode(v)),
            )
        }
        Type::TIMESTAMP => string(
            get::<NaiveDateTime>(row, idx, "timestamp")?
                .map(|v| v.format("%Y-%m-%dT%H:%M:%S").to_string()),
        ),
        Type::TIMESTAMPTZ => {
            string(get::<DateTime<Utc>>(row, idx, "timestamptz")?.map(|v| v.to_rfc3339()))
        }
        Type::DATE => {
            string(get::<NaiveDate>(row, idx, "date")?.map(|v| v.format("%Y-%m-%d").to_string()))
        }
        Type::TIME => {
            string(get::<NaiveTime>(row, idx, "time")?.map(|v| v.format("%H:%M:%S").to_string()))
        }
        Type::UUID => string(get::<uuid::Uuid>(row, idx, "UUID")?.map(|v| v.to_string())),
        // NUMERIC and anything else must be cast to text in the query
        _ => string(row.try_get::<_, Option<String>>(idx).map_err(|e| {
            AlveoloError::query_failed(format!(
                "Failed to convert PostgreSQL type '{}' to JSON (cast it to text): {e}",
                col_type.name()
            ))
        })?),
    };

    Ok(value)
}
