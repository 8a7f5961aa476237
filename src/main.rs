//! Alveolo CLI Entry Point
//!
//! Subcommands:
//! - `connect` - Validate and save a named database connection
//! - `connections` - List saved connections
//! - `introspect` - Extract the schema and print it as a snapshot
//! - `discover` - Infer business rules, table descriptions and the system prompt
//! - `check` - Test a candidate value against the rules of one column
//! - `validate` - Run the SQL safety gate only
//! - `query` - Validate, then execute SQL against the database
//!
//! All output to stdout is one JSON envelope. Logs go to stderr and are
//! filtered with `ALVEOLO_LOG` (default `warn`).

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use alveolo::config::{self, ConfigLocation, StoredConnection};
use alveolo::engine::snapshot::{SchemaSnapshot, SnapshotSource};
use alveolo::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use alveolo::classifier::schema_summary;
use alveolo::records::{self, ConfigRecord, RecordContext};
use alveolo::schema::SchemaExtraction;
use alveolo::{
    schema, AlveoloError, BusinessRule, Capabilities, ConnectionConfig, Database, DatabaseType,
    InferenceEngine, QueryExecutor, Result, Verdict,
};

/// Alveolo - schema-driven business rule discovery and SQL safety gate
#[derive(Parser)]
#[command(name = "alveolo")]
#[command(about = "Infer business rules from a database schema and screen SQL before execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a database connection and save it under a name
    Connect {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Environment variable holding the password (stored instead of the password)
        #[arg(long)]
        password_env: Option<String>,

        /// Never allow writes on this connection
        #[arg(long)]
        readonly: bool,

        /// Save to the per-user config instead of `.alveolo/config.json`
        #[arg(long)]
        global: bool,
    },

    /// List saved connections (passwords omitted)
    Connections,

    /// Extract the schema and print it as a snapshot
    Introspect {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Also write the snapshot to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Infer business rules, table descriptions and the system prompt
    Discover {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Read the schema from a snapshot file instead of a database
        #[arg(long, conflicts_with = "engine")]
        snapshot: Option<PathBuf>,

        /// Include the configuration records to persist
        #[arg(long)]
        records: bool,

        /// Also write a Markdown summary of the schema to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Test a candidate value against the rules inferred for one column
    Check {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Read the schema from a snapshot file instead of a database
        #[arg(long, conflicts_with_all = ["engine", "records"])]
        snapshot: Option<PathBuf>,

        /// Read the rules from saved records (the `records` array of `discover --records`)
        #[arg(long, conflicts_with = "engine")]
        records: Option<PathBuf>,

        #[arg(long)]
        table: String,

        #[arg(long)]
        column: String,

        /// Candidate value; omit it to check SQL NULL
        #[arg(long, allow_hyphen_values = true)]
        value: Option<String>,
    },

    /// Run the SQL safety gate without touching a database
    Validate {
        /// SQL text to check
        #[arg(long, allow_hyphen_values = true)]
        sql: String,

        /// Permit statements other than SELECT
        #[arg(long)]
        allow_write: bool,
    },

    /// Validate, then execute SQL
    Query {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// SQL text to execute
        #[arg(long, allow_hyphen_values = true)]
        sql: String,

        /// Positional parameters as a JSON array (e.g. '[1, "Ana"]')
        #[arg(long)]
        params: Option<String>,

        /// Permit statements other than SELECT (ignored on readonly connections)
        #[arg(long)]
        allow_write: bool,

        /// Maximum number of rows to return
        #[arg(long)]
        max_rows: Option<usize>,

        /// Query timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// Either a saved connection name or explicit connection parameters
#[derive(Args)]
struct ConnectionArgs {
    /// Saved connection name (default connection when omitted)
    #[arg(long)]
    name: Option<String>,

    /// Database engine (postgres, sqlite); switches to explicit parameters
    #[arg(long)]
    engine: Option<DatabaseType>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    database: Option<String>,

    /// Schema to introspect (postgres)
    #[arg(long)]
    schema: Option<String>,

    /// Database file (sqlite)
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Explicit parameters, if an engine was given
    fn explicit(&self) -> Option<ConnectionConfig> {
        self.engine.map(|engine| ConnectionConfig {
            engine,
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            file: self.file.clone(),
        })
    }

    /// Connection config and readonly flag
    fn resolve(&self) -> Result<(ConnectionConfig, bool)> {
        match self.explicit() {
            Some(config) => Ok((config, false)),
            None => config::resolve_connection(self.name.as_deref()),
        }
    }
}

/// Data and metadata of a successful command
struct Outcome {
    data: serde_json::Value,
    meta: Metadata,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn connect(
    args: &ConnectionArgs,
    password_env: Option<String>,
    readonly: bool,
    global: bool,
    engine: &mut String,
) -> Result<Outcome> {
    let start = Instant::now();
    let mut config = args.explicit().ok_or_else(|| {
        AlveoloError::invalid_input("connect requires --engine and its connection parameters")
    })?;
    *engine = config.engine.to_string();

    if let Some(var) = &password_env {
        let password = std::env::var(var).map_err(|_| {
            AlveoloError::config_error(format!("Environment variable {var} not found for password"))
        })?;
        config.password = Some(password);
    }

    let info = Database::connect(&config).await?.connection_info().await?;

    if password_env.is_some() {
        config.password = None;
    } else if config.password.is_some() {
        tracing::warn!("storing password in plain text, prefer --password-env");
    }

    let name = args.name.clone().unwrap_or_else(|| "default".to_string());
    let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
    let stored = StoredConnection { config, password_env, readonly };
    let path = config::save_connection(&name, stored, location)?;

    Ok(Outcome {
        data: json!({ "name": name, "path": path, "connection": info }),
        meta: Metadata::new(elapsed_ms(start)),
    })
}

fn connections() -> Result<Outcome> {
    let start = Instant::now();
    let connections: Vec<serde_json::Value> = config::list_connections()?
        .into_iter()
        .map(|(name, config)| {
            let config = ConnectionConfig { password: None, ..config };
            json!({ "name": name, "connection": config })
        })
        .collect();

    Ok(Outcome {
        data: json!({ "connections": connections }),
        meta: Metadata::new(elapsed_ms(start)),
    })
}

async fn introspect(
    args: &ConnectionArgs,
    out: Option<PathBuf>,
    engine: &mut String,
) -> Result<Outcome> {
    let start = Instant::now();
    let (config, _) = args.resolve()?;
    *engine = config.engine.to_string();

    let db = Database::connect(&config).await?;
    let extraction = schema::extract(&db).await?;
    let snapshot = SchemaSnapshot::from_schema(&extraction.schema);

    if let Some(path) = &out {
        let contents = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            AlveoloError::invalid_input(format!("Could not serialize snapshot: {e}"))
        })?;
        write_file(path, &contents, "snapshot")?;
    }

    Ok(Outcome {
        data: json!({ "tables": snapshot.tables, "failures": extraction.failures }),
        meta: Metadata::with_tables(elapsed_ms(start), extraction.schema.len()),
    })
}

/// Extract from a snapshot file or the resolved connection
///
/// Returns the engine the schema came from, `None` for snapshots.
async fn extract_schema(
    args: &ConnectionArgs,
    snapshot: Option<&Path>,
    engine: &mut String,
) -> Result<(SchemaExtraction, Option<DatabaseType>)> {
    match snapshot {
        Some(path) => {
            *engine = "snapshot".to_string();
            Ok((schema::extract(&SnapshotSource::from_file(path)?).await?, None))
        }
        None => {
            let (config, _) = args.resolve()?;
            *engine = config.engine.to_string();
            let db = Database::connect(&config).await?;
            Ok((schema::extract(&db).await?, Some(config.engine)))
        }
    }
}

fn write_file(path: &Path, contents: &str, what: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| {
        AlveoloError::invalid_input(format!("Could not write {what} {}: {e}", path.display()))
    })
}

async fn discover(
    args: &ConnectionArgs,
    snapshot: Option<PathBuf>,
    with_records: bool,
    summary: Option<PathBuf>,
    engine: &mut String,
) -> Result<Outcome> {
    let start = Instant::now();
    let settings = config::load_with_precedence()?.discovery_settings();
    let inference = InferenceEngine::new(settings.clone());

    let (extraction, dialect) = extract_schema(args, snapshot.as_deref(), engine).await?;
    let discovery = inference.run(&extraction);

    if let Some(path) = &summary {
        write_file(path, &schema_summary(&extraction.schema), "summary")?;
        tracing::info!(path = %path.display(), "wrote schema summary");
    }

    let records = if with_records {
        let ctx = RecordContext::now(&settings.schema_version, &settings.language);
        Some(records::config_records(&discovery, &ctx)?)
    } else {
        None
    };

    // Conversion SQL needs a dialect, so snapshots get none
    let conversions: serde_json::Map<String, serde_json::Value> = dialect
        .map(|dialect| {
            discovery
                .mappings
                .iter()
                .filter_map(|m| {
                    let sql = m.conversion_sql(dialect)?;
                    Some((format!("{}.{}", m.table, m.column), json!(sql)))
                })
                .collect()
        })
        .unwrap_or_default();

    let analyzed = discovery.tables_analyzed;
    let rule_counts: serde_json::Map<String, serde_json::Value> = discovery
        .rule_counts()
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), json!(count)))
        .collect();

    Ok(Outcome {
        data: json!({
            "complete": discovery.is_complete(),
            "rule_counts": rule_counts,
            "conversions": conversions,
            "discovery": discovery,
            "records": records,
        }),
        meta: Metadata::with_tables(elapsed_ms(start), analyzed),
    })
}

fn read_records(path: &Path) -> Result<Vec<BusinessRule>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AlveoloError::invalid_input(format!("Could not read records {}: {e}", path.display()))
    })?;
    let records: Vec<ConfigRecord> = serde_json::from_str(&text).map_err(|e| {
        AlveoloError::invalid_input(format!("Invalid records file {}: {e}", path.display()))
    })?;
    records::decode_rules(&records)
}

async fn check(
    args: &ConnectionArgs,
    snapshot: Option<PathBuf>,
    records_path: Option<PathBuf>,
    target: (&str, &str),
    value: Option<&str>,
    engine: &mut String,
) -> Result<Outcome> {
    let start = Instant::now();
    let (table, column) = target;

    let rules = match &records_path {
        Some(path) => {
            *engine = "records".to_string();
            read_records(path)?
        }
        None => {
            let settings = config::load_with_precedence()?.discovery_settings();
            let (extraction, _) = extract_schema(args, snapshot.as_deref(), engine).await?;
            InferenceEngine::new(settings).run(&extraction).rules
        }
    };

    let checks: Vec<serde_json::Value> = rules
        .iter()
        .filter(|rule| rule.table == table && rule.column.as_deref() == Some(column))
        .map(|rule| {
            json!({
                "kind": rule.kind,
                "predicate": rule.predicate,
                "message": rule.message,
                "passed": rule.check_value(value),
            })
        })
        .collect();

    // Undecidable rules (passed = null) do not fail the value
    let valid = checks.iter().all(|c| c["passed"] != json!(false));
    tracing::debug!(table, column, rules = checks.len(), valid, "checked value");

    Ok(Outcome {
        data: json!({
            "table": table,
            "column": column,
            "value": value,
            "valid": valid,
            "checks": checks,
        }),
        meta: Metadata::new(elapsed_ms(start)),
    })
}

fn validate(sql: &str, allow_write: bool) -> Result<Outcome> {
    let start = Instant::now();
    match alveolo::validate(sql, allow_write) {
        Verdict::Accepted { sql } => Ok(Outcome {
            data: json!({ "verdict": "accepted", "sql": sql }),
            meta: Metadata::new(elapsed_ms(start)),
        }),
        Verdict::Rejected(rejection) => Err(rejection.into()),
    }
}

async fn query(
    args: &ConnectionArgs,
    sql: &str,
    params: Option<&str>,
    caps: Capabilities,
    engine: &mut String,
) -> Result<Outcome> {
    let start = Instant::now();
    let (config, readonly) = args.resolve()?;
    *engine = config.engine.to_string();

    let caps = if readonly && caps.allow_write {
        tracing::warn!("connection is readonly, ignoring --allow-write");
        Capabilities { allow_write: false, ..caps }
    } else {
        caps
    };

    let params: Vec<serde_json::Value> = match params {
        Some(text) => serde_json::from_str(text).map_err(|e| {
            AlveoloError::invalid_input(format!("--params must be a JSON array: {e}"))
        })?,
        None => Vec::new(),
    };

    // Rejected text never opens a connection
    let sql = alveolo::validate(sql, caps.allow_write).into_result()?;

    let db = Database::connect(&config).await?;
    let result = db.execute(&sql, &params, &caps).await?;
    let rows = result.rows.len();

    Ok(Outcome { data: json!(result), meta: Metadata::with_rows(elapsed_ms(start), rows) })
}

async fn dispatch(command: Commands, engine: &mut String) -> (&'static str, Result<Outcome>) {
    match command {
        Commands::Connect { connection, password_env, readonly, global } => {
            ("connect", connect(&connection, password_env, readonly, global, engine).await)
        }
        Commands::Connections => ("connections", connections()),
        Commands::Introspect { connection, out } => {
            ("introspect", introspect(&connection, out, engine).await)
        }
        Commands::Discover { connection, snapshot, records, summary } => {
            ("discover", discover(&connection, snapshot, records, summary, engine).await)
        }
        Commands::Check { connection, snapshot, records, table, column, value } => {
            let target = (table.as_str(), column.as_str());
            ("check", check(&connection, snapshot, records, target, value.as_deref(), engine).await)
        }
        Commands::Validate { sql, allow_write } => ("validate", validate(&sql, allow_write)),
        Commands::Query { connection, sql, params, allow_write, max_rows, timeout_ms } => {
            let caps = Capabilities { allow_write, max_rows, timeout_ms };
            ("query", query(&connection, &sql, params.as_deref(), caps, engine).await)
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("ALVEOLO_LOG").or_else(|_| EnvFilter::try_new("warn"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("warning: logging disabled: {e:#}");
    }

    let cli = Cli::parse();
    let mut engine = String::new();
    let (command, result) = dispatch(cli.command, &mut engine).await;

    match result {
        Ok(outcome) => {
            print_json(&SuccessEnvelope::new(engine, command, outcome.data, outcome.meta));
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(code = err.error_code(), "command failed");
            print_json(&ErrorEnvelope::from_error(engine, command, &err));
            ExitCode::FAILURE
        }
    }
}
