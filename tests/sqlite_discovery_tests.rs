//! `SQLite` Discovery Integration Tests
//!
//! End-to-end runs against a real `SQLite` file:
//! - Extraction through `Database::connect` and `schema::extract`
//! - Rule inference over the extracted schema
//! - Snapshot round trip (introspect, then discover offline)
//! - Column conversions evaluated by `SQLite` itself
//! - Safety-gated execution through the same connection

#![cfg(feature = "sqlite")]

use alveolo::engine::snapshot::{SchemaSnapshot, SnapshotSource};
use alveolo::schema::CheckConstraint;
use alveolo::{
    extract, Capabilities, ColumnKind, ConnectionConfig, Database, DatabaseType, InferenceEngine,
    PromptSettings, QueryExecutor, RuleKind, RulePayload,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Test Helpers
// ============================================================================

const CLINIC_DDL: &str = "
    CREATE TABLE Pacientes (
        IdPac INTEGER PRIMARY KEY,
        Nombre VARCHAR(80) NOT NULL,
        Email TEXT,
        NIF CHAR(9) UNIQUE
    );
    CREATE TABLE DCitas (
        IdCita INTEGER PRIMARY KEY,
        IdPac INTEGER NOT NULL REFERENCES Pacientes(IdPac),
        Fecha TEXT NOT NULL,
        Estado INTEGER
    );
    CREATE TABLE Presupuestos (
        IdPresu INTEGER PRIMARY KEY,
        IdPac INTEGER REFERENCES Pacientes,
        Importe REAL CONSTRAINT CK_Importe CHECK (Importe >= 0)
    );
    CREATE TABLE TColores (Id INTEGER PRIMARY KEY, Color TEXT);
    CREATE TABLE LineasAlmacen (
        IdZona INTEGER REFERENCES Zonas(Id),
        IdMarca INTEGER REFERENCES Marcas(Id)
    );
    CREATE TABLE Zonas (Id INTEGER PRIMARY KEY);
    CREATE TABLE Marcas (Id INTEGER PRIMARY KEY);
    INSERT INTO Pacientes (Nombre, Email, NIF) VALUES ('Ana', 'ana@example.com', '12345678Z');
    INSERT INTO Pacientes (Nombre, Email, NIF) VALUES ('Luis', NULL, NULL);
    INSERT INTO DCitas (IdPac, Fecha, Estado) VALUES (1, '2026-03-01 09:30:00', 1);
";

/// Create a temporary `SQLite` clinic database
fn create_clinic_db() -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let thread_id = std::thread::current().id();
    let temp_file = std::env::temp_dir().join(format!("alveolo_discovery_{thread_id:?}_{id}.db"));
    let _ = std::fs::remove_file(&temp_file);

    let conn = rusqlite::Connection::open(&temp_file).expect("Failed to create temp database");
    conn.execute_batch(CLINIC_DDL).expect("Failed to create clinic schema");

    temp_file
}

async fn connect(path: &PathBuf) -> Database {
    Database::connect(&ConnectionConfig::sqlite(path.clone())).await.expect("Failed to connect")
}

fn cleanup(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
}

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_extract_clinic_schema() {
    let path = create_clinic_db();
    let db = connect(&path).await;

    let extraction = extract(&db).await.unwrap();
    let schema = &extraction.schema;

    assert_eq!(extraction.requested, 7);
    assert!(extraction.failures.is_empty());
    let names: Vec<&str> = schema.tables().iter().map(|t| t.name()).collect();
    assert_eq!(
        names,
        vec!["DCitas", "LineasAlmacen", "Marcas", "Pacientes", "Presupuestos", "TColores", "Zonas"]
    );

    let pacientes = schema.table("Pacientes").unwrap();
    assert_eq!(pacientes.primary_keys(), ["IdPac".to_string()]);
    assert_eq!(pacientes.unique_columns(), ["NIF".to_string()]);
    assert_eq!(pacientes.column("NIF").unwrap().max_length, Some(9));

    // REFERENCES without a column list resolves to the parent's primary key
    let presupuestos = schema.table("Presupuestos").unwrap();
    assert_eq!(presupuestos.foreign_keys()[0].referenced_column, "IdPac");
    assert_eq!(
        presupuestos.check_constraints(),
        [CheckConstraint::new("CK_Importe", "Importe >= 0")]
    );

    cleanup(&path);
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discover_clinic() {
    let path = create_clinic_db();
    let db = connect(&path).await;

    let discovery = InferenceEngine::new(PromptSettings::default()).discover(&db).await.unwrap();

    assert!(discovery.is_complete());
    assert_eq!(discovery.tables_analyzed, 7);
    assert_eq!(
        discovery.descriptions["DCitas"],
        "Manages appointments and patient scheduling"
    );
    assert_eq!(
        discovery.descriptions["LineasAlmacen"],
        "Relationship table between Zonas and Marcas"
    );
    assert_eq!(
        discovery.descriptions["TColores"],
        "Catalog/configuration table for TColores"
    );
    assert_eq!(discovery.descriptions["Zonas"], "Data table: Zonas");

    let fecha: Vec<RuleKind> = discovery
        .rules
        .iter()
        .filter(|r| r.table == "DCitas" && r.column.as_deref() == Some("Fecha"))
        .map(|r| r.kind)
        .collect();
    assert_eq!(fecha, vec![RuleKind::TemporalValidation, RuleKind::RequiredField]);

    let check = discovery.rules.iter().find(|r| r.kind == RuleKind::CheckConstraint).unwrap();
    assert_eq!(check.table, "Presupuestos");
    assert_eq!(
        check.payload,
        Some(RulePayload::Expression {
            constraint_name: "CK_Importe".to_string(),
            definition: "Importe >= 0".to_string(),
        })
    );

    // TColores is a catalog, so the preview lists the other six
    assert!(discovery.system_prompt.contains("with 7 tables"));
    assert!(discovery.system_prompt.contains("- 1 catalog/configuration tables"));
    assert!(!discovery.system_prompt.contains("• TColores"));

    cleanup(&path);
}

#[tokio::test]
async fn test_snapshot_round_trip_gives_same_discovery() {
    let path = create_clinic_db();
    let db = connect(&path).await;
    let engine = InferenceEngine::new(PromptSettings::default());

    let live = engine.discover(&db).await.unwrap();

    let extraction = extract(&db).await.unwrap();
    let json = serde_json::to_string(&SchemaSnapshot::from_schema(&extraction.schema)).unwrap();
    let offline = engine.discover(&SnapshotSource::from_json(&json).unwrap()).await.unwrap();

    assert_eq!(live, offline);

    cleanup(&path);
}

#[tokio::test]
async fn test_connect_missing_file() {
    let path = std::env::temp_dir().join("alveolo_discovery_missing.db");
    let _ = std::fs::remove_file(&path);

    let err = Database::connect(&ConnectionConfig::sqlite(path.clone())).await.err().unwrap();
    assert_eq!(err.error_code(), "CONNECTION_FAILED");
    assert!(!path.exists());
}

// ============================================================================
// Column Mappings
// ============================================================================

#[tokio::test]
async fn test_column_conversions_run_on_sqlite() {
    let path = create_clinic_db();
    rusqlite::Connection::open(&path)
        .and_then(|conn| {
            conn.execute_batch(
                "CREATE TABLE Agenda (Fecha INTEGER, Hora INTEGER, Duracion INTEGER);
                 INSERT INTO Agenda VALUES (45000, 34200, 2730);",
            )
        })
        .expect("Failed to create agenda");
    let db = connect(&path).await;

    let discovery = InferenceEngine::new(PromptSettings::default()).discover(&db).await.unwrap();
    let agenda: Vec<_> = discovery.mappings.iter().filter(|m| m.table == "Agenda").collect();
    let kinds: Vec<ColumnKind> = agenda.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![ColumnKind::DateDays, ColumnKind::TimeSeconds, ColumnKind::DurationMinutes]
    );

    let select: Vec<String> =
        agenda.iter().map(|m| m.conversion_sql(DatabaseType::SQLite).unwrap()).collect();
    let sql = format!("SELECT {} FROM Agenda", select.join(", "));
    let result = db.execute(&sql, &[], &Capabilities::read_only()).await.unwrap();

    assert_eq!(
        result.rows,
        vec![vec![
            serde_json::json!("2023-03-15"),
            serde_json::json!("09:30"),
            serde_json::json!(45)
        ]]
    );

    cleanup(&path);
}

// ============================================================================
// Gated Execution
// ============================================================================

#[tokio::test]
async fn test_query_read_only() {
    let path = create_clinic_db();
    let db = connect(&path).await;

    let result = db
        .execute(
            "SELECT Nombre, Email FROM Pacientes WHERE IdPac = ?",
            &[serde_json::json!(1)],
            &Capabilities::read_only(),
        )
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["Nombre", "Email"]);
    assert_eq!(
        result.rows,
        vec![vec![serde_json::json!("Ana"), serde_json::json!("ana@example.com")]]
    );

    cleanup(&path);
}

#[tokio::test]
async fn test_query_write_requires_capability() {
    let path = create_clinic_db();
    let db = connect(&path).await;
    let sql = "UPDATE DCitas SET Estado = 2 WHERE IdCita = 1";

    let err = db.execute(sql, &[], &Capabilities::read_only()).await.unwrap_err();
    assert_eq!(err.error_code(), "SQL_REJECTED");

    let result = db.execute(sql, &[], &Capabilities::with_write()).await.unwrap();
    assert_eq!(result.rows_affected, Some(1));

    cleanup(&path);
}

#[tokio::test]
async fn test_dangerous_sql_never_reaches_database() {
    let path = create_clinic_db();
    let db = connect(&path).await;

    let caps = Capabilities::with_write();
    let err = db.execute("DROP TABLE TColores", &[], &caps).await.unwrap_err();
    assert_eq!(err.error_code(), "SQL_REJECTED");

    let extraction = extract(&db).await.unwrap();
    assert!(extraction.schema.table("TColores").is_some());

    cleanup(&path);
}
