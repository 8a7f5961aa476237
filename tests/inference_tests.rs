//! Rule Inference Integration Tests
//!
//! Drives the inference engine through its public API:
//! - Classification properties that must hold for any schema
//! - Idempotence of a full discovery pass
//! - Per-table fault isolation during extraction and inference
//! - Persistence records built from a discovery

use alveolo::engine::snapshot::SnapshotSource;
use alveolo::records::{config_records, RecordContext, CATEGORY_BUSINESS_RULE};
use alveolo::schema::{CheckConstraint, RawForeignKey};
use alveolo::{
    AlveoloError, Column, InferenceEngine, MetadataSource, PromptSettings, RawTableMetadata,
    Result, RuleKind, Schema,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

// ============================================================================
// Test Helpers
// ============================================================================

fn table(name: &str, columns: Vec<Column>) -> RawTableMetadata {
    RawTableMetadata { name: name.to_string(), columns, ..RawTableMetadata::default() }
}

/// A small clinic schema touching every classifier
fn clinic() -> Vec<RawTableMetadata> {
    vec![
        RawTableMetadata {
            name: "Pacientes".to_string(),
            columns: vec![
                Column::new("IdPac", "int", false),
                Column::new("Nombre", "varchar", false),
                Column::new("Email", "varchar", true),
                Column::new("Telefono", "varchar", true),
                Column::new("NIF", "varchar", true),
            ],
            primary_keys: vec!["IdPac".to_string()],
            unique_columns: vec!["NIF".to_string()],
            ..RawTableMetadata::default()
        },
        table(
            "DCitas",
            vec![Column::new("IdCita", "int", false), Column::new("Fecha", "datetime", false)],
        ),
        RawTableMetadata {
            name: "Presupuestos".to_string(),
            columns: vec![
                Column::new("IdPresu", "int", false),
                Column::new("IdPac", "int", false),
                Column::new("Importe", "money", true),
                Column::new("Estado", "int", true),
            ],
            primary_keys: vec!["IdPresu".to_string()],
            foreign_keys: vec![RawForeignKey::new("IdPac", "Pacientes", "IdPac")],
            check_constraints: vec![CheckConstraint::new("CK_Importe", "([Importe]>=(0))")],
            ..RawTableMetadata::default()
        },
        RawTableMetadata {
            name: "LineasDoc".to_string(),
            columns: vec![Column::new("IdA", "int", false), Column::new("IdB", "int", false)],
            foreign_keys: vec![
                RawForeignKey::new("IdA", "Almacenes", "Id"),
                RawForeignKey::new("IdB", "Articulos", "Id"),
            ],
            ..RawTableMetadata::default()
        },
        table(
            "TColores",
            vec![Column::new("Id", "int", false), Column::new("Color", "varchar", true)],
        ),
    ]
}

fn engine() -> InferenceEngine {
    InferenceEngine::new(PromptSettings::default())
}

/// Snapshot source that fails to fetch foreign keys for one table
struct FlakySource {
    inner: SnapshotSource,
    broken: String,
}

impl MetadataSource for FlakySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.inner.fetch_columns(table).await
    }

    async fn fetch_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        self.inner.fetch_primary_keys(table).await
    }

    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        if table == self.broken {
            return Err(AlveoloError::engine_error("test", "permission denied for foreign keys"));
        }
        self.inner.fetch_foreign_keys(table).await
    }

    async fn fetch_check_constraints(&self, table: &str) -> Result<Vec<CheckConstraint>> {
        self.inner.fetch_check_constraints(table).await
    }

    async fn fetch_unique_columns(&self, table: &str) -> Result<Vec<String>> {
        self.inner.fetch_unique_columns(table).await
    }
}

/// Source whose table listing fails outright
struct DownSource;

impl MetadataSource for DownSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Err(AlveoloError::connection_failed("server closed the connection"))
    }

    async fn fetch_columns(&self, _table: &str) -> Result<Vec<Column>> {
        Ok(Vec::new())
    }

    async fn fetch_primary_keys(&self, _table: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_foreign_keys(&self, _table: &str) -> Result<Vec<RawForeignKey>> {
        Ok(Vec::new())
    }

    async fn fetch_check_constraints(&self, _table: &str) -> Result<Vec<CheckConstraint>> {
        Ok(Vec::new())
    }

    async fn fetch_unique_columns(&self, _table: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Classification Properties
// ============================================================================

#[test]
fn test_fecha_columns_always_get_temporal_rule() {
    let names = ["Fecha", "FECHA_ALTA", "ImporteFecha", "fechaEstadoTel", "UltimaFechaCorreo"];
    let columns = names.iter().map(|n| Column::new(*n, "varchar", true)).collect();
    let schema = Schema::from_raw(vec![table("Varios", columns)]).unwrap();

    let discovery = engine().infer(&schema);

    for name in names {
        assert!(
            discovery.rules.iter().any(|r| {
                r.kind == RuleKind::TemporalValidation && r.column.as_deref() == Some(name)
            }),
            "no temporal rule for {name}"
        );
    }
}

#[test]
fn test_junction_description_names_first_two_parents() {
    let raw = RawTableMetadata {
        name: "Enlaces".to_string(),
        columns: vec![
            Column::new("A", "int", false),
            Column::new("B", "int", false),
            Column::new("C", "int", false),
        ],
        foreign_keys: vec![
            RawForeignKey::new("B", "Zonas", "Id"),
            RawForeignKey::new("A", "Almacenes", "Id"),
            RawForeignKey::new("C", "Marcas", "Id"),
        ],
        ..RawTableMetadata::default()
    };
    let discovery = engine().infer(&Schema::from_raw(vec![raw]).unwrap());

    assert_eq!(
        discovery.descriptions["Enlaces"],
        "Relationship table between Zonas and Almacenes"
    );
}

#[test]
fn test_dcitas_end_to_end() {
    let raw = table("DCitas", vec![Column::new("Fecha", "datetime", false)]);
    let schema = Schema::from_raw(vec![raw]).unwrap();
    let discovery = engine().infer(&schema);

    let kinds: Vec<RuleKind> = discovery.rules.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![RuleKind::TemporalValidation, RuleKind::RequiredField]);
    assert!(discovery.rules.iter().all(|r| r.column.as_deref() == Some("Fecha")));
    insta::assert_snapshot!(
        &discovery.descriptions["DCitas"],
        @"Manages appointments and patient scheduling"
    );
}

#[test]
fn test_tcolores_is_catalog() {
    let schema = Schema::from_raw(vec![RawTableMetadata::named("TColores")]).unwrap();
    let discovery = engine().infer(&schema);

    insta::assert_snapshot!(
        &discovery.descriptions["TColores"],
        @"Catalog/configuration table for TColores"
    );
    assert!(discovery.rules.is_empty());
}

#[test]
fn test_clinic_rule_distribution() {
    let discovery = engine().infer(&Schema::from_raw(clinic()).unwrap());

    let counts = discovery.rule_counts();
    assert_eq!(counts[&RuleKind::ReferentialIntegrity], 3);
    assert_eq!(counts[&RuleKind::Uniqueness], 1);
    assert_eq!(counts[&RuleKind::CheckConstraint], 1);
    assert_eq!(counts[&RuleKind::MonetaryValidation], 1);
    assert_eq!(counts[&RuleKind::TemporalValidation], 1);
    assert_eq!(counts[&RuleKind::StateMachine], 1);
    // Email, Telefono and NIF
    assert_eq!(counts[&RuleKind::FormatValidation], 3);
    assert_eq!(counts.values().sum::<usize>(), discovery.rules.len());
    assert!(discovery.is_complete());
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_inference_is_idempotent() {
    let schema = Schema::from_raw(clinic()).unwrap();
    let first = engine().infer(&schema);
    let second = engine().infer(&schema);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_discover_from_snapshot_matches_direct_inference() {
    let source = SnapshotSource::from_tables(clinic());
    let discovered = engine().discover(&source).await.unwrap();
    let direct = engine().infer(&Schema::from_raw(clinic()).unwrap());

    assert_eq!(discovered.rules, direct.rules);
    assert_eq!(discovered.descriptions, direct.descriptions);
    assert_eq!(discovered.system_prompt, direct.system_prompt);
}

// ============================================================================
// Fault Isolation
// ============================================================================

#[tokio::test]
async fn test_failing_table_is_skipped_and_reported() {
    let source = FlakySource {
        inner: SnapshotSource::from_tables(clinic()),
        broken: "Presupuestos".to_string(),
    };

    let discovery = engine().discover(&source).await.unwrap();

    assert_eq!(discovery.tables_requested, 5);
    assert_eq!(discovery.tables_analyzed, 4);
    assert!(!discovery.is_complete());
    assert_eq!(discovery.failures.len(), 1);
    assert_eq!(discovery.failures[0].table, "Presupuestos");
    assert_eq!(discovery.failures[0].code, "ENGINE_ERROR");
    assert!(!discovery.descriptions.contains_key("Presupuestos"));
    assert!(discovery.rules.iter().all(|r| r.table != "Presupuestos"));
    assert!(discovery.system_prompt.contains("with 4 tables"));
}

#[tokio::test]
async fn test_extraction_and_inference_failures_are_merged() {
    let mut tables = clinic();
    tables.push(RawTableMetadata {
        name: "Roto".to_string(),
        columns: vec![Column::new("Id", "int", false)],
        primary_keys: vec!["NoExiste".to_string()],
        ..RawTableMetadata::default()
    });
    let source = FlakySource {
        inner: SnapshotSource::from_tables(tables),
        broken: "DCitas".to_string(),
    };

    let discovery = engine().discover(&source).await.unwrap();

    let failed: Vec<(&str, &str)> =
        discovery.failures.iter().map(|f| (f.table.as_str(), f.code.as_str())).collect();
    assert_eq!(failed, vec![("DCitas", "ENGINE_ERROR"), ("Roto", "MALFORMED_TABLE")]);
    assert_eq!(discovery.tables_requested, 6);
    assert_eq!(discovery.tables_analyzed, 4);
}

#[tokio::test]
async fn test_listing_failure_aborts_discovery() {
    let err = engine().discover(&DownSource).await.unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_FAILED");
}

#[test]
fn test_empty_schema() {
    let discovery = engine().infer(&Schema::default());

    assert!(discovery.rules.is_empty());
    assert!(discovery.descriptions.is_empty());
    assert!(discovery.is_complete());
    assert!(discovery.system_prompt.contains("with 0 tables"));
}

// ============================================================================
// Persistence Records
// ============================================================================

#[test]
fn test_records_round_trip_rules() {
    let discovery = engine().infer(&Schema::from_raw(clinic()).unwrap());
    let ctx = RecordContext {
        analyzed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        schema_version: "1.0.0".to_string(),
        language: "es-ES".to_string(),
    };

    let records = config_records(&discovery, &ctx).unwrap();
    let rules: Vec<_> = records
        .iter()
        .filter(|r| r.category == CATEGORY_BUSINESS_RULE)
        .map(|r| r.rule().unwrap())
        .collect();

    assert_eq!(rules, discovery.rules);
    assert_eq!(records.len(), 1 + discovery.rules.len() + discovery.descriptions.len() + 6);

    let analyzed_at = records.iter().find(|r| r.key == "ANALYZED_AT").unwrap();
    assert_eq!(analyzed_at.value, "2026-03-01T09:30:00Z");
}

#[test]
fn test_records_are_deterministic_for_fixed_context() {
    let discovery = engine().infer(&Schema::from_raw(clinic()).unwrap());
    let ctx = RecordContext {
        analyzed_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        schema_version: "1.0.0".to_string(),
        language: "es-ES".to_string(),
    };

    let first = config_records(&discovery, &ctx).unwrap();
    let second = config_records(&discovery, &ctx).unwrap();
    assert_eq!(first, second);
}
