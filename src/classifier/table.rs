//! Table purpose classification.
//!
//! Predicates are evaluated in a fixed order and the first match wins:
//! domain keywords (in [`DOMAIN_KEYWORDS`] order), then the catalog prefix
//! convention, then the junction-table shape, then the generic fallback.
//! Domain names deliberately outrank structure, so `TTratamientos` is a
//! treatment table even though it also looks like a catalog.

use serde::{Deserialize, Serialize};

use crate::schema::ForeignKey;

/// Prefix that marks catalog/configuration tables (case-sensitive)
pub const CATALOG_PREFIX: &str = "T";

/// Business domain recognized from a table name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Patients,
    Appointments,
    Treatments,
    Budgets,
    Invoices,
    Staff,
}

/// Domain name fragments, in priority order
pub const DOMAIN_KEYWORDS: &[(Domain, &[&str])] = &[
    (Domain::Patients, &["paciente", "patient"]),
    (Domain::Appointments, &["cita", "appointment"]),
    (Domain::Treatments, &["tratamiento", "treatment", "tto"]),
    (Domain::Budgets, &["presup", "budget"]),
    (Domain::Invoices, &["factura", "invoice"]),
    (Domain::Staff, &["colabo", "doctor", "medico"]),
];

/// What a table is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum TablePurpose {
    Domain { domain: Domain },
    Catalog,
    /// Many-to-many link; the first two referenced tables in declaration order
    Junction { first: String, second: String },
    Generic,
}

impl TablePurpose {
    /// One-sentence description of `table`
    #[must_use]
    pub fn describe(&self, table: &str) -> String {
        match self {
            Self::Domain { domain } => domain_sentence(*domain).to_string(),
            Self::Catalog => format!("Catalog/configuration table for {table}"),
            Self::Junction { first, second } => {
                format!("Relationship table between {first} and {second}")
            }
            Self::Generic => format!("Data table: {table}"),
        }
    }
}

const fn domain_sentence(domain: Domain) -> &'static str {
    match domain {
        Domain::Patients => "Stores patient records for the dental clinic",
        Domain::Appointments => "Manages appointments and patient scheduling",
        Domain::Treatments => "Records the dental treatments performed",
        Domain::Budgets => "Manages treatment budgets and estimates",
        Domain::Invoices => "Handles invoicing and payment collection",
        Domain::Staff => "Holds information about the clinic's doctors and collaborators",
    }
}

/// Whether a table name follows the catalog prefix convention
#[must_use]
pub fn is_catalog_name(table: &str) -> bool {
    table.starts_with(CATALOG_PREFIX)
}

/// Classify a table by name and foreign keys (first match wins)
#[must_use]
pub fn classify_table(table: &str, foreign_keys: &[ForeignKey]) -> TablePurpose {
    let lower = table.to_lowercase();

    if let Some((domain, _)) = DOMAIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
    {
        return TablePurpose::Domain { domain: *domain };
    }

    if is_catalog_name(table) && foreign_keys.is_empty() {
        return TablePurpose::Catalog;
    }

    if let [first, second, ..] = foreign_keys {
        return TablePurpose::Junction {
            first: first.referenced_table.clone(),
            second: second.referenced_table.clone(),
        };
    }

    TablePurpose::Generic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(column: &str, referenced_table: &str) -> ForeignKey {
        ForeignKey {
            table: "X".to_string(),
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: "Id".to_string(),
        }
    }

    fn domain(d: Domain) -> TablePurpose {
        TablePurpose::Domain { domain: d }
    }

    #[test]
    fn test_domain_keywords() {
        assert_eq!(classify_table("Pacientes", &[]), domain(Domain::Patients));
        assert_eq!(classify_table("DCitas", &[]), domain(Domain::Appointments));
        assert_eq!(classify_table("TtosMedCli", &[]), domain(Domain::Treatments));
        assert_eq!(classify_table("Presupuestos", &[]), domain(Domain::Budgets));
        assert_eq!(classify_table("FacturasCab", &[]), domain(Domain::Invoices));
        assert_eq!(classify_table("Colaboradores", &[]), domain(Domain::Staff));
    }

    #[test]
    fn test_domain_priority_order() {
        // patient outranks appointment
        assert_eq!(classify_table("CitasPacientes", &[]), domain(Domain::Patients));
        // treatment outranks invoice
        assert_eq!(classify_table("FacturaTratamiento", &[]), domain(Domain::Treatments));
    }

    #[test]
    fn test_domain_outranks_catalog_and_junction() {
        assert_eq!(classify_table("TTratamientos", &[]), domain(Domain::Treatments));
        let fks = [fk("IdPac", "Pacientes"), fk("IdDoc", "Colaboradores")];
        assert_eq!(classify_table("PacienteDoctor", &fks), domain(Domain::Patients));
    }

    #[test]
    fn test_catalog_prefix() {
        assert_eq!(classify_table("TColores", &[]), TablePurpose::Catalog);
        // lower-case prefix does not count
        assert_eq!(classify_table("tColores", &[]), TablePurpose::Generic);
    }

    #[test]
    fn test_catalog_requires_no_foreign_keys() {
        let fks = [fk("IdA", "Alergias"), fk("IdB", "Bancos")];
        assert_eq!(
            classify_table("TRelaciones", &fks),
            TablePurpose::Junction { first: "Alergias".into(), second: "Bancos".into() }
        );
        assert_eq!(classify_table("TRelaciones", &fks[..1]), TablePurpose::Generic);
    }

    #[test]
    fn test_junction_names_first_two_in_declaration_order() {
        let fks = [fk("IdZ", "Zonas"), fk("IdA", "Alergias"), fk("IdM", "Materiales")];
        let purpose = classify_table("LinkZA", &fks);
        assert_eq!(purpose.describe("LinkZA"), "Relationship table between Zonas and Alergias");
    }

    #[test]
    fn test_generic_fallback() {
        let purpose = classify_table("Ajustes", &[]);
        assert_eq!(purpose, TablePurpose::Generic);
        insta::assert_snapshot!(purpose.describe("Ajustes"), @"Data table: Ajustes");
    }

    #[test]
    fn test_descriptions() {
        insta::assert_snapshot!(
            TablePurpose::Catalog.describe("TColores"),
            @"Catalog/configuration table for TColores"
        );
        insta::assert_snapshot!(
            domain(Domain::Appointments).describe("DCitas"),
            @"Manages appointments and patient scheduling"
        );
    }
}
