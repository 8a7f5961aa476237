//! Column classification by name.
//!
//! Each [`ColumnPredicate`] pairs a keyword set with a rule constructor. The
//! lower-cased column name is tested by substring containment against every
//! predicate in [`COLUMN_PREDICATES`] order; each matching predicate adds one
//! rule, however many of its keywords hit.

use serde::{Deserialize, Serialize};

use crate::rules::{BusinessRule, Predicate, RuleKind, RulePayload, EMAIL_PATTERN, PHONE_PATTERN};
use crate::schema::Column;

/// Meaning inferred from a column name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticCategory {
    Monetary,
    Temporal,
    Email,
    Phone,
    State,
    NationalId,
}

/// One keyword predicate and the rule it produces
pub struct ColumnPredicate {
    pub category: SemanticCategory,
    pub keywords: &'static [&'static str],
    build: fn(&str, &str) -> BusinessRule,
}

impl ColumnPredicate {
    /// Whether an already lower-cased name contains any keyword
    #[must_use]
    pub fn matches(&self, lower_name: &str) -> bool {
        self.keywords.iter().any(|keyword| lower_name.contains(keyword))
    }

    /// Rule for `table.column`
    #[must_use]
    pub fn rule(&self, table: &str, column: &str) -> BusinessRule {
        (self.build)(table, column)
    }
}

/// Column predicates in evaluation order
pub const COLUMN_PREDICATES: &[ColumnPredicate] = &[
    ColumnPredicate {
        category: SemanticCategory::Monetary,
        keywords: &["saldo", "importe", "precio", "total", "coste", "cost"],
        build: monetary_rule,
    },
    ColumnPredicate {
        category: SemanticCategory::Temporal,
        keywords: &["fecha", "fec", "date"],
        build: temporal_rule,
    },
    ColumnPredicate {
        category: SemanticCategory::Email,
        keywords: &["email", "correo"],
        build: email_rule,
    },
    ColumnPredicate {
        category: SemanticCategory::Phone,
        keywords: &["tel", "telefono", "phone", "movil"],
        build: phone_rule,
    },
    ColumnPredicate {
        category: SemanticCategory::State,
        keywords: &["estado", "status", "situacion", "sit"],
        build: state_rule,
    },
    ColumnPredicate {
        category: SemanticCategory::NationalId,
        keywords: &["nif", "dni", "cif"],
        build: national_id_rule,
    },
];

/// Categories a column name falls into, in predicate order
#[must_use]
pub fn matching_categories(column_name: &str) -> Vec<SemanticCategory> {
    let lower = column_name.to_lowercase();
    COLUMN_PREDICATES.iter().filter(|p| p.matches(&lower)).map(|p| p.category).collect()
}

/// Naming rules for one column of `table`
///
/// Only the name is consulted; the declared type does not change the outcome.
#[must_use]
pub fn classify_column(table: &str, column: &Column) -> Vec<BusinessRule> {
    let lower = column.name.to_lowercase();
    COLUMN_PREDICATES
        .iter()
        .filter(|p| p.matches(&lower))
        .map(|p| p.rule(table, &column.name))
        .collect()
}

fn monetary_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::MonetaryValidation,
        table,
        column,
        Predicate::NonNegativeNumber,
        format!("{column} must be a numeric value greater than or equal to zero"),
    )
}

fn temporal_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::TemporalValidation,
        table,
        column,
        Predicate::ValidDateFormat,
        format!("{column} must hold a valid date"),
    )
}

fn email_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::FormatValidation,
        table,
        column,
        Predicate::EmailFormat,
        format!("{column} must be a valid email address"),
    )
    .with_payload(RulePayload::Pattern { regex: EMAIL_PATTERN.to_string() })
}

fn phone_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::FormatValidation,
        table,
        column,
        Predicate::PhoneFormat,
        format!("{column} must be a valid phone number"),
    )
    .with_payload(RulePayload::Pattern { regex: PHONE_PATTERN.to_string() })
}

// States are not enumerable from the name; the lookup happens elsewhere.
fn state_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::StateMachine,
        table,
        column,
        Predicate::ValidStateTransition,
        format!("{column} must hold a valid state value"),
    )
}

fn national_id_rule(table: &str, column: &str) -> BusinessRule {
    BusinessRule::for_column(
        RuleKind::FormatValidation,
        table,
        column,
        Predicate::NationalIdFormat,
        format!("{column} must be a valid NIF/DNI/CIF"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use SemanticCategory::*;

    fn col(name: &str) -> Column {
        Column::new(name, "varchar", true)
    }

    #[test]
    fn test_each_category_alone() {
        assert_eq!(matching_categories("Importe"), vec![Monetary]);
        assert_eq!(matching_categories("FechaAlta"), vec![Temporal]);
        assert_eq!(matching_categories("Correo"), vec![Email]);
        assert_eq!(matching_categories("Movil"), vec![Phone]);
        assert_eq!(matching_categories("Estado"), vec![State]);
        assert_eq!(matching_categories("NIF"), vec![NationalId]);
        assert!(matching_categories("Nombre").is_empty());
    }

    #[test]
    fn test_categories_are_independent() {
        assert_eq!(matching_categories("fecha_saldo"), vec![Monetary, Temporal]);
        // "situacion" and "sit" both hit, "estado" too: still one State match
        assert_eq!(matching_categories("EstadoSituacion"), vec![State]);
    }

    #[test]
    fn test_substring_containment_is_broad() {
        // "tel" inside "Hotel", "cost" inside "Costa", "date" inside "UpdatedAt"
        assert_eq!(matching_categories("Hotel"), vec![Phone]);
        assert_eq!(matching_categories("Costa"), vec![Monetary]);
        assert_eq!(matching_categories("UpdatedAt"), vec![Temporal]);
    }

    #[test]
    fn test_one_rule_per_category() {
        let rules = classify_column("Pacientes", &col("TelefonoMovil"));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].predicate, Predicate::PhoneFormat);
        assert_eq!(
            rules[0].payload,
            Some(RulePayload::Pattern { regex: PHONE_PATTERN.to_string() })
        );
    }

    #[test]
    fn test_rules_carry_table_and_column() {
        let rules = classify_column("Pacientes", &col("fecha_nacimiento"));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].table, "Pacientes");
        assert_eq!(rules[0].column.as_deref(), Some("fecha_nacimiento"));
        assert_eq!(rules[0].kind, RuleKind::TemporalValidation);
    }

    #[test]
    fn test_email_pattern_payload() {
        let rules = classify_column("Pacientes", &col("EMAIL"));
        assert_eq!(rules[0].predicate, Predicate::EmailFormat);
        assert_eq!(
            rules[0].payload,
            Some(RulePayload::Pattern { regex: EMAIL_PATTERN.to_string() })
        );
    }

    #[test]
    fn test_state_rule_has_no_enumerated_states() {
        let rules = classify_column("DCitas", &col("Status"));
        assert_eq!(rules[0].kind, RuleKind::StateMachine);
        assert!(rules[0].payload.is_none());
    }
}
