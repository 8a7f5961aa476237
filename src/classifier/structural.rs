//! Rules read directly off table constraints.

use crate::rules::{BusinessRule, Predicate, RuleKind, RulePayload};
use crate::schema::Table;

/// One rule per foreign key: the child value must exist in the parent
#[must_use]
pub fn referential_rules(table: &Table) -> Vec<BusinessRule> {
    table
        .foreign_keys()
        .iter()
        .map(|fk| {
            BusinessRule::for_column(
                RuleKind::ReferentialIntegrity,
                table.name(),
                &fk.column,
                Predicate::RecordExists,
                format!(
                    "The value of {} must exist in {}.{}",
                    fk.column, fk.referenced_table, fk.referenced_column
                ),
            )
            .with_payload(RulePayload::References {
                table: fk.referenced_table.clone(),
                column: fk.referenced_column.clone(),
            })
        })
        .collect()
}

/// One rule per NOT NULL column
#[must_use]
pub fn required_field_rules(table: &Table) -> Vec<BusinessRule> {
    table
        .columns()
        .iter()
        .filter(|c| !c.nullable)
        .map(|c| {
            BusinessRule::for_column(
                RuleKind::RequiredField,
                table.name(),
                &c.name,
                Predicate::NotNull,
                format!("{} is a required field", c.name),
            )
        })
        .collect()
}

/// One rule per uniquely-constrained column
#[must_use]
pub fn uniqueness_rules(table: &Table) -> Vec<BusinessRule> {
    table
        .unique_columns()
        .iter()
        .map(|column| {
            BusinessRule::for_column(
                RuleKind::Uniqueness,
                table.name(),
                column,
                Predicate::UniqueValue,
                format!("{column} must be unique in table {}", table.name()),
            )
        })
        .collect()
}

/// One table-level rule per CHECK constraint, expression kept verbatim
#[must_use]
pub fn check_constraint_rules(table: &Table) -> Vec<BusinessRule> {
    table
        .check_constraints()
        .iter()
        .map(|check| BusinessRule {
            kind: RuleKind::CheckConstraint,
            table: table.name().to_string(),
            column: None,
            predicate: Predicate::CheckCondition,
            message: format!("Must satisfy: {}", check.definition),
            payload: Some(RulePayload::Expression {
                constraint_name: check.name.clone(),
                definition: check.definition.clone(),
            }),
        })
        .collect()
}
