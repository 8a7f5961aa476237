//! Semantic Classifier
//!
//! Pure, side-effect-free mapping from names and table structure to business
//! rules and table descriptions.
//!
//! # Sub-classifiers
//! - [`column`]: keyword containment over column names; categories are
//!   independent, a column may match several
//! - [`table`]: table purpose; the first matching predicate wins
//! - [`structural`]: rules read off constraints (NOT NULL, UNIQUE, CHECK, FK)
//! - [`mapping`]: one presentation kind per column, first match wins
//!
//! All keyword sets are compile-time constants. The predicate tables are
//! ordered data, so changing an order is a visible policy change and bumps
//! [`CLASSIFIER_VERSION`].

pub mod column;
pub mod mapping;
pub mod structural;
pub mod table;

pub use column::{
    classify_column, matching_categories, ColumnPredicate, SemanticCategory, COLUMN_PREDICATES,
};
pub use mapping::{map_column, map_columns, schema_summary, ColumnKind, ColumnMapping, Conversion};
pub use structural::{
    check_constraint_rules, referential_rules, required_field_rules, uniqueness_rules,
};
pub use table::{
    classify_table, is_catalog_name, Domain, TablePurpose, CATALOG_PREFIX, DOMAIN_KEYWORDS,
};

/// Version of the keyword tables and their evaluation order
pub const CLASSIFIER_VERSION: &str = "1";
