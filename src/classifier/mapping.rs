//! Column mapping by name and storage type.
//!
//! Every column gets exactly one [`ColumnKind`]: the checks run in a fixed
//! order (date, time, duration, state, identifier) and the first hit wins,
//! with text as the fallback. Date and time columns stored as integers are
//! read as day or second counters and carry a [`Conversion`] the assistant
//! can use to present them.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::classifier::table::{classify_table, TablePurpose};
use crate::engine::DatabaseType;
use crate::schema::{Column, Schema};

const DATE_KEYWORDS: &[&str] = &["fecha", "fec", "date"];
const TIME_KEYWORDS: &[&str] = &["hora", "hor", "time"];
const DURATION_KEYWORDS: &[&str] = &["duracion", "duration"];
const STATE_KEYWORDS: &[&str] = &["estado", "status", "sitc", "sit"];

/// Fragments that mark a column worth listing in the schema summary
const KEY_COLUMN_KEYWORDS: &[&str] = &["id", "nombre", "fecha", "estado"];

/// Key columns listed per table in the schema summary
const KEY_COLUMN_LIMIT: usize = 10;

/// Day counters start two days before this date
const DAY_COUNTER_EPOCH: &str = "1900-01-01";

/// How a column's values should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnKind {
    /// Integer day counter
    DateDays,
    Date,
    /// Integer seconds since midnight
    TimeSeconds,
    Time,
    /// Seconds, presented as minutes
    DurationMinutes,
    State,
    Id,
    Text,
}

/// Expression that turns a stored value into its presentable form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Day counter to `YYYY-MM-DD`
    DaysToDate,
    /// Seconds since midnight to `HH:MM`
    SecondsToTime,
    /// Seconds to whole minutes (truncated)
    SecondsToMinutes,
}

impl Conversion {
    /// SQL expression converting `column` on `engine`
    #[must_use]
    pub fn to_sql(self, column: &str, engine: DatabaseType) -> String {
        let column = quote_identifier(column);
        match (self, engine) {
            (Self::DaysToDate, DatabaseType::SQLite) => {
                format!("date('{DAY_COUNTER_EPOCH}', ({column} - 2) || ' days')")
            }
            (Self::DaysToDate, DatabaseType::Postgres) => {
                format!("(DATE '{DAY_COUNTER_EPOCH}' + ({column} - 2))::text")
            }
            (Self::SecondsToTime, DatabaseType::SQLite) => {
                format!("strftime('%H:%M', {column}, 'unixepoch')")
            }
            (Self::SecondsToTime, DatabaseType::Postgres) => {
                format!("to_char(make_interval(secs => {column}), 'HH24:MI')")
            }
            (Self::SecondsToMinutes, DatabaseType::SQLite) => {
                format!("CAST({column} / 60.0 AS INTEGER)")
            }
            (Self::SecondsToMinutes, DatabaseType::Postgres) => {
                format!("trunc({column} / 60.0)::int")
            }
        }
    }
}

/// One mapping row per column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub table: String,
    pub column: String,
    pub kind: ColumnKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<Conversion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnMapping {
    /// Conversion expression for `engine`, when the column needs one
    #[must_use]
    pub fn conversion_sql(&self, engine: DatabaseType) -> Option<String> {
        self.conversion.map(|conversion| conversion.to_sql(&self.column, engine))
    }
}

/// Map one column of `table`
#[must_use]
pub fn map_column(table: &str, column: &Column) -> ColumnMapping {
    let lower = column.name.to_lowercase();
    let counter = is_integer_type(&column.data_type);

    let (kind, conversion, description) = if contains_any(&lower, DATE_KEYWORDS) {
        if counter {
            (
                ColumnKind::DateDays,
                Some(Conversion::DaysToDate),
                Some(format!("Date stored as days since {DAY_COUNTER_EPOCH}")),
            )
        } else {
            (ColumnKind::Date, None, Some("Date field".to_string()))
        }
    } else if contains_any(&lower, TIME_KEYWORDS) {
        if counter {
            (
                ColumnKind::TimeSeconds,
                Some(Conversion::SecondsToTime),
                Some("Time stored as seconds since midnight".to_string()),
            )
        } else {
            (ColumnKind::Time, None, Some("Time field".to_string()))
        }
    } else if contains_any(&lower, DURATION_KEYWORDS) {
        (
            ColumnKind::DurationMinutes,
            Some(Conversion::SecondsToMinutes),
            Some("Duration in seconds, presented in minutes".to_string()),
        )
    } else if contains_any(&lower, STATE_KEYWORDS) {
        (ColumnKind::State, None, Some("State field (values need a mapping)".to_string()))
    } else if lower.starts_with("id") {
        (ColumnKind::Id, None, Some(format!("Identifier: {}", column.name)))
    } else {
        (ColumnKind::Text, None, None)
    };

    ColumnMapping {
        table: table.to_string(),
        column: column.name.clone(),
        kind,
        conversion,
        description,
    }
}

/// Map every column of every table, in declaration order
#[must_use]
pub fn map_columns(schema: &Schema) -> Vec<ColumnMapping> {
    schema
        .tables()
        .iter()
        .flat_map(|table| table.columns().iter().map(|column| map_column(table.name(), column)))
        .collect()
}

/// Markdown overview of a schema
///
/// Domain tables get a section with their description, column count and key
/// columns; every table is then listed by name with its column count.
#[must_use]
pub fn schema_summary(schema: &Schema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Database structure\n");
    let _ = writeln!(out, "Total tables: {}\n", schema.len());
    let _ = writeln!(out, "## Main tables\n");

    for table in schema.tables() {
        let purpose = classify_table(table.name(), table.foreign_keys());
        if !matches!(purpose, TablePurpose::Domain { .. }) {
            continue;
        }

        let _ = writeln!(out, "### {}", table.name());
        let _ = writeln!(out, "**Description**: {}", purpose.describe(table.name()));
        let _ = writeln!(out, "**Columns**: {}\n", table.columns().len());

        let key_columns: Vec<&str> = table
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| contains_any(&name.to_lowercase(), KEY_COLUMN_KEYWORDS))
            .take(KEY_COLUMN_LIMIT)
            .collect();
        if !key_columns.is_empty() {
            let _ = writeln!(out, "**Key columns**:");
            for name in key_columns {
                let _ = writeln!(out, "- `{name}`");
            }
            out.push('\n');
        }
    }

    let _ = writeln!(out, "## All tables\n");
    let mut names: Vec<(&str, usize)> =
        schema.tables().iter().map(|t| (t.name(), t.columns().len())).collect();
    names.sort_unstable();
    for (name, columns) in names {
        let _ = writeln!(out, "- **{name}** ({columns} columns)");
    }

    out
}

fn contains_any(lower_name: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| lower_name.contains(keyword))
}

fn is_integer_type(data_type: &str) -> bool {
    data_type.to_lowercase().contains("int")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
