//! SQL Safety Gate Tests
//!
//! Black-box checks of `alveolo::validate`:
//! - Denylisted keywords are rejected in any letter case, anywhere, even with writes allowed
//! - Read-only calls accept only SELECT
//! - Stacked statements are rejected, a single trailing separator is not
//! - Gate order decides which reason is reported

use alveolo::safety::DANGEROUS_KEYWORDS;
use alveolo::{validate, AlveoloError, RejectionReason, Verdict};
use pretty_assertions::assert_eq;

fn code(sql: &str, allow_write: bool) -> Option<&'static str> {
    validate(sql, allow_write).reason().map(RejectionReason::code)
}

/// Lower, upper, and alternating-case spellings of a keyword
fn spellings(keyword: &str) -> Vec<String> {
    let alternating: String = keyword
        .chars()
        .enumerate()
        .map(|(i, c)| if i % 2 == 0 { c.to_ascii_lowercase() } else { c.to_ascii_uppercase() })
        .collect();
    vec![keyword.to_lowercase(), keyword.to_uppercase(), alternating]
}

// ============================================================================
// Denylist
// ============================================================================

#[test]
fn test_denylist_any_case_any_position() {
    for keyword in DANGEROUS_KEYWORDS {
        for spelled in spellings(keyword) {
            let texts = [
                format!("{spelled} Pacientes"),
                format!("SELECT * FROM Citas WHERE Nota = '{spelled}'"),
                format!("UPDATE Citas SET Nota = 'x' /* {spelled} */"),
            ];
            for sql in &texts {
                for allow_write in [false, true] {
                    assert_eq!(
                        code(sql, allow_write),
                        Some("DANGEROUS_OPERATION"),
                        "{sql:?} allow_write={allow_write}"
                    );
                }
            }
        }
    }
}

#[test]
fn test_denylist_reports_keyword() {
    let verdict = validate("select 1 from x; exec xp_cmdshell 'dir'", true);
    assert_eq!(
        verdict.reason(),
        Some(&RejectionReason::DangerousOperation { keyword: "EXEC".to_string() })
    );
}

#[test]
fn test_denylist_checked_before_select_rule() {
    // Read-only and non-SELECT, but the denylist gate runs first
    assert_eq!(code("ALTER TABLE Citas ADD x int", false), Some("DANGEROUS_OPERATION"));
}

// ============================================================================
// Read-only Mode
// ============================================================================

#[test]
fn test_read_only_accepts_select_in_any_case() {
    for sql in ["select * from Patients", "SELECT * FROM Patients", "  \n\tSelect Id From Citas"] {
        assert!(validate(sql, false).is_accepted(), "{sql:?}");
    }
}

#[test]
fn test_read_only_rejects_everything_else() {
    let texts = [
        "INSERT INTO Citas (Id) VALUES (1)",
        "UPDATE Citas SET Estado = 2",
        "WITH x AS (SELECT 1) SELECT * FROM x",
        "PRAGMA table_info(Citas)",
        "(SELECT 1)",
    ];
    for sql in texts {
        assert_eq!(code(sql, false), Some("WRITE_NOT_PERMITTED"), "{sql:?}");
    }
}

#[test]
fn test_write_mode_accepts_non_select() {
    assert!(validate("INSERT INTO Citas (Id) VALUES (1)", true).is_accepted());
    assert!(validate("update Citas set Estado = 2 where Id = 1;", true).is_accepted());
}

// ============================================================================
// Statement Separators
// ============================================================================

#[test]
fn test_stacked_statements_rejected() {
    assert_eq!(
        validate("SELECT * FROM A; SELECT * FROM B", false).reason(),
        Some(&RejectionReason::MultipleStatements)
    );
    assert_eq!(code("UPDATE A SET x = 1; UPDATE B SET y = 2", true), Some("MULTIPLE_STATEMENTS"));
}

#[test]
fn test_single_trailing_separator_accepted() {
    assert_eq!(
        validate("SELECT * FROM A;", false),
        Verdict::Accepted { sql: "SELECT * FROM A;".to_string() }
    );
}

#[test]
fn test_separator_inside_literal_still_counts() {
    assert_eq!(code("SELECT * FROM A WHERE x = 'a;b'", false), Some("MULTIPLE_STATEMENTS"));
}

// ============================================================================
// Producer Failures
// ============================================================================

#[test]
fn test_empty_and_error_marker() {
    assert_eq!(code("", true), Some("NO_VALID_SQL"));
    assert_eq!(code(" \n ", false), Some("NO_VALID_SQL"));
    assert_eq!(code("-- I could not build a query for that request", false), Some("NO_VALID_SQL"));
}

#[test]
fn test_error_marker_wins_over_denylist() {
    assert_eq!(code("-- DROP TABLE Pacientes", true), Some("NO_VALID_SQL"));
}

// ============================================================================
// Error Conversion
// ============================================================================

#[test]
fn test_rejection_converts_to_error() {
    let err = validate("TRUNCATE Citas", true).into_result().unwrap_err();

    assert_eq!(err.error_code(), "SQL_REJECTED");
    match err {
        AlveoloError::SqlRejected(rejection) => {
            assert_eq!(rejection.reason.code(), "DANGEROUS_OPERATION");
            assert!(!rejection.reason.is_retryable());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_validation_is_pure() {
    let sql = "SELECT Nombre FROM Pacientes WHERE IdPac = ?";
    assert_eq!(validate(sql, false), validate(sql, false));
    assert_eq!(validate(sql, false).into_result().unwrap(), sql);
}
