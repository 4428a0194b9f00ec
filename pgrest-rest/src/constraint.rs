//! Constraint violation mapping
//!
//! Driver errors are matched by SQLSTATE first and message text second, and
//! re-surfaced as structured validation errors. Anything that is not an
//! integrity problem propagates unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

use pgrest_common::error::Error;

static NOT_NULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"null value in column "([^"]+)""#).expect("valid regex")
});
static UNIQUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"duplicate key value violates unique constraint "([^"]+)""#).expect("valid regex")
});
static FOREIGN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"violates foreign key constraint "([^"]+)""#).expect("valid regex")
});
static CHECK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"violates check constraint "([^"]+)""#).expect("valid regex")
});
static ENUM_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"invalid input value for enum ([A-Za-z0-9_."]+): "([^"]*)""#).expect("valid regex")
});
static KEY_DETAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").expect("valid regex"));

/// Map a driver error onto the constraint taxonomy
pub fn map_database_error(err: Error) -> Error {
    let (code, message) = match &err {
        Error::Sql { code, message } => (code.as_deref(), message.as_str()),
        Error::DatabaseError(message) => (None, message.as_str()),
        _ => return err,
    };

    let capture = |re: &Regex| -> Option<String> {
        re.captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    match code {
        Some("23502") => {
            return Error::NotNullViolation {
                column: capture(&NOT_NULL).unwrap_or_else(|| "unknown".to_string()),
            }
        }
        Some("23505") => return Error::DuplicateKey(describe(capture(&UNIQUE), message)),
        Some("23503") => return Error::ForeignKeyViolation(describe(capture(&FOREIGN_KEY), message)),
        Some("23514") => {
            return Error::CheckViolation(capture(&CHECK).unwrap_or_else(|| message.to_string()))
        }
        _ => {}
    }

    if let Some(column) = capture(&NOT_NULL) {
        return Error::NotNullViolation { column };
    }
    if let Some(constraint) = capture(&UNIQUE) {
        return Error::DuplicateKey(describe(Some(constraint), message));
    }
    if let Some(constraint) = capture(&FOREIGN_KEY) {
        return Error::ForeignKeyViolation(describe(Some(constraint), message));
    }
    if let Some(constraint) = capture(&CHECK) {
        return Error::CheckViolation(constraint);
    }
    if let Some(c) = ENUM_VALUE.captures(message) {
        return Error::InvalidEnumValue {
            type_name: c[1].trim_matches('"').to_string(),
            value: c[2].to_string(),
        };
    }

    if matches!(code, Some(c) if c.starts_with("23") || c == "22P02") {
        return Error::ValidationError(message.to_string());
    }
    err
}

/// Constraint name plus the `Key (col)=(value)` detail when present
fn describe(constraint: Option<String>, message: &str) -> String {
    let detail = KEY_DETAIL
        .captures(message)
        .map(|c| format!("{}={}", &c[1], &c[2]));
    match (constraint, detail) {
        (Some(name), Some(detail)) => format!("{name} ({detail})"),
        (Some(name), None) => name,
        (None, Some(detail)) => detail,
        (None, None) => message.to_string(),
    }
}
