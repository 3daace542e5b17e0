//! Error types for the record store.

use crate::db::migrate::NATURAL_KEY_INDEX;
use rusqlite::ErrorCode;
use std::fmt;
use thiserror::Error;

/// One failing field and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// Every field-level problem found while validating a write, in the order
/// they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Bad info: ")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", e.field, e.reason)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(FieldErrors),

    /// The write would give two records the same natural key.
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

/// Reports a hit on the natural-key index as `Conflict`. Any other database
/// error stays a persistence failure.
pub(crate) fn natural_key_conflict(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, Some(msg))
            if failure.code == ErrorCode::ConstraintViolation
                && msg.contains(NATURAL_KEY_INDEX) =>
        {
            StoreError::Conflict(
                "A record with the same host, app set, path and filename already exists".into(),
            )
        }
        _ => StoreError::Persistence(e),
    }
}

impl From<FieldErrors> for StoreError {
    fn from(errors: FieldErrors) -> Self {
        StoreError::Validation(errors)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_field() {
        let mut errors = FieldErrors::default();
        errors.push("filename", "can not be empty");
        errors.push("path", "can not be empty");

        let err = StoreError::from(errors);
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Bad info: filename: can not be empty, path: can not be empty"
        );
    }

    #[test]
    fn test_only_natural_key_violations_are_conflicts() -> anyhow::Result<()> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch(&format!(
            "CREATE TABLE t (k TEXT, other TEXT UNIQUE);
             CREATE UNIQUE INDEX {} ON t (IFNULL(k, ''));
             INSERT INTO t VALUES ('a', 'x');",
            NATURAL_KEY_INDEX
        ))?;

        let clash = conn
            .execute("INSERT INTO t VALUES ('a', 'y')", [])
            .expect_err("duplicate key");
        assert!(matches!(natural_key_conflict(clash), StoreError::Conflict(_)));

        let other = conn
            .execute("INSERT INTO t VALUES ('b', 'x')", [])
            .expect_err("duplicate other");
        assert!(matches!(natural_key_conflict(other), StoreError::Persistence(_)));
        Ok(())
    }
}
