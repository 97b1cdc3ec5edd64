pub mod sqlite;
pub mod repository;

pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    /// Busy/locked conditions are retryable; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::LockPoisoned)
    }

    pub(crate) fn not_found(entity_type: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                Self::Busy(e.to_string())
            }
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                Self::ConstraintViolation(e.to_string())
            }
            _ => Self::Sqlite(e),
        }
    }
}
