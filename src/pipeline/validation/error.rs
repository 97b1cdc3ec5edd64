//! Error taxonomy of the validation engine.
//!
//! Input problems with an uploaded file never surface here: the matcher turns
//! them into an ERROR verdict. These variants are for callers.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Batch {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("Concurrent update on {0}, status changed since it was read")]
    Conflict(Uuid),

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl ValidationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// A transient failure means "could not be evaluated yet", never a verdict.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict(_))
    }
}

impl From<DatabaseError> for ValidationError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_label(&entity_type),
                id,
            },
            DatabaseError::ConstraintViolation(msg) => Self::Integrity(msg),
            DatabaseError::Busy(msg) => Self::Transient(msg),
            DatabaseError::LockPoisoned => Self::Transient("database connection lock poisoned".into()),
            other => Self::Database(other),
        }
    }
}

fn entity_label(entity_type: &str) -> &'static str {
    match entity_type {
        "ManifestItem" => "ManifestItem",
        "ValidatedDocument" => "ValidatedDocument",
        "ValidationBatch" => "ValidationBatch",
        _ => "Entity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_database_is_transient() {
        let err = ValidationError::from(DatabaseError::Busy("locked".into()));
        assert!(err.is_transient());
        assert!(matches!(err, ValidationError::Transient(_)));
    }

    #[test]
    fn constraint_becomes_integrity() {
        let err = ValidationError::from(DatabaseError::ConstraintViolation("UNIQUE".into()));
        assert!(matches!(err, ValidationError::Integrity(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn not_found_keeps_entity() {
        let err = ValidationError::from(DatabaseError::not_found("ValidationBatch", "b1"));
        assert_eq!(err.to_string(), "ValidationBatch not found: b1");
    }

    #[test]
    fn conflict_is_retryable() {
        assert!(ValidationError::Conflict(Uuid::nil()).is_transient());
        assert!(!ValidationError::AlreadyFinalized(Uuid::nil()).is_transient());
    }
}
