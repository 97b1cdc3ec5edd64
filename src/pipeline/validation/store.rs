//! SQLite-backed implementation of the validator stores.
//!
//! One connection behind a mutex. Batch mutations run in IMMEDIATE
//! transactions and re-check `validated_at IS NULL` inside them, so a batch
//! cannot finalize between the check and the write.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Datelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use super::error::ValidationError;
use super::traits::{BatchStore, DocumentStore, ManifestSource};
use crate::db::repository;
use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::models::{
    format_grdt_number, BatchCounts, DocumentFilter, ManifestItem, NewBatch, StatusChange,
    ValidatedDocument, ValidationBatch, ValidationStatus,
};

pub struct SqliteValidatorStore {
    conn: Mutex<Connection>,
}

impl SqliteValidatorStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, ValidationError> {
        Ok(Self::new(open_database(path)?))
    }

    /// Open (or create) the database at `config::database_path()`.
    pub fn open_default() -> Result<Self, ValidationError> {
        let path = crate::config::database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ValidationError::Config(format!("cannot create {}: {e}", parent.display())))?;
        }
        tracing::info!(path = %path.display(), "Opening validator database");
        Self::open(&path)
    }

    pub fn open_in_memory() -> Result<Self, ValidationError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ValidationError> {
        self.conn
            .lock()
            .map_err(|_| ValidationError::from(DatabaseError::LockPoisoned))
    }

    /// Insert a manifest item. The manifest is owned outside the engine;
    /// this exists for importers and tests.
    pub fn insert_manifest_item(&self, item: &ManifestItem) -> Result<(), ValidationError> {
        let conn = self.conn()?;
        repository::insert_manifest_item(&conn, item)?;
        Ok(())
    }
}

fn load_batch(conn: &Connection, id: &Uuid) -> Result<ValidationBatch, ValidationError> {
    repository::get_batch(conn, id)?.ok_or_else(|| ValidationError::not_found("ValidationBatch", id))
}

fn load_open_batch(conn: &Connection, id: &Uuid) -> Result<ValidationBatch, ValidationError> {
    let batch = load_batch(conn, id)?;
    if batch.is_finalized() {
        return Err(ValidationError::AlreadyFinalized(*id));
    }
    Ok(batch)
}

fn load_document(conn: &Connection, id: &Uuid) -> Result<ValidatedDocument, ValidationError> {
    repository::get_document(conn, id)?.ok_or_else(|| ValidationError::not_found("ValidatedDocument", id))
}

impl ManifestSource for SqliteValidatorStore {
    fn list_manifest_items(&self, contract_id: &Uuid) -> Result<Vec<ManifestItem>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::list_manifest_items(&conn, contract_id)?)
    }

    fn get_manifest_item(&self, id: &Uuid) -> Result<Option<ManifestItem>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::get_manifest_item(&conn, id)?)
    }

    fn search_manifest_items(
        &self,
        contract_id: &Uuid,
        query: &str,
    ) -> Result<Vec<ManifestItem>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::search_manifest_items(&conn, contract_id, query)?)
    }
}

impl DocumentStore for SqliteValidatorStore {
    fn create_document(&self, doc: &ValidatedDocument) -> Result<(), ValidationError> {
        let conn = self.conn()?;
        repository::insert_document(&conn, doc)?;
        Ok(())
    }

    fn get_document(&self, id: &Uuid) -> Result<Option<ValidatedDocument>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::get_document(&conn, id)?)
    }

    fn find_by_hash(
        &self,
        contract_id: &Uuid,
        file_hash: &str,
    ) -> Result<Option<ValidatedDocument>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::find_document_by_hash(&conn, contract_id, file_hash)?)
    }

    fn update_document_status(
        &self,
        id: &Uuid,
        expected: ValidationStatus,
        change: &StatusChange,
    ) -> Result<bool, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::update_document_status_if(&conn, id, expected, change)?)
    }

    fn set_extracted_code(&self, id: &Uuid, code: &str) -> Result<(), ValidationError> {
        let conn = self.conn()?;
        repository::set_extracted_code(&conn, id, code)?;
        Ok(())
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<ValidatedDocument>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::list_documents(&conn, filter)?)
    }

    fn list_unassigned_documents(&self, contract_id: &Uuid) -> Result<Vec<ValidatedDocument>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::list_unassigned_documents(&conn, contract_id)?)
    }
}

impl BatchStore for SqliteValidatorStore {
    fn create_batch(&self, new: &NewBatch) -> Result<ValidationBatch, ValidationError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        let sequence_number = repository::next_grdt_sequence(&tx, &new.contract_id)?;
        let created_at = Utc::now();
        let grdt_number = match &new.grdt_number {
            Some(number) if !number.trim().is_empty() => number.trim().to_string(),
            _ => format_grdt_number(&new.grdt_prefix, &new.contract_code, created_at.year(), sequence_number),
        };
        let batch = ValidationBatch {
            id: Uuid::new_v4(),
            contract_id: new.contract_id,
            name: new.name.clone(),
            description: new.description.clone(),
            grdt_number,
            sequence_number,
            validated_at: None,
            counts: BatchCounts::default(),
            created_at,
        };
        repository::insert_batch(&tx, &batch)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(batch)
    }

    fn get_batch(&self, id: &Uuid) -> Result<Option<ValidationBatch>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::get_batch(&conn, id)?)
    }

    fn list_batches(&self, contract_id: &Uuid) -> Result<Vec<ValidationBatch>, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::list_batches(&conn, contract_id)?)
    }

    fn update_batch(
        &self,
        id: &Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<ValidationBatch, ValidationError> {
        let conn = self.conn()?;
        if !repository::update_open_batch(&conn, id, name, description)? {
            // Distinguish absent from frozen.
            load_open_batch(&conn, id)?;
        }
        load_batch(&conn, id)
    }

    fn delete_batch(&self, id: &Uuid) -> Result<usize, ValidationError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        load_batch(&tx, id)?;
        let detached = repository::detach_batch_documents(&tx, id)?;
        repository::delete_batch_row(&tx, id)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(detached)
    }

    fn assign_documents(&self, batch_id: &Uuid, document_ids: &[Uuid]) -> Result<usize, ValidationError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        let batch = load_open_batch(&tx, batch_id)?;
        // Every check runs before the first write.
        for id in document_ids {
            let doc = load_document(&tx, id)?;
            if doc.contract_id != batch.contract_id {
                return Err(ValidationError::Integrity(format!(
                    "document {id} belongs to another contract than batch {batch_id}"
                )));
            }
            if let Some(current) = doc.batch_id.filter(|current| current != batch_id) {
                if load_batch(&tx, &current)?.is_finalized() {
                    return Err(ValidationError::Integrity(format!(
                        "document {id} is frozen in finalized batch {current}"
                    )));
                }
            }
        }

        let assigned = repository::set_documents_batch(&tx, document_ids, Some(batch_id))?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(assigned)
    }

    fn unassign_documents(&self, batch_id: &Uuid, document_ids: &[Uuid]) -> Result<usize, ValidationError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        load_open_batch(&tx, batch_id)?;
        for id in document_ids {
            let doc = load_document(&tx, id)?;
            if doc.batch_id.as_ref() != Some(batch_id) {
                return Err(ValidationError::Integrity(format!(
                    "document {id} is not a member of batch {batch_id}"
                )));
            }
        }

        let removed = repository::set_documents_batch(&tx, document_ids, None)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(removed)
    }

    fn finalize_batch(&self, batch_id: &Uuid) -> Result<ValidationBatch, ValidationError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;

        load_open_batch(&tx, batch_id)?;
        let filter = DocumentFilter {
            batch_id: Some(*batch_id),
            ..DocumentFilter::default()
        };
        let members = repository::list_documents(&tx, &filter)?;
        let counts = BatchCounts::from_statuses(members.iter().map(|d| &d.status));

        if !repository::mark_batch_finalized(&tx, batch_id, &counts, &Utc::now())? {
            return Err(ValidationError::AlreadyFinalized(*batch_id));
        }
        let batch = load_batch(&tx, batch_id)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(batch)
    }

    fn get_batch_next_sequence_number(&self, contract_id: &Uuid) -> Result<i64, ValidationError> {
        let conn = self.conn()?;
        Ok(repository::next_grdt_sequence(&conn, contract_id)?)
    }
}
