//! Trait definitions for the validator's collaborators.
//!
//! The engines see storage and OCR only through these seams:
//! - ManifestSource: read-only manifest of a contract
//! - DocumentStore: validated documents, with compare-and-set status writes
//! - BatchStore: GRDT batches and membership
//! - TextExtractor: optional OCR capability

use uuid::Uuid;

use super::error::ValidationError;
use crate::models::{
    DocumentFilter, ManifestItem, NewBatch, StatusChange, ValidatedDocument, ValidationBatch,
    ValidationStatus,
};

/// Read-only access to manifest items.
pub trait ManifestSource: Send + Sync {
    /// All items of a contract in insertion order.
    fn list_manifest_items(&self, contract_id: &Uuid) -> Result<Vec<ManifestItem>, ValidationError>;

    fn get_manifest_item(&self, id: &Uuid) -> Result<Option<ManifestItem>, ValidationError>;

    /// Items whose code or title contains `query`, case-insensitive, in insertion order.
    fn search_manifest_items(
        &self,
        contract_id: &Uuid,
        query: &str,
    ) -> Result<Vec<ManifestItem>, ValidationError>;
}

pub trait DocumentStore: Send + Sync {
    fn create_document(&self, doc: &ValidatedDocument) -> Result<(), ValidationError>;

    fn get_document(&self, id: &Uuid) -> Result<Option<ValidatedDocument>, ValidationError>;

    /// Earliest document of the contract with this content hash.
    fn find_by_hash(
        &self,
        contract_id: &Uuid,
        file_hash: &str,
    ) -> Result<Option<ValidatedDocument>, ValidationError>;

    /// Apply `change` only if the stored status is still `expected` and the
    /// document is not frozen in a finalized batch. Returns whether it applied.
    fn update_document_status(
        &self,
        id: &Uuid,
        expected: ValidationStatus,
        change: &StatusChange,
    ) -> Result<bool, ValidationError>;

    /// Record an extracted code without touching the verdict.
    fn set_extracted_code(&self, id: &Uuid, code: &str) -> Result<(), ValidationError>;

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<ValidatedDocument>, ValidationError>;

    /// Documents with no batch, oldest first.
    fn list_unassigned_documents(&self, contract_id: &Uuid) -> Result<Vec<ValidatedDocument>, ValidationError>;
}

pub trait BatchStore: Send + Sync {
    /// Create a batch, allocating its sequence number (and GRDT number when
    /// none is supplied) atomically.
    fn create_batch(&self, batch: &NewBatch) -> Result<ValidationBatch, ValidationError>;

    fn get_batch(&self, id: &Uuid) -> Result<Option<ValidationBatch>, ValidationError>;

    fn list_batches(&self, contract_id: &Uuid) -> Result<Vec<ValidationBatch>, ValidationError>;

    /// Rename an open batch.
    fn update_batch(
        &self,
        id: &Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<ValidationBatch, ValidationError>;

    /// Detach members, then remove the batch. Returns the number detached.
    fn delete_batch(&self, id: &Uuid) -> Result<usize, ValidationError>;

    /// Assign documents to an open batch, all or nothing.
    fn assign_documents(&self, batch_id: &Uuid, document_ids: &[Uuid]) -> Result<usize, ValidationError>;

    /// Detach documents from an open batch, all or nothing.
    fn unassign_documents(&self, batch_id: &Uuid, document_ids: &[Uuid]) -> Result<usize, ValidationError>;

    /// Freeze counts computed from current members and stamp `validated_at`.
    fn finalize_batch(&self, batch_id: &Uuid) -> Result<ValidationBatch, ValidationError>;

    /// Next GRDT sequence value of the contract. Never reused.
    fn get_batch_next_sequence_number(&self, contract_id: &Uuid) -> Result<i64, ValidationError>;
}

/// OCR or other text extraction over raw file bytes.
///
/// Failures should be `ValidationError::Transient` so callers can retry.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ValidationError>;
}
