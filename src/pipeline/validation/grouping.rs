//! GRDT batch grouping: automatic chunking, manual membership, finalize.

use std::sync::Arc;

use uuid::Uuid;

use super::error::ValidationError;
use super::events::{EventSink, ValidatorEvent};
use super::traits::{BatchStore, DocumentStore};
use super::types::{AutoGroupResult, BatchDetail, ContractContext};
use crate::config::ValidatorConfig;
use crate::models::{BatchCounts, DocumentFilter, NewBatch, ValidationBatch, ValidationStatus};

pub struct BatchGrouper {
    ctx: ContractContext,
    grdt_prefix: String,
    default_max_per_batch: usize,
    documents: Arc<dyn DocumentStore>,
    batches: Arc<dyn BatchStore>,
    events: EventSink,
}

impl BatchGrouper {
    pub fn new(
        ctx: ContractContext,
        config: &ValidatorConfig,
        documents: Arc<dyn DocumentStore>,
        batches: Arc<dyn BatchStore>,
        events: EventSink,
    ) -> Self {
        Self {
            ctx,
            grdt_prefix: config.grdt_prefix.clone(),
            default_max_per_batch: config.max_per_batch,
            documents,
            batches,
            events,
        }
    }

    fn load_batch(&self, id: &Uuid) -> Result<ValidationBatch, ValidationError> {
        match self.batches.get_batch(id)? {
            Some(batch) if batch.contract_id == self.ctx.contract_id => Ok(batch),
            _ => Err(ValidationError::not_found("ValidationBatch", id)),
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Batch lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Create an open batch. A GRDT number is generated unless one is given.
    pub fn create_batch(
        &self,
        name: &str,
        description: Option<&str>,
        grdt_number: Option<&str>,
    ) -> Result<ValidationBatch, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidInput("batch name is required".into()));
        }
        let batch = self.batches.create_batch(&NewBatch {
            contract_id: self.ctx.contract_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            grdt_number: grdt_number.map(str::to_string),
            contract_code: self.ctx.contract_code.clone(),
            grdt_prefix: self.grdt_prefix.clone(),
        })?;

        tracing::info!(
            batch_id = %batch.id,
            grdt_number = %batch.grdt_number,
            sequence = batch.sequence_number,
            "Batch created"
        );
        self.events.emit(ValidatorEvent::GrdtCreated {
            contract_id: batch.contract_id,
            batch_id: batch.id,
            grdt_number: batch.grdt_number.clone(),
        });
        Ok(batch)
    }

    pub fn update_batch(
        &self,
        batch_id: &Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<ValidationBatch, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidInput("batch name is required".into()));
        }
        self.load_batch(batch_id)?;
        self.batches.update_batch(batch_id, name, description)
    }

    /// Remove a batch. Member documents are detached, never deleted.
    ///
    /// Returns the number of detached documents.
    pub fn delete_batch(&self, batch_id: &Uuid) -> Result<usize, ValidationError> {
        self.load_batch(batch_id)?;
        let detached = self.batches.delete_batch(batch_id)?;
        tracing::info!(batch_id = %batch_id, detached, "Batch deleted");
        Ok(detached)
    }

    /// Batches of the contract in GRDT sequence order.
    pub fn list_batches(&self) -> Result<Vec<ValidationBatch>, ValidationError> {
        self.batches.list_batches(&self.ctx.contract_id)
    }

    pub fn get_batch_with_documents(&self, batch_id: &Uuid) -> Result<BatchDetail, ValidationError> {
        let batch = self.load_batch(batch_id)?;
        let filter = DocumentFilter {
            batch_id: Some(batch.id),
            ..DocumentFilter::for_contract(self.ctx.contract_id)
        };
        let mut documents = self.documents.list_documents(&filter)?;
        documents.sort_by(|a, b| a.filename.cmp(&b.filename));
        let live_counts = BatchCounts::from_statuses(documents.iter().map(|d| &d.status));
        Ok(BatchDetail {
            batch,
            documents,
            live_counts,
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Membership
    // ═══════════════════════════════════════════════════════════

    /// Move documents into an open batch. All-or-nothing.
    pub fn assign_documents_to_batch(&self, batch_id: &Uuid, document_ids: &[Uuid]) -> Result<usize, ValidationError> {
        self.load_batch(batch_id)?;
        if document_ids.is_empty() {
            return Ok(0);
        }
        let assigned = self.batches.assign_documents(batch_id, document_ids)?;
        tracing::info!(batch_id = %batch_id, assigned, "Documents assigned to batch");
        self.events.emit(ValidatorEvent::GrdtAssigned {
            contract_id: self.ctx.contract_id,
            batch_id: *batch_id,
            document_ids: document_ids.to_vec(),
        });
        Ok(assigned)
    }

    /// Detach documents from an open batch. All-or-nothing.
    pub fn remove_documents_from_batch(
        &self,
        batch_id: &Uuid,
        document_ids: &[Uuid],
    ) -> Result<usize, ValidationError> {
        self.load_batch(batch_id)?;
        if document_ids.is_empty() {
            return Ok(0);
        }
        let removed = self.batches.unassign_documents(batch_id, document_ids)?;
        tracing::info!(batch_id = %batch_id, removed, "Documents removed from batch");
        Ok(removed)
    }

    /// Freeze counts and membership. A second call reports `AlreadyFinalized`.
    pub fn finalize_batch(&self, batch_id: &Uuid) -> Result<ValidationBatch, ValidationError> {
        self.load_batch(batch_id)?;
        let batch = self.batches.finalize_batch(batch_id)?;
        tracing::info!(
            batch_id = %batch.id,
            grdt_number = %batch.grdt_number,
            total = batch.counts.total_items,
            valid = batch.counts.valid_count,
            "Batch finalized"
        );
        self.events.emit(ValidatorEvent::BatchFinalized {
            contract_id: batch.contract_id,
            batch_id: batch.id,
            counts: batch.counts,
        });
        Ok(batch)
    }

    // ═══════════════════════════════════════════════════════════
    // Auto-grouping
    // ═══════════════════════════════════════════════════════════

    /// Chunk unassigned VALIDATED documents into new batches of at most
    /// `max_per_batch`, in upload order.
    ///
    /// Each chunk is assigned in its own transaction. If a chunk cannot be
    /// assigned, its empty batch is removed and the error is returned;
    /// chunks already grouped stay grouped.
    pub fn auto_group_documents(&self, max_per_batch: Option<usize>) -> Result<AutoGroupResult, ValidationError> {
        let max_per_batch = max_per_batch.unwrap_or(self.default_max_per_batch);
        if max_per_batch == 0 {
            return Err(ValidationError::InvalidInput("max_per_batch must be at least 1".into()));
        }

        let ready: Vec<Uuid> = self
            .documents
            .list_unassigned_documents(&self.ctx.contract_id)?
            .into_iter()
            .filter(|d| d.status == ValidationStatus::Validated)
            .map(|d| d.id)
            .collect();

        let mut result = AutoGroupResult::default();
        if ready.is_empty() {
            tracing::debug!(contract_id = %self.ctx.contract_id, "No documents to group");
            return Ok(result);
        }

        let existing = self.batches.list_batches(&self.ctx.contract_id)?.len();
        for (index, chunk) in ready.chunks(max_per_batch).enumerate() {
            let name = format!("Lote {} - Auto", existing + index + 1);
            let batch = self.create_batch(&name, None, None)?;
            if let Err(e) = self.batches.assign_documents(&batch.id, chunk) {
                tracing::warn!(batch_id = %batch.id, error = %e, "Auto-group assignment failed");
                if let Err(cleanup) = self.batches.delete_batch(&batch.id) {
                    tracing::warn!(batch_id = %batch.id, error = %cleanup, "Could not remove empty batch");
                }
                return Err(e);
            }
            self.events.emit(ValidatorEvent::GrdtAssigned {
                contract_id: self.ctx.contract_id,
                batch_id: batch.id,
                document_ids: chunk.to_vec(),
            });

            result.batches_created += 1;
            result.documents_assigned += chunk.len() as u32;
            result.batch_ids.push(batch.id);
        }

        tracing::info!(
            contract_id = %self.ctx.contract_id,
            batches = result.batches_created,
            documents = result.documents_assigned,
            "Auto-grouping complete"
        );
        Ok(result)
    }
}
