//! Document validation: match uploaded filenames against a contract's
//! manifest, resolve what does not match, and group results into GRDTs.

pub mod candidates;
pub mod error;
pub mod events;
pub mod extract;
pub mod grouping;
pub mod hash;
pub mod matcher;
pub mod normalize;
pub mod resolution;
pub mod runner;
pub mod similarity;
pub mod store;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use candidates::CandidateRanker;
pub use error::ValidationError;
pub use events::{EventEnvelope, EventSink, ValidatorEvent};
pub use extract::{extract_document_code, ExtractionProfile};
pub use grouping::BatchGrouper;
pub use matcher::{evaluate_filename, ManifestIndex};
pub use normalize::{has_revision_suffix, is_valid_extension, normalize_document_code};
pub use resolution::ResolutionEngine;
pub use runner::ValidationRunner;
pub use similarity::calculate_similarity;
pub use store::SqliteValidatorStore;
pub use traits::{BatchStore, DocumentStore, ManifestSource, TextExtractor};
pub use types::*;

use crate::config::ValidatorConfig;

/// The three engines of one contract, wired to the same stores and event sink.
pub struct ContractValidator {
    pub runner: ValidationRunner,
    pub resolution: ResolutionEngine,
    pub grouper: BatchGrouper,
}

impl ContractValidator {
    /// Wire every engine to a single store implementing all store traits.
    pub fn new<S>(
        ctx: ContractContext,
        config: &ValidatorConfig,
        store: Arc<S>,
        ocr: Option<Arc<dyn TextExtractor>>,
        events: EventSink,
    ) -> Self
    where
        S: ManifestSource + DocumentStore + BatchStore + 'static,
    {
        let ranker = CandidateRanker::new(ctx.clone(), config, store.clone(), store.clone());
        let mut runner = ValidationRunner::new(ctx.clone(), store.clone(), store.clone(), events.clone());
        let mut resolution = ResolutionEngine::new(ctx.clone(), store.clone(), store.clone(), ranker, events.clone());
        if let Some(ocr) = ocr {
            runner = runner.with_text_extractor(ocr.clone());
            resolution = resolution.with_text_extractor(ocr);
        }
        let grouper = BatchGrouper::new(ctx, config, store.clone(), store, events);

        Self {
            runner,
            resolution,
            grouper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManifestItem, ValidationStatus};
    use uuid::Uuid;

    #[test]
    fn upload_resolve_and_group() {
        let store = Arc::new(SqliteValidatorStore::open_in_memory().unwrap());
        let ctx = ContractContext::new(Uuid::new_v4(), "CT01");
        for (code, rev) in [("DOC-001", Some("B")), ("DOC-002", None), ("DOC-124", None)] {
            store
                .insert_manifest_item(&ManifestItem::new(ctx.contract_id, code, rev, "Drawing"))
                .unwrap();
        }
        let (events, mut rx) = EventSink::channel();
        let validator = ContractValidator::new(ctx, &ValidatorConfig::default(), store, None, events);

        let summary = validator
            .runner
            .validate_files(&[
                UploadedFile::named("DOC-001_B.pdf"),
                UploadedFile::named("DOC-002_C.pdf"),
                UploadedFile::named("Relatorio DOC-125 final.pdf"),
                UploadedFile::named("setup.exe"),
            ])
            .unwrap();
        assert_eq!(summary.validated, 1);
        assert_eq!(summary.needs_suffix, 1);
        assert_eq!(summary.unrecognized, 1);
        assert_eq!(summary.errors, 1);

        let unresolved = validator.resolution.get_unresolved_documents().unwrap();
        assert_eq!(unresolved.len(), 2);
        let pending = unresolved
            .iter()
            .find(|d| d.status == ValidationStatus::Unrecognized)
            .unwrap();

        let report = validator.resolution.bulk_resolve(&[pending.id], 0.8).unwrap();
        assert_eq!(report.resolved, 1);

        let grouped = validator.grouper.auto_group_documents(None).unwrap();
        assert_eq!(grouped.batches_created, 1);
        assert_eq!(grouped.documents_assigned, 2);

        let mut kinds = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            kinds.push(envelope.event.kind());
        }
        assert_eq!(kinds.first(), Some(&"validation.started"));
        assert!(kinds.contains(&"validation.completed"));
        assert!(kinds.contains(&"document.resolved"));
        assert!(kinds.contains(&"grdt.assigned"));
    }
}
