//! Resolution engine: manual, automatic, bulk and OCR-assisted resolution.
//!
//! Every write is a compare-and-set on the status that was read, so a
//! document rejected or resolved elsewhere in the meantime is never
//! overwritten. VALIDATED documents are left alone unless forced.

use std::sync::Arc;

use uuid::Uuid;

use super::candidates::CandidateRanker;
use super::error::ValidationError;
use super::events::{EventSink, ValidatorEvent};
use super::extract::extract_document_code;
use super::traits::{DocumentStore, ManifestSource, TextExtractor};
use super::types::{
    BulkOutcome, BulkResolveReport, CandidateQuery, ContractContext, OcrResolution,
    ResolutionCandidate, ResolutionStats, ResolveOutcome,
};
use crate::models::{
    CandidateSource, DocumentFilter, ResolutionMethod, StatusChange, ValidatedDocument,
    ValidationStatus,
};

/// Candidates returned with a below-threshold OCR result.
const OCR_CANDIDATE_LIMIT: usize = 5;

pub struct ResolutionEngine {
    ctx: ContractContext,
    manifest: Arc<dyn ManifestSource>,
    documents: Arc<dyn DocumentStore>,
    ranker: CandidateRanker,
    ocr: Option<Arc<dyn TextExtractor>>,
    events: EventSink,
}

fn check_threshold(threshold: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ValidationError::InvalidInput(format!(
            "auto-resolve threshold must be within [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

impl ResolutionEngine {
    pub fn new(
        ctx: ContractContext,
        manifest: Arc<dyn ManifestSource>,
        documents: Arc<dyn DocumentStore>,
        ranker: CandidateRanker,
        events: EventSink,
    ) -> Self {
        Self {
            ctx,
            manifest,
            documents,
            ranker,
            ocr: None,
            events,
        }
    }

    pub fn with_text_extractor(mut self, ocr: Arc<dyn TextExtractor>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Ranked candidates for an unresolved document.
    pub fn get_candidates(
        &self,
        document_id: &Uuid,
        query: &CandidateQuery,
    ) -> Result<Vec<ResolutionCandidate>, ValidationError> {
        self.ranker.get_candidates(document_id, query)
    }

    // ═══════════════════════════════════════════════════════════
    // Single-document resolution
    // ═══════════════════════════════════════════════════════════

    /// Link a document to a manifest item chosen by a person (confidence 1.0).
    ///
    /// A document that is already VALIDATED is returned unchanged.
    pub fn resolve_manually(
        &self,
        document_id: &Uuid,
        manifest_item_id: &Uuid,
    ) -> Result<ResolveOutcome, ValidationError> {
        self.resolve_manually_inner(document_id, manifest_item_id, false)
    }

    /// Like `resolve_manually`, but also overrides an existing VALIDATED link.
    pub fn force_resolve_manually(
        &self,
        document_id: &Uuid,
        manifest_item_id: &Uuid,
    ) -> Result<ResolveOutcome, ValidationError> {
        self.resolve_manually_inner(document_id, manifest_item_id, true)
    }

    fn resolve_manually_inner(
        &self,
        document_id: &Uuid,
        manifest_item_id: &Uuid,
        force: bool,
    ) -> Result<ResolveOutcome, ValidationError> {
        let doc = self.ranker.load_document(document_id)?;
        let item = self
            .manifest
            .get_manifest_item(manifest_item_id)?
            .ok_or_else(|| ValidationError::not_found("ManifestItem", manifest_item_id))?;
        if item.contract_id != doc.contract_id {
            return Err(ValidationError::Integrity(format!(
                "manifest item {} belongs to another contract than document {}",
                item.id, doc.id
            )));
        }

        if doc.status == ValidationStatus::Validated && !force {
            tracing::debug!(document_id = %doc.id, "Already validated, manual resolution skipped");
            return Ok(ResolveOutcome::AlreadyResolved { document: doc });
        }

        let change = StatusChange::resolved(item.id, &item.document_code, 1.0, ResolutionMethod::Manual);
        let updated = self.apply(&doc, &change)?;
        Ok(ResolveOutcome::Resolved { document: updated })
    }

    /// Mark a document as ERROR with a reason and clear its manifest link.
    pub fn reject_document(&self, document_id: &Uuid, reason: &str) -> Result<ValidatedDocument, ValidationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::InvalidInput("rejection reason is required".into()));
        }
        let doc = self.ranker.load_document(document_id)?;
        self.apply(&doc, &StatusChange::rejected(reason))
    }

    // ═══════════════════════════════════════════════════════════
    // Automatic resolution
    // ═══════════════════════════════════════════════════════════

    /// Resolve each document to its top candidate when it scores at least
    /// `threshold`. Documents below threshold are not touched.
    ///
    /// There is no default threshold; 0.9 is the usual choice.
    pub fn bulk_resolve(&self, document_ids: &[Uuid], threshold: f64) -> Result<BulkResolveReport, ValidationError> {
        check_threshold(threshold)?;

        let mut report = BulkResolveReport::default();
        for id in document_ids {
            let outcome = match self.auto_resolve_one(id, threshold) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(document_id = %id, error = %e, "Bulk resolution failed for document");
                    BulkOutcome::Failed {
                        transient: e.is_transient(),
                        error: e.to_string(),
                    }
                }
            };
            report.record(*id, outcome);
        }

        tracing::info!(
            contract_id = %self.ctx.contract_id,
            threshold,
            resolved = report.resolved,
            skipped = report.skipped,
            failed = report.failed,
            "Bulk resolution complete"
        );
        Ok(report)
    }

    fn auto_resolve_one(&self, id: &Uuid, threshold: f64) -> Result<BulkOutcome, ValidationError> {
        let doc = self.ranker.load_document(id)?;
        if doc.status == ValidationStatus::Validated {
            return Ok(BulkOutcome::AlreadyResolved);
        }

        let top = self
            .ranker
            .candidates_for_document(&doc, &CandidateQuery::limit(1))?
            .into_iter()
            .next();
        let best_similarity = top.as_ref().map(|c| c.similarity);
        let Some(top) = top.filter(|c| c.similarity >= threshold) else {
            return Ok(BulkOutcome::Skipped { best_similarity });
        };

        let change = StatusChange::resolved(
            top.manifest_item_id,
            &top.document_code,
            top.similarity,
            ResolutionMethod::Auto,
        );
        self.apply(&doc, &change)?;
        Ok(BulkOutcome::Resolved {
            manifest_item_id: top.manifest_item_id,
            document_code: top.document_code,
            similarity: top.similarity,
        })
    }

    /// Read the document's content and resolve from the code found there.
    ///
    /// The extracted code is stored on the document even when it does not
    /// reach `threshold`, so later rankings use it.
    pub fn resolve_with_ocr(
        &self,
        document_id: &Uuid,
        bytes: &[u8],
        threshold: f64,
    ) -> Result<OcrResolution, ValidationError> {
        check_threshold(threshold)?;
        let ocr = self
            .ocr
            .as_ref()
            .ok_or_else(|| ValidationError::Config("no text extractor configured".into()))?;

        let doc = self.ranker.load_document(document_id)?;
        if doc.status == ValidationStatus::Validated {
            return Ok(OcrResolution::AlreadyResolved { document: doc });
        }

        let text = ocr.extract_text(bytes)?;
        let extracted = extract_document_code(self.ctx.profile.as_ref(), &text);
        let query = CandidateQuery::limit(OCR_CANDIDATE_LIMIT);
        let candidates = match &extracted {
            Some(code) => {
                self.documents.set_extracted_code(&doc.id, code)?;
                self.ranker.candidates_for_code(code, CandidateSource::Extraction, &query)?
            }
            None => self.ranker.candidates_for_document(&doc, &query)?,
        };

        match candidates.first() {
            Some(top) if extracted.is_some() && top.similarity >= threshold => {
                let change = StatusChange::resolved(
                    top.manifest_item_id,
                    &top.document_code,
                    top.similarity,
                    ResolutionMethod::Ocr,
                );
                let updated = self.apply(&doc, &change)?;
                Ok(OcrResolution::Resolved {
                    document: updated,
                    similarity: top.similarity,
                })
            }
            _ => {
                tracing::debug!(
                    document_id = %doc.id,
                    extracted_code = ?extracted,
                    "OCR resolution below threshold"
                );
                Ok(OcrResolution::Pending {
                    extracted_code: extracted,
                    candidates,
                })
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════

    /// Counts by status and confidence, computed from current documents.
    pub fn get_resolution_stats(&self) -> Result<ResolutionStats, ValidationError> {
        let docs = self
            .documents
            .list_documents(&DocumentFilter::for_contract(self.ctx.contract_id))?;
        Ok(ResolutionStats::from_documents(&docs))
    }

    /// UNRECOGNIZED and ERROR documents, newest first.
    pub fn get_unresolved_documents(&self) -> Result<Vec<ValidatedDocument>, ValidationError> {
        let filter = DocumentFilter {
            newest_first: true,
            ..DocumentFilter::for_contract(self.ctx.contract_id)
                .with_statuses(&[ValidationStatus::Unrecognized, ValidationStatus::Error])
        };
        self.documents.list_documents(&filter)
    }

    // ═══════════════════════════════════════════════════════════
    // Write path
    // ═══════════════════════════════════════════════════════════

    /// Compare-and-set `change` against the status in `doc`, then reload.
    fn apply(&self, doc: &ValidatedDocument, change: &StatusChange) -> Result<ValidatedDocument, ValidationError> {
        if !self.documents.update_document_status(&doc.id, doc.status, change)? {
            let current = self.ranker.load_document(&doc.id)?;
            if current.status == doc.status {
                return Err(ValidationError::Integrity(format!(
                    "document {} is frozen in a finalized batch",
                    doc.id
                )));
            }
            return Err(ValidationError::Conflict(doc.id));
        }

        let updated = self.ranker.load_document(&doc.id)?;
        tracing::info!(
            document_id = %updated.id,
            status = updated.status.as_str(),
            method = ?change.resolution_method,
            confidence = ?updated.confidence,
            "Document resolved"
        );
        if let Some(method) = change.resolution_method {
            self.events.emit(ValidatorEvent::DocumentResolved {
                contract_id: updated.contract_id,
                document_id: updated.id,
                manifest_item_id: updated.manifest_item_id,
                status: updated.status,
                method,
                confidence: updated.confidence,
            });
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::models::ManifestItem;
    use crate::pipeline::validation::events::EventEnvelope;
    use crate::pipeline::validation::store::SqliteValidatorStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn extract_text(&self, _bytes: &[u8]) -> Result<String, ValidationError> {
            Ok(self.0.to_string())
        }
    }

    struct Fixture {
        store: Arc<SqliteValidatorStore>,
        engine: ResolutionEngine,
        rx: UnboundedReceiver<EventEnvelope>,
        items: Vec<ManifestItem>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(SqliteValidatorStore::open_in_memory().unwrap());
            let ctx = ContractContext::new(Uuid::new_v4(), "CT01");
            let items: Vec<ManifestItem> = ["DOC-123", "DOC-124", "XYZ-999"]
                .iter()
                .map(|code| ManifestItem::new(ctx.contract_id, code, None, "title"))
                .collect();
            for item in &items {
                store.insert_manifest_item(item).unwrap();
            }
            let (events, rx) = EventSink::channel();
            let ranker = CandidateRanker::new(ctx.clone(), &ValidatorConfig::default(), store.clone(), store.clone());
            let engine = ResolutionEngine::new(ctx, store.clone(), store.clone(), ranker, events);
            Self { store, engine, rx, items }
        }

        fn contract_id(&self) -> Uuid {
            self.engine.ctx.contract_id
        }

        fn add(&self, filename: &str, status: ValidationStatus, extracted: Option<&str>) -> ValidatedDocument {
            let mut doc = ValidatedDocument::pending(self.contract_id(), filename);
            doc.status = status;
            doc.extracted_code = extracted.map(str::to_string);
            self.store.create_document(&doc).unwrap();
            doc
        }

        fn reload(&self, id: &Uuid) -> ValidatedDocument {
            self.store.get_document(id).unwrap().unwrap()
        }
    }

    #[test]
    fn manual_resolution_validates_with_full_confidence() {
        let mut fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);

        let outcome = fx.engine.resolve_manually(&doc.id, &fx.items[0].id).unwrap();
        let resolved = outcome.document();
        assert_eq!(resolved.status, ValidationStatus::Validated);
        assert_eq!(resolved.manifest_item_id, Some(fx.items[0].id));
        assert_eq!(resolved.confidence, Some(1.0));
        assert_eq!(resolved.resolution_method, Some(ResolutionMethod::Manual));

        match fx.rx.try_recv().unwrap().event {
            ValidatorEvent::DocumentResolved { method, document_id, .. } => {
                assert_eq!(method, ResolutionMethod::Manual);
                assert_eq!(document_id, doc.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn manual_resolution_of_validated_document_is_noop_unless_forced() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);
        fx.engine.resolve_manually(&doc.id, &fx.items[0].id).unwrap();

        let again = fx.engine.resolve_manually(&doc.id, &fx.items[1].id).unwrap();
        assert!(matches!(again, ResolveOutcome::AlreadyResolved { .. }));
        assert_eq!(fx.reload(&doc.id).manifest_item_id, Some(fx.items[0].id));

        let forced = fx.engine.force_resolve_manually(&doc.id, &fx.items[1].id).unwrap();
        assert!(matches!(forced, ResolveOutcome::Resolved { .. }));
        assert_eq!(fx.reload(&doc.id).manifest_item_id, Some(fx.items[1].id));
    }

    #[test]
    fn cross_contract_item_is_integrity_violation() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);
        let foreign = ManifestItem::new(Uuid::new_v4(), "DOC-123", None, "");
        fx.store.insert_manifest_item(&foreign).unwrap();

        let err = fx.engine.resolve_manually(&doc.id, &foreign.id).unwrap_err();
        assert!(matches!(err, ValidationError::Integrity(_)));
        assert_eq!(fx.reload(&doc.id).status, ValidationStatus::Unrecognized);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);
        assert!(matches!(
            fx.engine.resolve_manually(&Uuid::new_v4(), &fx.items[0].id),
            Err(ValidationError::NotFound { entity: "ValidatedDocument", .. })
        ));
        assert!(matches!(
            fx.engine.resolve_manually(&doc.id, &Uuid::new_v4()),
            Err(ValidationError::NotFound { entity: "ManifestItem", .. })
        ));
    }

    #[test]
    fn reject_sets_error_and_clears_link() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);
        fx.engine.resolve_manually(&doc.id, &fx.items[0].id).unwrap();

        let rejected = fx.engine.reject_document(&doc.id, "wrong project").unwrap();
        assert_eq!(rejected.status, ValidationStatus::Error);
        assert!(rejected.manifest_item_id.is_none());
        assert_eq!(rejected.error_message.as_deref(), Some("wrong project"));

        assert!(matches!(
            fx.engine.reject_document(&doc.id, "  "),
            Err(ValidationError::InvalidInput(_))
        ));
    }

    #[test]
    fn bulk_resolve_respects_threshold() {
        let fx = Fixture::new();
        let exact = fx.add("a.pdf", ValidationStatus::Unrecognized, Some("DOC-124"));
        let close = fx.add("b.pdf", ValidationStatus::Unrecognized, Some("DOC-12X"));
        let far = fx.add("c.pdf", ValidationStatus::Error, Some("QQQ-000"));
        let done = fx.add("d.pdf", ValidationStatus::Unrecognized, Some("DOC-123"));
        fx.engine.resolve_manually(&done.id, &fx.items[0].id).unwrap();
        let missing = Uuid::new_v4();

        let report = fx
            .engine
            .bulk_resolve(&[exact.id, close.id, far.id, done.id, missing], 0.9)
            .unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.failed, 1);

        let resolved = fx.reload(&exact.id);
        assert_eq!(resolved.status, ValidationStatus::Validated);
        assert_eq!(resolved.confidence, Some(1.0));
        assert_eq!(resolved.resolution_method, Some(ResolutionMethod::Auto));

        // Below threshold: untouched
        assert_eq!(fx.reload(&close.id).status, ValidationStatus::Unrecognized);
        assert_eq!(fx.reload(&far.id).status, ValidationStatus::Error);
        match report.items[1].outcome {
            BulkOutcome::Skipped { best_similarity: Some(best) } => assert!(best > 0.8 && best < 0.9),
            ref other => panic!("expected a skip with its best score, got {other:?}"),
        }
        assert!(matches!(report.items[4].outcome, BulkOutcome::Failed { transient: false, .. }));
    }

    #[test]
    fn bulk_resolve_ranks_marked_short_code_by_its_code() {
        let fx = Fixture::new();
        let doc = fx.add("DOC-12_B.pdf", ValidationStatus::Unrecognized, None);

        let report = fx.engine.bulk_resolve(&[doc.id], 0.8).unwrap();
        assert_eq!(report.resolved, 1);
        let doc = fx.reload(&doc.id);
        assert_eq!(doc.status, ValidationStatus::Validated);
        assert_eq!(doc.manifest_item_id, Some(fx.items[0].id));
    }

    #[test]
    fn bulk_resolve_lower_threshold_uses_similarity_as_confidence() {
        let fx = Fixture::new();
        let close = fx.add("b.pdf", ValidationStatus::Unrecognized, Some("DOC-12X"));

        let report = fx.engine.bulk_resolve(&[close.id], 0.8).unwrap();
        assert_eq!(report.resolved, 1);
        let doc = fx.reload(&close.id);
        assert_eq!(doc.status, ValidationStatus::Validated);
        let confidence = doc.confidence.unwrap();
        assert!(confidence >= 0.8 && confidence < 1.0);
    }

    #[test]
    fn bulk_resolve_requires_valid_threshold() {
        let fx = Fixture::new();
        for bad in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                fx.engine.bulk_resolve(&[], bad),
                Err(ValidationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn stale_status_is_reported_as_conflict() {
        let fx = Fixture::new();
        let doc = fx.add("a.pdf", ValidationStatus::Unrecognized, Some("DOC-124"));
        // Someone else rejects it after we read it
        fx.store
            .update_document_status(&doc.id, ValidationStatus::Unrecognized, &StatusChange::rejected("dup"))
            .unwrap();

        let change = StatusChange::resolved(fx.items[1].id, "DOC-124", 1.0, ResolutionMethod::Auto);
        let err = fx.engine.apply(&doc, &change).unwrap_err();
        assert!(matches!(err, ValidationError::Conflict(_)));
        assert_eq!(fx.reload(&doc.id).status, ValidationStatus::Error);
    }

    #[test]
    fn ocr_resolution_resolves_above_threshold() {
        let fx = Fixture::new();
        let engine = fx.engine.with_text_extractor(Arc::new(FixedText("Drawing DOC-124 rev 0")));
        let doc = {
            let mut d = ValidatedDocument::pending(engine.ctx.contract_id, "scan.pdf");
            d.status = ValidationStatus::Unrecognized;
            fx.store.create_document(&d).unwrap();
            d
        };

        match engine.resolve_with_ocr(&doc.id, b"%PDF", 0.9).unwrap() {
            OcrResolution::Resolved { document, similarity } => {
                assert_eq!(similarity, 1.0);
                assert_eq!(document.resolution_method, Some(ResolutionMethod::Ocr));
                assert_eq!(document.extracted_code.as_deref(), Some("DOC-124"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn ocr_resolution_below_threshold_records_code() {
        let fx = Fixture::new();
        let engine = fx.engine.with_text_extractor(Arc::new(FixedText("Ref DOC-125")));
        let mut doc = ValidatedDocument::pending(engine.ctx.contract_id, "scan.pdf");
        doc.status = ValidationStatus::Unrecognized;
        fx.store.create_document(&doc).unwrap();

        match engine.resolve_with_ocr(&doc.id, b"%PDF", 0.95).unwrap() {
            OcrResolution::Pending { extracted_code, candidates } => {
                assert_eq!(extracted_code.as_deref(), Some("DOC-125"));
                assert!(!candidates.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let stored = fx.store.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ValidationStatus::Unrecognized);
        assert_eq!(stored.extracted_code.as_deref(), Some("DOC-125"));
    }

    #[test]
    fn ocr_resolution_without_extractor_is_config_error() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", ValidationStatus::Unrecognized, None);
        assert!(matches!(
            fx.engine.resolve_with_ocr(&doc.id, b"", 0.9),
            Err(ValidationError::Config(_))
        ));
    }

    #[test]
    fn stats_and_unresolved_queue() {
        let fx = Fixture::new();
        let first = fx.add("a.pdf", ValidationStatus::Unrecognized, None);
        let second = fx.add("b.pdf", ValidationStatus::Error, None);
        let ok = fx.add("c.pdf", ValidationStatus::Unrecognized, None);
        fx.engine.resolve_manually(&ok.id, &fx.items[0].id).unwrap();

        let stats = fx.engine.get_resolution_stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.validated, 1);
        assert_eq!(stats.unresolved(), 2);
        assert_eq!(stats.high_confidence, 1);

        let queue = fx.engine.get_unresolved_documents().unwrap();
        assert!(queue.iter().all(|d| d.status.is_unresolved()));
        let ids: Vec<Uuid> = queue.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
