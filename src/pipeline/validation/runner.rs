//! Upload validation runs: evaluate a set of files, persist one document each.
//!
//! Every file is isolated. A failure to hash, OCR or persist one file is
//! recorded on that file's outcome and the run continues.

use std::sync::Arc;
use std::time::Instant;

use super::error::ValidationError;
use super::events::{EventSink, ValidatorEvent};
use super::extract::extract_document_code;
use super::hash::content_hash;
use super::matcher::{evaluate_filename, ManifestIndex};
use super::normalize::{code_filename, file_extension, revision_marker};
use super::traits::{DocumentStore, ManifestSource, TextExtractor};
use super::types::{ContractContext, FileOutcome, MatchVerdict, UploadedFile, ValidationRunSummary};
use crate::models::{ValidatedDocument, ValidationStatus};

pub struct ValidationRunner {
    ctx: ContractContext,
    manifest: Arc<dyn ManifestSource>,
    documents: Arc<dyn DocumentStore>,
    ocr: Option<Arc<dyn TextExtractor>>,
    events: EventSink,
}

impl ValidationRunner {
    pub fn new(
        ctx: ContractContext,
        manifest: Arc<dyn ManifestSource>,
        documents: Arc<dyn DocumentStore>,
        events: EventSink,
    ) -> Self {
        Self {
            ctx,
            manifest,
            documents,
            ocr: None,
            events,
        }
    }

    /// Enable OCR correction of unrecognized uploads that carry bytes.
    pub fn with_text_extractor(mut self, ocr: Arc<dyn TextExtractor>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Evaluate and store every file.
    ///
    /// Fails only when the manifest cannot be read; per-file problems are
    /// reported in the summary.
    pub fn validate_files(&self, files: &[UploadedFile]) -> Result<ValidationRunSummary, ValidationError> {
        let started = Instant::now();
        let contract_id = self.ctx.contract_id;
        self.events.emit(ValidatorEvent::ValidationStarted {
            contract_id,
            file_count: files.len() as u32,
        });

        let items = self.manifest.list_manifest_items(&contract_id)?;
        let index = ManifestIndex::new(&items);

        let mut summary = ValidationRunSummary::default();
        for file in files {
            summary.record(self.process_file(file, &index));
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            contract_id = %contract_id,
            total = summary.total,
            validated = summary.validated,
            needs_suffix = summary.needs_suffix,
            unrecognized = summary.unrecognized,
            errors = summary.errors,
            duplicates = summary.duplicates,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Validation run complete"
        );
        self.events.emit(ValidatorEvent::ValidationCompleted {
            contract_id,
            total: summary.total,
            validated: summary.validated,
            needs_suffix: summary.needs_suffix,
            unrecognized: summary.unrecognized,
            errors: summary.errors,
            duplicates: summary.duplicates,
        });

        Ok(summary)
    }

    /// Evaluate a single file against the current manifest.
    pub fn validate_file(&self, file: &UploadedFile) -> Result<FileOutcome, ValidationError> {
        let items = self.manifest.list_manifest_items(&self.ctx.contract_id)?;
        Ok(self.process_file(file, &ManifestIndex::new(&items)))
    }

    fn process_file(&self, file: &UploadedFile, index: &ManifestIndex<'_>) -> FileOutcome {
        let file_hash = file.bytes.as_deref().map(content_hash);

        if let Some(hash) = &file_hash {
            match self.documents.find_by_hash(&self.ctx.contract_id, hash) {
                Ok(Some(existing)) => {
                    tracing::debug!(
                        filename = %file.filename,
                        existing_id = %existing.id,
                        "Duplicate upload skipped"
                    );
                    return FileOutcome::Duplicate {
                        filename: file.filename.clone(),
                        existing_id: existing.id,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(filename = %file.filename, error = %e, "Duplicate check failed");
                    return FileOutcome::Failed {
                        filename: file.filename.clone(),
                        error: e.to_string(),
                    };
                }
            }
        }

        let mut verdict = evaluate_filename(&file.filename, index, self.ctx.profile.as_ref());
        let mut corrected_name = None;
        if verdict.status == ValidationStatus::Unrecognized {
            if let Some((name, better)) = self.ocr_correction(file, index) {
                corrected_name = Some(name);
                verdict = better;
            }
        }

        let doc = self.build_document(file, corrected_name, file_hash, &verdict);
        tracing::debug!(
            filename = %doc.filename,
            status = doc.status.as_str(),
            extracted_code = ?doc.extracted_code,
            "File evaluated"
        );

        match self.documents.create_document(&doc) {
            Ok(()) => FileOutcome::Stored {
                document: doc,
                suggested_filename: verdict.suggested_filename,
            },
            Err(e) => {
                tracing::warn!(filename = %file.filename, error = %e, "Failed to persist verdict");
                FileOutcome::Failed {
                    filename: file.filename.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Read the code from file content; use it when it names a manifest item.
    fn ocr_correction(&self, file: &UploadedFile, index: &ManifestIndex<'_>) -> Option<(String, MatchVerdict)> {
        let ocr = self.ocr.as_ref()?;
        let bytes = file.bytes.as_deref()?;

        let text = match ocr.extract_text(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(filename = %file.filename, error = %e, "OCR failed, keeping filename verdict");
                return None;
            }
        };
        let code = extract_document_code(self.ctx.profile.as_ref(), &text)?;
        let item = index.get(&code)?;

        let name = code_filename(
            &item.document_code,
            revision_marker(&file.filename).as_deref(),
            file_extension(file.filename.trim()),
        );

        let verdict = evaluate_filename(&name, index, self.ctx.profile.as_ref());
        if matches!(verdict.status, ValidationStatus::Validated | ValidationStatus::NeedsSuffix) {
            tracing::info!(
                filename = %file.filename,
                corrected = %name,
                "Filename corrected from document content"
            );
            Some((name, verdict))
        } else {
            None
        }
    }

    fn build_document(
        &self,
        file: &UploadedFile,
        corrected_name: Option<String>,
        file_hash: Option<String>,
        verdict: &MatchVerdict,
    ) -> ValidatedDocument {
        let original = file.filename.trim();
        let mut doc = ValidatedDocument::pending(
            self.ctx.contract_id,
            corrected_name.as_deref().unwrap_or(original),
        );
        if corrected_name.is_some() {
            doc.original_filename = Some(original.to_string());
        }
        doc.file_hash = file_hash;
        doc.status = verdict.status;
        doc.manifest_item_id = verdict.manifest_item_id;
        doc.confidence = verdict.confidence;
        doc.matched_document_code = verdict.matched_document_code.clone();
        doc.extracted_code = verdict.extracted_code.clone();
        doc.error_message = verdict.error_message.clone();
        doc
    }
}
