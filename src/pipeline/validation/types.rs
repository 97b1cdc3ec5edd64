//! Data types shared by the validation pipeline.

use serde::Serialize;
use uuid::Uuid;

use super::extract::ExtractionProfile;
use crate::models::{BatchCounts, CandidateSource, ValidatedDocument, ValidationBatch, ValidationStatus};

/// The contract an engine instance operates on.
#[derive(Debug, Clone)]
pub struct ContractContext {
    pub contract_id: Uuid,
    /// Short code embedded in generated GRDT numbers.
    pub contract_code: String,
    /// Contract-specific extraction patterns, if any.
    pub profile: Option<ExtractionProfile>,
}

impl ContractContext {
    pub fn new(contract_id: Uuid, contract_code: &str) -> Self {
        Self {
            contract_id,
            contract_code: contract_code.to_string(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: ExtractionProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Matching
// ═══════════════════════════════════════════════════════════

/// Verdict of the matching engine for one filename.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchVerdict {
    pub status: ValidationStatus,
    pub manifest_item_id: Option<Uuid>,
    pub matched_document_code: Option<String>,
    pub confidence: Option<f64>,
    /// Code derived from the filename, kept even when nothing matched.
    pub extracted_code: Option<String>,
    pub error_message: Option<String>,
    /// For NEEDS_SUFFIX: the filename the manifest expects.
    pub suggested_filename: Option<String>,
}

impl MatchVerdict {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Error,
            manifest_item_id: None,
            matched_document_code: None,
            confidence: None,
            extracted_code: None,
            error_message: Some(message.into()),
            suggested_filename: None,
        }
    }

    pub fn unrecognized(extracted_code: Option<String>) -> Self {
        Self {
            status: ValidationStatus::Unrecognized,
            manifest_item_id: None,
            matched_document_code: None,
            confidence: None,
            extracted_code,
            error_message: None,
            suggested_filename: None,
        }
    }
}

/// One uploaded file. Bytes are optional: without them no hash or OCR is done.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Option<Vec<u8>>,
}

impl UploadedFile {
    pub fn named(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            bytes: None,
        }
    }

    pub fn with_bytes(filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            bytes: Some(bytes),
        }
    }
}

/// Result of one file in a validation run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// A document was stored with the given verdict.
    Stored {
        document: ValidatedDocument,
        suggested_filename: Option<String>,
    },
    /// Same content already uploaded to this contract; nothing stored.
    Duplicate { filename: String, existing_id: Uuid },
    /// The verdict could not be persisted; retry later.
    Failed { filename: String, error: String },
}

impl FileOutcome {
    pub fn filename(&self) -> &str {
        match self {
            Self::Stored { document, .. } => document.original_filename.as_deref().unwrap_or(&document.filename),
            Self::Duplicate { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn status(&self) -> Option<ValidationStatus> {
        match self {
            Self::Stored { document, .. } => Some(document.status),
            _ => None,
        }
    }
}

/// Summary of a `validate_files` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationRunSummary {
    pub total: u32,
    pub validated: u32,
    pub needs_suffix: u32,
    pub unrecognized: u32,
    pub errors: u32,
    pub duplicates: u32,
    pub failed: u32,
    pub duration_ms: u64,
    pub outcomes: Vec<FileOutcome>,
}

impl ValidationRunSummary {
    pub(crate) fn record(&mut self, outcome: FileOutcome) {
        self.total += 1;
        match &outcome {
            FileOutcome::Stored { document, .. } => match document.status {
                ValidationStatus::Validated => self.validated += 1,
                ValidationStatus::NeedsSuffix => self.needs_suffix += 1,
                ValidationStatus::Unrecognized => self.unrecognized += 1,
                ValidationStatus::Error | ValidationStatus::Pending => self.errors += 1,
            },
            FileOutcome::Duplicate { .. } => self.duplicates += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

// ═══════════════════════════════════════════════════════════
// Candidates and resolution
// ═══════════════════════════════════════════════════════════

/// A manifest item proposed for an unresolved document. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionCandidate {
    pub manifest_item_id: Uuid,
    pub document_code: String,
    pub title: String,
    pub similarity: f64,
    pub source: CandidateSource,
}

/// Options of a candidate ranking call.
#[derive(Debug, Clone, Default)]
pub struct CandidateQuery {
    /// Falls back to the configured candidate limit.
    pub limit: Option<usize>,
    /// Narrows the manifest to items whose code or title contains this text.
    pub query: Option<String>,
}

impl CandidateQuery {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            query: None,
        }
    }

    pub fn search(query: &str) -> Self {
        Self {
            limit: None,
            query: Some(query.to_string()),
        }
    }
}

/// Outcome of resolving a single document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved { document: ValidatedDocument },
    /// Already VALIDATED and not forced: nothing written.
    AlreadyResolved { document: ValidatedDocument },
}

impl ResolveOutcome {
    pub fn document(&self) -> &ValidatedDocument {
        match self {
            Self::Resolved { document } | Self::AlreadyResolved { document } => document,
        }
    }
}

/// Per-document outcome of a bulk resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
    Resolved {
        manifest_item_id: Uuid,
        document_code: String,
        similarity: f64,
    },
    /// Top candidate below threshold (or none); the document is untouched.
    Skipped { best_similarity: Option<f64> },
    AlreadyResolved,
    Failed { error: String, transient: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemOutcome {
    pub document_id: Uuid,
    pub outcome: BulkOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkResolveReport {
    pub resolved: u32,
    pub skipped: u32,
    pub failed: u32,
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResolveReport {
    pub(crate) fn record(&mut self, document_id: Uuid, outcome: BulkOutcome) {
        match &outcome {
            BulkOutcome::Resolved { .. } => self.resolved += 1,
            BulkOutcome::Skipped { .. } | BulkOutcome::AlreadyResolved => self.skipped += 1,
            BulkOutcome::Failed { .. } => self.failed += 1,
        }
        self.items.push(BulkItemOutcome { document_id, outcome });
    }
}

/// Outcome of OCR-assisted resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OcrResolution {
    Resolved {
        document: ValidatedDocument,
        similarity: f64,
    },
    /// Below threshold; candidates are returned for manual review.
    Pending {
        extracted_code: Option<String>,
        candidates: Vec<ResolutionCandidate>,
    },
    AlreadyResolved { document: ValidatedDocument },
}

/// Document counts derived from current statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub total: u32,
    pub pending: u32,
    pub validated: u32,
    pub needs_suffix: u32,
    pub unrecognized: u32,
    pub error: u32,
    /// Confidence >= 0.9
    pub high_confidence: u32,
    /// 0.7 <= confidence < 0.9
    pub medium_confidence: u32,
    /// Confidence < 0.7
    pub low_confidence: u32,
}

impl ResolutionStats {
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a ValidatedDocument>) -> Self {
        let mut stats = Self::default();
        for doc in documents {
            stats.total += 1;
            match doc.status {
                ValidationStatus::Pending => stats.pending += 1,
                ValidationStatus::Validated => stats.validated += 1,
                ValidationStatus::NeedsSuffix => stats.needs_suffix += 1,
                ValidationStatus::Unrecognized => stats.unrecognized += 1,
                ValidationStatus::Error => stats.error += 1,
            }
            match doc.confidence {
                Some(c) if c >= 0.9 => stats.high_confidence += 1,
                Some(c) if c >= 0.7 => stats.medium_confidence += 1,
                Some(_) => stats.low_confidence += 1,
                None => {}
            }
        }
        stats
    }

    /// Documents still waiting for a human or automatic decision.
    pub fn unresolved(&self) -> u32 {
        self.unrecognized + self.error
    }
}

// ═══════════════════════════════════════════════════════════
// Batches
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoGroupResult {
    pub batches_created: u32,
    pub documents_assigned: u32,
    pub batch_ids: Vec<Uuid>,
}

/// A batch with its current members and live counts.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    pub batch: ValidationBatch,
    /// Ordered by filename.
    pub documents: Vec<ValidatedDocument>,
    /// Computed now; `batch.counts` stays frozen once finalized.
    pub live_counts: BatchCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(status: ValidationStatus, confidence: Option<f64>) -> ValidatedDocument {
        let mut d = ValidatedDocument::pending(Uuid::new_v4(), "x.pdf");
        d.status = status;
        d.confidence = confidence;
        d
    }

    #[test]
    fn stats_bucket_confidence() {
        let docs = vec![
            doc(ValidationStatus::Validated, Some(1.0)),
            doc(ValidationStatus::Validated, Some(0.9)),
            doc(ValidationStatus::Validated, Some(0.75)),
            doc(ValidationStatus::NeedsSuffix, Some(0.5)),
            doc(ValidationStatus::Unrecognized, None),
            doc(ValidationStatus::Error, None),
        ];
        let stats = ResolutionStats::from_documents(&docs);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.validated, 3);
        assert_eq!(stats.high_confidence, 2);
        assert_eq!(stats.medium_confidence, 1);
        assert_eq!(stats.low_confidence, 1);
        assert_eq!(stats.unresolved(), 2);
    }

    #[test]
    fn run_summary_counts_outcomes() {
        let mut summary = ValidationRunSummary::default();
        summary.record(FileOutcome::Stored {
            document: doc(ValidationStatus::Validated, Some(1.0)),
            suggested_filename: None,
        });
        summary.record(FileOutcome::Duplicate {
            filename: "a.pdf".into(),
            existing_id: Uuid::new_v4(),
        });
        summary.record(FileOutcome::Failed {
            filename: "b.pdf".into(),
            error: "busy".into(),
        });
        assert_eq!(summary.total, 3);
        assert_eq!(summary.validated, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[1].filename(), "a.pdf");
    }

    #[test]
    fn bulk_report_counts() {
        let mut report = BulkResolveReport::default();
        report.record(Uuid::new_v4(), BulkOutcome::Skipped { best_similarity: Some(0.5) });
        report.record(Uuid::new_v4(), BulkOutcome::AlreadyResolved);
        report.record(
            Uuid::new_v4(),
            BulkOutcome::Failed { error: "missing".into(), transient: false },
        );
        assert_eq!((report.resolved, report.skipped, report.failed), (0, 2, 1));
        assert_eq!(report.items.len(), 3);
    }
}
