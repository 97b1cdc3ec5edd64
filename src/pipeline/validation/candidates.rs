//! Candidate ranking for documents without an exact manifest match.

use std::cmp::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use super::error::ValidationError;
use super::extract::extract_filename_code;
use super::normalize::code_forms;
use super::similarity::calculate_similarity;
use super::traits::{DocumentStore, ManifestSource};
use super::types::{CandidateQuery, ContractContext, ResolutionCandidate};
use crate::config::ValidatorConfig;
use crate::models::{CandidateSource, ManifestItem, ValidatedDocument};

/// Score `code` against `items` and keep the best `limit`.
///
/// Descending similarity; equal scores keep manifest order.
pub fn rank_candidates(
    code: &str,
    items: &[ManifestItem],
    limit: usize,
    min_similarity: f64,
    source: CandidateSource,
) -> Vec<ResolutionCandidate> {
    let mut candidates: Vec<ResolutionCandidate> = items
        .iter()
        .map(|item| ResolutionCandidate {
            manifest_item_id: item.id,
            document_code: item.document_code.clone(),
            title: item.title.clone(),
            similarity: calculate_similarity(code, &item.document_code),
            source,
        })
        .filter(|c| c.similarity >= min_similarity)
        .collect();

    // sort_by is stable: ties stay in insertion order.
    candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    candidates.truncate(limit);
    candidates
}

/// The code a document is ranked by, and where it came from.
///
/// Stored extracted code first, then a code extracted from the filename,
/// then the unstripped base name itself.
pub fn ranking_code(doc: &ValidatedDocument, ctx: &ContractContext) -> (String, CandidateSource) {
    if let Some(code) = doc.extracted_code.as_deref().filter(|c| !c.trim().is_empty()) {
        return (code.to_string(), CandidateSource::Extraction);
    }
    let code = extract_filename_code(ctx.profile.as_ref(), &doc.filename)
        .or_else(|| code_forms(&doc.filename).into_iter().next())
        .unwrap_or_default();
    (code, CandidateSource::Filename)
}

pub struct CandidateRanker {
    ctx: ContractContext,
    manifest: Arc<dyn ManifestSource>,
    documents: Arc<dyn DocumentStore>,
    default_limit: usize,
    min_similarity: f64,
}

impl CandidateRanker {
    pub fn new(
        ctx: ContractContext,
        config: &ValidatorConfig,
        manifest: Arc<dyn ManifestSource>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            ctx,
            manifest,
            documents,
            default_limit: config.candidate_limit,
            min_similarity: config.min_candidate_similarity,
        }
    }

    /// Load a document of this contract. Documents of other contracts are not visible.
    pub(crate) fn load_document(&self, id: &Uuid) -> Result<ValidatedDocument, ValidationError> {
        match self.documents.get_document(id)? {
            Some(doc) if doc.contract_id == self.ctx.contract_id => Ok(doc),
            _ => Err(ValidationError::not_found("ValidatedDocument", id)),
        }
    }

    /// Ranked manifest candidates for a document.
    pub fn get_candidates(
        &self,
        document_id: &Uuid,
        query: &CandidateQuery,
    ) -> Result<Vec<ResolutionCandidate>, ValidationError> {
        let doc = self.load_document(document_id)?;
        self.candidates_for_document(&doc, query)
    }

    pub fn candidates_for_document(
        &self,
        doc: &ValidatedDocument,
        query: &CandidateQuery,
    ) -> Result<Vec<ResolutionCandidate>, ValidationError> {
        let (code, source) = ranking_code(doc, &self.ctx);
        self.candidates_for_code(&code, source, query)
    }

    /// Rank an arbitrary code, e.g. one read by OCR.
    pub fn candidates_for_code(
        &self,
        code: &str,
        source: CandidateSource,
        query: &CandidateQuery,
    ) -> Result<Vec<ResolutionCandidate>, ValidationError> {
        let limit = query.limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let search = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let (items, source) = match search {
            Some(q) => (
                self.manifest.search_manifest_items(&self.ctx.contract_id, q)?,
                CandidateSource::Search,
            ),
            None => (self.manifest.list_manifest_items(&self.ctx.contract_id)?, source),
        };

        let candidates = rank_candidates(code, &items, limit, self.min_similarity, source);
        tracing::debug!(
            code,
            considered = items.len(),
            returned = candidates.len(),
            "Candidates ranked"
        );
        Ok(candidates)
    }
}
