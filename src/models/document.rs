use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ResolutionMethod, ValidationStatus};

/// An uploaded file and its current validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatedDocument {
    pub id: Uuid,
    pub contract_id: Uuid,
    /// Filename as evaluated (after OCR correction, if any).
    pub filename: String,
    /// Set when OCR correction replaced the uploaded name.
    pub original_filename: Option<String>,
    /// Base64 SHA-256 of the uploaded bytes, when bytes were provided.
    pub file_hash: Option<String>,
    pub status: ValidationStatus,
    pub manifest_item_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub confidence: Option<f64>,
    pub matched_document_code: Option<String>,
    /// Code derived from the filename or OCR text, kept for candidate ranking.
    pub extracted_code: Option<String>,
    pub error_message: Option<String>,
    pub resolution_method: Option<ResolutionMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValidatedDocument {
    /// A placeholder awaiting evaluation.
    pub fn pending(contract_id: Uuid, filename: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contract_id,
            filename: filename.to_string(),
            original_filename: None,
            file_hash: None,
            status: ValidationStatus::Pending,
            manifest_item_id: None,
            batch_id: None,
            confidence: None,
            matched_document_code: None,
            extracted_code: None,
            error_message: None,
            resolution_method: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Full replacement of the verdict fields of a document.
///
/// Applied only if the stored status still equals the status the caller read.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: ValidationStatus,
    pub manifest_item_id: Option<Uuid>,
    pub confidence: Option<f64>,
    pub matched_document_code: Option<String>,
    pub error_message: Option<String>,
    pub resolution_method: Option<ResolutionMethod>,
    /// `None` keeps the stored extracted code.
    pub extracted_code: Option<String>,
}

impl StatusChange {
    pub fn resolved(
        manifest_item_id: Uuid,
        document_code: &str,
        confidence: f64,
        method: ResolutionMethod,
    ) -> Self {
        Self {
            status: ValidationStatus::Validated,
            manifest_item_id: Some(manifest_item_id),
            confidence: Some(confidence),
            matched_document_code: Some(document_code.to_string()),
            error_message: None,
            resolution_method: Some(method),
            extracted_code: None,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            status: ValidationStatus::Error,
            manifest_item_id: None,
            confidence: None,
            matched_document_code: None,
            error_message: Some(reason.to_string()),
            resolution_method: Some(ResolutionMethod::Manual),
            extracted_code: None,
        }
    }
}
