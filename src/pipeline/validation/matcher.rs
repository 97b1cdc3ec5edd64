//! Matching engine: one filename against a contract's manifest.
//!
//! Pure and deterministic. The same filename against the same manifest
//! always yields the same verdict.

use std::collections::HashMap;

use super::extract::{extract_filename_code, ExtractionProfile};
use super::normalize::{
    code_filename, code_forms, file_extension, has_revision_suffix, is_valid_extension,
    normalize_document_code, revision_marker, strip_revision_suffix,
};
use super::types::MatchVerdict;
use crate::models::{ManifestItem, ValidationStatus};

/// Confidence of a NEEDS_SUFFIX verdict: right document, revision marker off.
pub const NEEDS_SUFFIX_CONFIDENCE: f64 = 0.9;

/// Longest filename accepted, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Manifest items keyed by uppercase document code, and by normalized code
/// for items whose declared code ends in a `_` revision marker (`DOC-300_RevA`).
/// A trailing `-NN` is left alone: in `PLAN-99` it is part of the code.
pub struct ManifestIndex<'a> {
    items: &'a [ManifestItem],
    by_code: HashMap<String, usize>,
    by_normalized: HashMap<String, usize>,
}

impl<'a> ManifestIndex<'a> {
    pub fn new(items: &'a [ManifestItem]) -> Self {
        let mut by_code = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            // Codes are unique per contract; keep the first if that ever breaks.
            by_code.entry(item.document_code.trim().to_uppercase()).or_insert(idx);
        }
        let mut by_normalized = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            let code = item.document_code.trim();
            if !code[strip_revision_suffix(code).len()..].starts_with('_') {
                continue;
            }
            let normalized = normalize_document_code(code);
            if !by_code.contains_key(&normalized) {
                by_normalized.entry(normalized).or_insert(idx);
            }
        }
        Self {
            items,
            by_code,
            by_normalized,
        }
    }

    pub fn get(&self, code: &str) -> Option<&'a ManifestItem> {
        self.by_code
            .get(&code.trim().to_uppercase())
            .map(|&idx| &self.items[idx])
    }

    /// Item whose code, once stripped of revision markers, equals `code`.
    /// Exact codes always win over normalized ones.
    pub fn get_normalized(&self, code: &str) -> Option<&'a ManifestItem> {
        let code = code.trim().to_uppercase();
        self.get(&code)
            .or_else(|| self.by_normalized.get(&code).map(|&idx| &self.items[idx]))
    }

    pub fn items(&self) -> &'a [ManifestItem] {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn check_filename(filename: &str) -> Result<(), String> {
    if filename.is_empty() {
        return Err("Empty filename".into());
    }
    if filename.chars().any(|c| c.is_control()) {
        return Err("Filename contains control characters".into());
    }
    if filename.chars().count() > MAX_FILENAME_CHARS {
        return Err(format!("Filename exceeds {MAX_FILENAME_CHARS} characters"));
    }
    if !is_valid_extension(filename) {
        return Err(match file_extension(filename) {
            Some(ext) => format!("Unsupported file extension: .{}", ext.to_lowercase()),
            None => "Missing file extension".into(),
        });
    }
    Ok(())
}

fn validated(item: &ManifestItem, extracted_code: Option<String>) -> MatchVerdict {
    MatchVerdict {
        status: ValidationStatus::Validated,
        manifest_item_id: Some(item.id),
        matched_document_code: Some(item.document_code.clone()),
        confidence: Some(1.0),
        extracted_code,
        error_message: None,
        suggested_filename: None,
    }
}

/// Same code, revision marker present but not the one the manifest declares.
fn needs_suffix(item: &ManifestItem, filename: &str, extracted_code: Option<String>) -> MatchVerdict {
    let suggested = code_filename(
        &item.document_code,
        item.revision.as_deref(),
        file_extension(filename),
    );
    MatchVerdict {
        status: ValidationStatus::NeedsSuffix,
        manifest_item_id: Some(item.id),
        matched_document_code: Some(item.document_code.clone()),
        confidence: Some(NEEDS_SUFFIX_CONFIDENCE),
        extracted_code,
        error_message: None,
        suggested_filename: Some(suggested),
    }
}

/// Decide on a code match given the file's revision marker.
fn judge(item: &ManifestItem, filename: &str, has_suffix: bool, extracted_code: Option<String>) -> MatchVerdict {
    if !has_suffix {
        return validated(item, extracted_code);
    }
    let marker = revision_marker(filename);
    match (&item.revision, marker) {
        (Some(declared), Some(marker)) if declared.eq_ignore_ascii_case(&marker) => {
            validated(item, extracted_code)
        }
        _ => needs_suffix(item, filename, extracted_code),
    }
}

/// Evaluate one filename. Never fails: bad input becomes an ERROR verdict.
///
/// 1. Unsupported extension or malformed name → ERROR.
/// 2. Full base name equals a manifest code → VALIDATED.
/// 3. Name with one revision marker fewer at a time equals a code, or the
///    fully stripped name equals a marked code's normalized form → VALIDATED
///    when the marker is the declared revision (or absent), NEEDS_SUFFIX
///    otherwise.
/// 4. No code extractable → UNRECOGNIZED.
/// 5. Extracted code equals a manifest code → same rule as 3.
/// 6. Otherwise UNRECOGNIZED, keeping the extracted code for ranking.
pub fn evaluate_filename(
    filename: &str,
    manifest: &ManifestIndex<'_>,
    profile: Option<&ExtractionProfile>,
) -> MatchVerdict {
    let filename = filename.trim();
    if let Err(message) = check_filename(filename) {
        return MatchVerdict::error(message);
    }

    let mut forms = code_forms(filename).into_iter();
    let extracted = extract_filename_code(profile, filename);
    let has_suffix = has_revision_suffix(filename);

    let Some(base) = forms.next() else {
        return MatchVerdict::unrecognized(extracted);
    };
    if let Some(item) = manifest.get(&base) {
        return validated(item, extracted.or(Some(base)));
    }
    // DOC-12_B.pdf must reach DOC-12 before DOC-12 is itself stripped to DOC.
    let mut last = base;
    for form in forms {
        if let Some(item) = manifest.get(&form) {
            return judge(item, filename, has_suffix, extracted.or(Some(form)));
        }
        last = form;
    }
    if let Some(item) = manifest.get_normalized(&last) {
        return judge(item, filename, has_suffix, extracted.or(Some(last)));
    }

    let Some(code) = extracted else {
        return MatchVerdict::unrecognized(None);
    };
    match manifest.get(&code) {
        Some(item) => judge(item, filename, has_suffix, Some(code)),
        None => MatchVerdict::unrecognized(Some(code)),
    }
}
