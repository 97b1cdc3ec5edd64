//! Document code extraction from filenames and OCR text.
//!
//! Patterns are tried in order; the first one that matches anywhere wins, and
//! within a pattern the leftmost match wins. Extraction profiles put
//! contract-specific patterns in front of the defaults.

use std::sync::LazyLock;

use regex::Regex;

use super::error::ValidationError;
use super::normalize::code_forms;
use crate::config::PatternConfig;

/// How a pattern's match is turned into a canonical code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Canonical {
    /// Capture group 1 (or the whole match), uppercased.
    FirstGroup,
    /// All capture groups joined with `-`, uppercased.
    JoinGroups,
}

#[derive(Debug, Clone)]
pub struct CodePattern {
    name: String,
    regex: Regex,
    priority: i32,
    canonical: Canonical,
}

impl CodePattern {
    fn builtin(name: &str, pattern: &str, canonical: Canonical) -> Self {
        Self {
            name: name.to_string(),
            regex: Regex::new(pattern).unwrap(),
            priority: 0,
            canonical,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, text: &str) -> Option<String> {
        let caps = self.regex.captures(text)?;
        let code = match self.canonical {
            Canonical::FirstGroup => caps.get(1).or_else(|| caps.get(0))?.as_str().to_string(),
            Canonical::JoinGroups => caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("-"),
        };
        let code = code.trim().to_uppercase();
        (!code.is_empty()).then_some(code)
    }
}

/// Built-in patterns, most specific first. The last one is the generic
/// `PREFIX-NUMBER` rule (2+ letters, dash or space, 2+ digits).
static DEFAULT_PATTERNS: LazyLock<Vec<CodePattern>> = LazyLock::new(|| {
    vec![
        // ABC-DEF-GHI-0001
        CodePattern::builtin(
            "multi_segment",
            r"(?i)\b([A-Z]{2,4}-[A-Z]{2,4}-[A-Z]{2,4}-\d{3,4})\b",
            Canonical::FirstGroup,
        ),
        // PRJ.01.EL.001
        CodePattern::builtin(
            "dotted",
            r"(?i)\b([A-Z]{2,4}\.\d{2}\.[A-Z]{2}\.\d{3,4})\b",
            Canonical::FirstGroup,
        ),
        // AB-1234-CD-001
        CodePattern::builtin(
            "numbered_discipline",
            r"(?i)\b([A-Z]{2}-\d{4}-[A-Z]{2}-\d{3})\b",
            Canonical::FirstGroup,
        ),
        CodePattern::builtin("generic", r"(?i)\b([A-Z]{2,})[- ](\d{2,})\b", Canonical::JoinGroups),
    ]
});

/// A named, ordered set of contract-specific code patterns.
#[derive(Debug, Clone)]
pub struct ExtractionProfile {
    name: String,
    patterns: Vec<CodePattern>,
}

impl ExtractionProfile {
    /// Compile a profile; patterns are ordered by ascending priority.
    pub fn from_config(name: &str, patterns: &[PatternConfig]) -> Result<Self, ValidationError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            let regex = Regex::new(&p.pattern).map_err(|e| {
                ValidationError::Config(format!("profile {name}, pattern {}: {e}", p.name))
            })?;
            compiled.push(CodePattern {
                name: p.name.clone(),
                regex,
                priority: p.priority,
                canonical: Canonical::FirstGroup,
            });
        }
        // Stable: equal priorities keep their configured order.
        compiled.sort_by_key(|p| p.priority);
        Ok(Self {
            name: name.to_string(),
            patterns: compiled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[CodePattern] {
        &self.patterns
    }
}

/// Derive a document code from a filename or OCR text.
///
/// `profile` patterns are tried before the defaults. `None` means no code
/// was found; absence is never an error.
pub fn extract_document_code(profile: Option<&ExtractionProfile>, text: &str) -> Option<String> {
    let overrides = profile.map(|p| p.patterns.as_slice()).unwrap_or(&[]);
    overrides
        .iter()
        .chain(DEFAULT_PATTERNS.iter())
        .find_map(|pattern| pattern.extract(text))
}

/// Code of a filename, tried on the full base name first and then with one
/// revision marker fewer at a time. `DOC-12_B.pdf` yields `DOC-12`.
pub fn extract_filename_code(profile: Option<&ExtractionProfile>, filename: &str) -> Option<String> {
    code_forms(filename)
        .iter()
        .find_map(|form| extract_document_code(profile, form))
}

/// Name of the pattern that would extract a code, for diagnostics.
pub fn matching_pattern<'a>(profile: Option<&'a ExtractionProfile>, text: &str) -> Option<&'a str> {
    let overrides = profile.map(|p| p.patterns.as_slice()).unwrap_or(&[]);
    overrides
        .iter()
        .chain(DEFAULT_PATTERNS.iter())
        .find(|pattern| pattern.extract(text).is_some())
        .map(|pattern| pattern.name())
}
