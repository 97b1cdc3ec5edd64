//! Filename normalization: extensions, revision markers, canonical codes.

use std::sync::LazyLock;

use regex::Regex;

/// Extensions accepted at upload (lowercase).
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "dwg", "dxf", "jpg", "jpeg", "png", "tif", "tiff",
];

/// Revision markers at the end of a base name, most specific first.
/// Group 1 is the marker value.
static REVISION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // _RevA, _Rev01
        Regex::new(r"(?i)_Rev([A-Z0-9]+)$").unwrap(),
        // _R1, _RA2
        Regex::new(r"(?i)_R([A-Z0-9]+)$").unwrap(),
        // _A
        Regex::new(r"(?i)_([A-Z])$").unwrap(),
        // -01
        Regex::new(r"-(\d{2})$").unwrap(),
    ]
});

/// Filename without its final extension.
///
/// A leading dot (`.hidden`) or no dot at all returns the input unchanged.
pub fn file_base_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}

/// Final extension, without the dot.
pub fn file_extension(filename: &str) -> Option<&str> {
    match filename.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < filename.len() => Some(&filename[pos + 1..]),
        _ => None,
    }
}

pub fn is_valid_extension(filename: &str) -> bool {
    file_extension(filename.trim())
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Base name with an accepted extension removed; other dotted segments survive.
fn strip_accepted_extension(filename: &str) -> &str {
    if is_valid_extension(filename) {
        file_base_name(filename)
    } else {
        filename
    }
}

/// Match of the first revision pattern against `base`: (marker start, marker value).
fn find_revision(base: &str) -> Option<(usize, &str)> {
    REVISION_PATTERNS.iter().find_map(|re| {
        re.captures(base).and_then(|caps| {
            let whole = caps.get(0)?;
            let value = caps.get(1)?;
            // A marker must leave a code in front of it.
            (whole.start() > 0).then(|| (whole.start(), value.as_str()))
        })
    })
}

/// True when the base name ends with a revision marker (`_RevA`, `_R1`, `_A`, `-01`).
pub fn has_revision_suffix(filename: &str) -> bool {
    find_revision(strip_accepted_extension(filename.trim())).is_some()
}

/// The revision marker value, uppercased (`DOC-001_RevB.pdf` → `B`).
pub fn revision_marker(filename: &str) -> Option<String> {
    find_revision(strip_accepted_extension(filename.trim())).map(|(_, value)| value.to_uppercase())
}

/// Remove one trailing revision marker, if any.
pub fn strip_revision_suffix(base: &str) -> &str {
    match find_revision(base) {
        Some((start, _)) => &base[..start],
        None => base,
    }
}

/// Successive code forms of a filename, uppercased: the base name first, then
/// one accepted extension or revision marker fewer per step.
///
/// A code such as `DOC-12` ends like a `-NN` marker, so callers try every form
/// against the manifest instead of only the last one.
pub fn code_forms(filename: &str) -> Vec<String> {
    let mut current = strip_accepted_extension(filename.trim()).trim();
    let mut forms = vec![current.to_uppercase()];
    loop {
        let next = strip_revision_suffix(strip_accepted_extension(current)).trim();
        if next == current || next.is_empty() {
            break;
        }
        current = next;
        forms.push(current.to_uppercase());
    }
    forms
}

/// Canonical document code of a filename.
///
/// Strips accepted extensions and revision markers until none remain, then
/// trims and uppercases. Applying it to its own output changes nothing.
pub fn normalize_document_code(filename: &str) -> String {
    code_forms(filename).pop().unwrap_or_default()
}

/// `base_REV.ext`, replacing the one revision marker already present.
pub fn filename_with_revision(filename: &str, revision: &str) -> String {
    let trimmed = filename.trim();
    let extension = file_extension(trimmed).filter(|_| is_valid_extension(trimmed));
    let base = strip_revision_suffix(strip_accepted_extension(trimmed));
    code_filename(base, Some(revision), extension)
}

/// `CODE[_REV][.ext]` from a manifest code. The code itself is never stripped.
pub fn code_filename(code: &str, revision: Option<&str>, extension: Option<&str>) -> String {
    let mut out = code.trim().to_string();
    if let Some(rev) = revision.map(str::trim).filter(|r| !r.is_empty()) {
        out.push('_');
        out.push_str(&rev.to_uppercase());
    }
    if let Some(ext) = extension {
        out.push('.');
        out.push_str(ext);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_only_final_extension() {
        assert_eq!(file_base_name("archive.tar.gz"), "archive.tar");
        assert_eq!(file_base_name("DOC-001.pdf"), "DOC-001");
        assert_eq!(file_base_name("README"), "README");
        assert_eq!(file_base_name(".hidden"), ".hidden");
    }

    #[test]
    fn accepted_extensions_case_insensitive() {
        assert!(is_valid_extension("plan.PDF"));
        assert!(is_valid_extension("sheet.xlsx"));
        assert!(is_valid_extension("drawing.dwg"));
        assert!(!is_valid_extension("file.exe"));
        assert!(!is_valid_extension("noextension"));
        assert!(!is_valid_extension("trailingdot."));
    }

    #[test]
    fn revision_suffix_detection() {
        assert!(has_revision_suffix("DOC-001_RevA.pdf"));
        assert!(has_revision_suffix("DOC-001-01.pdf"));
        assert!(has_revision_suffix("DOC-001_B.pdf"));
        assert!(has_revision_suffix("DOC-001_R2.pdf"));
        assert!(!has_revision_suffix("DOC-001.pdf"));
    }

    #[test]
    fn revision_marker_values() {
        assert_eq!(revision_marker("DOC-001_RevA.pdf").as_deref(), Some("A"));
        assert_eq!(revision_marker("DOC-001_rev0c.pdf").as_deref(), Some("0C"));
        assert_eq!(revision_marker("DOC-001-03.pdf").as_deref(), Some("03"));
        assert_eq!(revision_marker("DOC-001_b.pdf").as_deref(), Some("B"));
        assert_eq!(revision_marker("DOC-001.pdf"), None);
    }

    #[test]
    fn marker_alone_is_not_a_revision() {
        assert!(!has_revision_suffix("_A.pdf"));
        assert_eq!(normalize_document_code("_A.pdf"), "_A");
    }

    #[test]
    fn normalize_strips_extension_and_revision() {
        assert_eq!(normalize_document_code("doc-001_RevA.pdf"), "DOC-001");
        assert_eq!(normalize_document_code("DOC-001-01.pdf"), "DOC-001");
        assert_eq!(normalize_document_code("  plan-999.PDF "), "PLAN-999");
    }

    #[test]
    fn normalize_keeps_dotted_codes() {
        assert_eq!(normalize_document_code("PRJ.01.EL.001.pdf"), "PRJ.01.EL.001");
        assert_eq!(normalize_document_code("PRJ.01.EL.001"), "PRJ.01.EL.001");
    }

    #[test]
    fn normalize_is_idempotent() {
        for name in [
            "DOC-001_RevA.pdf",
            "doc-001.pdf.pdf",
            "DOC-001_A_B.docx",
            "PLAN-999-01-02.dwg",
            "archive.tar.gz",
            "Relatório DOC-123 Final.pdf",
            "",
            "_A",
        ] {
            let once = normalize_document_code(name);
            assert_eq!(normalize_document_code(&once), once, "input: {name:?}");
        }
    }

    #[test]
    fn filename_with_revision_replaces_marker() {
        assert_eq!(filename_with_revision("DOC-001.pdf", "b"), "DOC-001_B.pdf");
        assert_eq!(filename_with_revision("DOC-001_RevA.pdf", "B"), "DOC-001_B.pdf");
        assert_eq!(filename_with_revision("DOC-001_B.pdf", "B"), "DOC-001_B.pdf");
        assert_eq!(filename_with_revision("DOC-001", "C"), "DOC-001_C");
        assert_eq!(filename_with_revision("DOC-001-02.pdf", ""), "DOC-001.pdf");
    }

    #[test]
    fn code_forms_strip_one_marker_per_step() {
        assert_eq!(code_forms("PLAN-99_RevA.pdf"), ["PLAN-99_REVA", "PLAN-99", "PLAN"]);
        assert_eq!(code_forms("DOC-12_B.pdf"), ["DOC-12_B", "DOC-12", "DOC"]);
        assert_eq!(code_forms("doc-001.pdf.pdf"), ["DOC-001.PDF", "DOC-001"]);
        assert_eq!(code_forms("memo.pdf"), ["MEMO"]);
        assert_eq!(code_forms(""), [""]);
    }

    #[test]
    fn code_filename_keeps_codes_that_look_like_markers() {
        assert_eq!(code_filename("DOC-12", Some("b"), Some("pdf")), "DOC-12_B.pdf");
        assert_eq!(code_filename("PLAN-99", None, Some("dwg")), "PLAN-99.dwg");
        assert_eq!(code_filename("PLAN-99", Some("  "), None), "PLAN-99");
    }
}
