//! Include markers
//!
//! Finds `<!-- include(./path/to/file.apib) -->` placeholders in an entry
//! document. Only the entry document is scanned; fragments are inlined as-is.

use std::sync::LazyLock;

use regex::Regex;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\sinclude\((.*)\)\s-->").expect("include marker pattern is valid")
});

/// A single include placeholder found in the entry document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeMarker {
    /// The full marker text, replaced verbatim when rendering
    pub text: String,
    /// The referenced path, as written in the marker
    pub path: String,
    /// Byte offset of the marker in the scanned text
    pub offset: usize,
}

/// Find all include markers in document order
pub fn find_markers(text: &str) -> Vec<IncludeMarker> {
    MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let path = caps.get(1)?;
            Some(IncludeMarker {
                text: whole.as_str().to_string(),
                path: path.as_str().to_string(),
                offset: whole.start(),
            })
        })
        .collect()
}

/// The compiled marker pattern, shared with the renderer
pub(crate) fn marker_regex() -> &'static Regex {
    &MARKER_RE
}
