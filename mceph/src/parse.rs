//! Best-effort parsers for control-plane output.
//!
//! The cluster tools emit three output shapes: colon-delimited property
//! listings, JSON documents, and newline-delimited lists. Every extraction
//! here is an independent optional lookup; malformed or missing data leaves
//! the field unset instead of failing the read.

use serde_json::Value;

/// Find `key: value` in a property listing and return the trimmed value.
///
/// Only the first colon splits a line, so values may themselves contain
/// colons. Lines without a colon, or with a different key, contribute
/// nothing.
pub fn colon_field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then_some(v.trim())
    })
}

/// [`colon_field`] parsed as an integer.
pub fn colon_field_u32(output: &str, key: &str) -> Option<u32> {
    colon_field(output, key)?.parse().ok()
}

/// Walk nested JSON objects by literal key path.
///
/// Any absent or non-object segment ends the walk with `None`.
pub fn json_path<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |node, key| node.get(key))
}

/// Count of trimmed, non-empty lines.
///
/// Used directly as a cardinality for newline-per-item listings. A header
/// line, if the tool ever emits one, is counted too.
pub fn count_lines(output: &str) -> usize {
    output.lines().filter(|line| !line.trim().is_empty()).count()
}
