//! Rule text codec
//!
//! Serializes a rule matrix to newline-delimited text, one rule per line:
//! `<source> <destination> <kind> <action>`. The parser is tolerant: blank
//! lines and malformed lines are skipped, parsing continues.

use crate::matrix::RuleMatrix;
use crate::types::RuleAction;

/// Serialize a matrix to rule text. Lines are sorted so the same matrix
/// always produces the same text, keeping backups diffable. Explicit
/// no-op entries are equivalent to absence and are not emitted.
pub fn serialize<A: RuleAction>(matrix: &RuleMatrix<A>) -> String {
    let mut lines: Vec<String> = matrix
        .iter()
        .filter(|(_, action)| !action.is_noop())
        .map(|(triple, action)| {
            format!(
                "{} {} {} {}",
                triple.source.as_token(),
                triple.destination.as_token(),
                triple.kind.as_token(),
                action.as_token()
            )
        })
        .collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// Parse rule text into a fresh matrix. Lines that do not belong to this
/// matrix kind are skipped silently; the result is clean (not dirty).
pub fn parse<A: RuleAction>(text: &str) -> RuleMatrix<A> {
    let mut matrix = RuleMatrix::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if !matrix.add_from_parts(&parts) {
            log::debug!("skipping unparsable rule line: {line:?}");
        }
    }
    matrix.mark_clean();
    matrix
}

// =============================================================================
// Tests
// =============================================================================
