//! Finding aggregation: deduplication and deterministic ordering.

use std::collections::HashSet;

use crate::domain::Finding;

/// Collapse exact duplicates by the stable key
/// `(rule_id, file, line, snippet)`, preserving first occurrence.
///
/// Idempotent: running it over an already-deduplicated list is a no-op.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, String, usize, String)> = HashSet::new();
    let mut unique = Vec::with_capacity(findings.len());
    for finding in findings {
        let key = (
            finding.rule_id.clone(),
            finding.file.clone(),
            finding.line,
            finding.snippet.clone(),
        );
        if seen.insert(key) {
            unique.push(finding);
        }
    }
    unique
}

/// Sort findings into the deterministic presentation order: severity
/// (critical first), then source priority (external analyzers before
/// internal rules), then file path, line, and rule id as total-order
/// tie-breakers.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then(a.source.rank().cmp(&b.source.rank()))
            .then_with(|| a.file.cmp(&b.file))
            .then(a.line.cmp(&b.line))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}
