//! Static risk scan over wrapped script source.

use std::sync::LazyLock;

use regex::Regex;

static DUNDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__[a-z]+__").expect("dunder pattern is valid"));

/// Result of scanning a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Distinct dunder-style names, in order of first appearance.
    pub findings: Vec<String>,
}

impl ScanReport {
    /// Whether an operator must approve the script before it runs.
    pub fn review_needed(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Scan `source` for dunder-style names (`__name__`).
pub fn scan(source: &str) -> ScanReport {
    let mut findings: Vec<String> = Vec::new();
    for hit in DUNDER.find_iter(source) {
        if !findings.iter().any(|f| f == hit.as_str()) {
            findings.push(hit.as_str().to_string());
        }
    }
    ScanReport { findings }
}
