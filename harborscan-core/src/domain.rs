//! Domain entities for HarborScan.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Version string stamped into every report.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Severity of a finding, ordered from worst to least severe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Exploitable or secret-exposing issue.
    Critical,
    /// Serious issue that usually warrants rejection.
    High,
    /// Issue that deserves review.
    Medium,
    /// Informational or stylistic issue.
    Low,
}

impl Severity {
    /// Sort rank: lower is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    /// Stable label used in summaries and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Where a finding was produced.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    /// Produced by an independent external analyzer.
    External,
    /// Produced by the built-in pattern rules.
    Rules,
}

impl FindingSource {
    /// Sort rank: external analyzer findings present before rule findings.
    pub fn rank(&self) -> u8 {
        match self {
            FindingSource::External => 0,
            FindingSource::Rules => 1,
        }
    }
}

/// A single detected issue with severity, location, and remediation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Stable identifier of the rule or analyzer check that fired.
    pub rule_id: String,
    /// Severity bucket.
    pub severity: Severity,
    /// Human-readable summary of the issue.
    pub title: String,
    /// Path of the file the issue was found in.
    pub file: String,
    /// 1-based line number of the match.
    pub line: usize,
    /// Matched text, truncated to 200 characters.
    pub snippet: String,
    /// Remediation guidance.
    pub recommendation: String,
    /// Which layer of the pipeline produced the finding.
    pub source: FindingSource,
}

/// Counts of findings by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeveritySummary {
    /// Number of critical findings.
    pub critical: usize,
    /// Number of high findings.
    pub high: usize,
    /// Number of medium findings.
    pub medium: usize,
    /// Number of low findings.
    pub low: usize,
}

impl SeveritySummary {
    /// Tally a finding slice into per-severity counts.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        summary
    }

    /// Total number of findings across all severities.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Status of one analyzer invocation, independent of the others.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScannerStatus {
    /// Analyzer ran and reported results.
    Ok,
    /// Analyzer could not run or produced unusable output.
    Failed,
    /// Analyzer was intentionally not run.
    Skipped,
}

impl ScannerStatus {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerStatus::Ok => "ok",
            ScannerStatus::Failed => "failed",
            ScannerStatus::Skipped => "skipped",
        }
    }

    /// Worse of two statuses; `failed` dominates, then `skipped`.
    pub fn worst(self, other: Self) -> Self {
        fn badness(status: ScannerStatus) -> u8 {
            match status {
                ScannerStatus::Failed => 2,
                ScannerStatus::Skipped => 1,
                ScannerStatus::Ok => 0,
            }
        }
        if badness(other) > badness(self) { other } else { self }
    }

    /// Worst status in a set of per-file verdicts; empty sets are `ok`.
    pub fn worst_of(statuses: &[Self]) -> Self {
        statuses
            .iter()
            .fold(ScannerStatus::Ok, |acc, status| acc.worst(*status))
    }
}

/// How the prompt-injection capability produced its verdicts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// A successful call to the remote detection provider.
    External,
    /// The local heuristic fallback.
    Local,
}

/// Record of one analyzer invocation for scan metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScannerOutcome {
    /// Analyzer name.
    pub name: String,
    /// Invocation status.
    pub status: ScannerStatus,
    /// Number of findings the analyzer contributed.
    pub finding_count: usize,
    /// Machine-readable error code when the analyzer failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable detail when the analyzer failed or was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Detection method, reported by the prompt-injection capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<DetectionMethod>,
}

impl ScannerOutcome {
    /// Outcome for an analyzer that ran successfully.
    pub fn ok(name: impl Into<String>, finding_count: usize) -> Self {
        Self {
            name: name.into(),
            status: ScannerStatus::Ok,
            finding_count,
            error_code: None,
            message: None,
            method: None,
        }
    }

    /// Outcome for an analyzer that failed; contributes zero findings.
    pub fn failed(
        name: impl Into<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: ScannerStatus::Failed,
            finding_count: 0,
            error_code: Some(error_code.into()),
            message: Some(message.into()),
            method: None,
        }
    }

    /// Outcome for an analyzer that was not run.
    pub fn skipped(
        name: impl Into<String>,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: ScannerStatus::Skipped,
            finding_count: 0,
            error_code: Some(error_code.into()),
            message: Some(message.into()),
            method: None,
        }
    }

    /// Attach the detection method tag.
    pub fn with_method(mut self, method: DetectionMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Override the finding count, for analyzers that keep partial
    /// results after a failure.
    pub fn with_findings(mut self, finding_count: usize) -> Self {
        self.finding_count = finding_count;
        self
    }
}

/// Kind of source the scan ingested.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A version-controlled repository.
    Repo,
    /// A published package distribution.
    Package,
}

impl SourceKind {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Repo => "repo",
            SourceKind::Package => "package",
        }
    }
}

/// Overall verdict derived from the severity summary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No findings at all.
    Safe,
    /// Findings exist but none are critical or high.
    NeedsReview,
    /// At least one critical or high finding.
    Risky,
}

impl ScanStatus {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Safe => "safe",
            ScanStatus::NeedsReview => "needs_review",
            ScanStatus::Risky => "risky",
        }
    }
}

/// Letter bucket derived from the numeric score via configured boundaries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Grade {
    /// 80-100 under default boundaries.
    A,
    /// 60-79 under default boundaries.
    B,
    /// 40-59 under default boundaries.
    C,
    /// 0-39 under default boundaries.
    D,
}

impl Grade {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }
}

/// Provenance recorded for the scanned source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Effective repository URL, when the source was a repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// Resolved package name, when the source was a package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Resolved package version, when the source was a package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
}

/// Per-scan record of which sources and analyzers ran and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    /// Source kind the intake resolved to.
    pub source_kind: SourceKind,
    /// Provenance of the scanned source.
    pub provenance: Provenance,
    /// Number of files that were scanned.
    pub files_scanned: usize,
    /// Number of files excluded by filters or bounds.
    pub files_skipped: usize,
    /// One outcome per analyzer invocation.
    pub scanners: Vec<ScannerOutcome>,
}

/// A completed, immutable scan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Report identifier.
    pub id: String,
    /// The caller-supplied input reference.
    pub input: String,
    /// Numeric score, 0-100.
    pub score: u8,
    /// Letter grade derived from the score.
    pub grade: Grade,
    /// Overall verdict.
    pub status: ScanStatus,
    /// Finding counts by severity.
    pub summary: SeveritySummary,
    /// Findings in deterministic presentation order.
    pub findings: Vec<Finding>,
    /// Version of the detection engine that produced the report.
    pub engine_version: String,
    /// RFC 3339 timestamp of when the scan completed.
    pub scanned_at: String,
    /// Per-scan source and analyzer record.
    pub metadata: ScanMetadata,
}
