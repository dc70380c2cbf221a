//! Report assembly: severity summary, score, grade, and status.
//!
//! Grade boundaries and severity weights are data, not code: they are
//! loaded from external configuration at the assembler boundary and
//! fall back to documented defaults when absent or malformed.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Finding, Grade, ScanMetadata, ScanReport, ScanStatus, SeveritySummary, ENGINE_VERSION,
};
use crate::merge::{dedup_findings, sort_findings};

/// Environment variable holding the JSON severity-weight table.
pub const SEVERITY_WEIGHTS_ENV: &str = "HARBORSCAN_SEVERITY_WEIGHTS";
/// Environment variable holding the JSON grade-boundary table.
pub const GRADE_BANDS_ENV: &str = "HARBORSCAN_GRADE_BANDS";

/// Penalty subtracted from the score per finding of each severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityWeights {
    /// Penalty per critical finding.
    pub critical: u32,
    /// Penalty per high finding.
    pub high: u32,
    /// Penalty per medium finding.
    pub medium: u32,
    /// Penalty per low finding.
    pub low: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 25,
            high: 15,
            medium: 8,
            low: 3,
        }
    }
}

/// One inclusive score range mapped to a letter grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBand {
    /// Letter grade for the range.
    pub grade: Grade,
    /// Inclusive lower bound.
    pub min: u8,
    /// Inclusive upper bound.
    pub max: u8,
}

/// Scoring configuration: severity weights plus grade boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreConfig {
    /// Per-severity penalties.
    pub weights: SeverityWeights,
    /// Score-to-grade boundary table.
    pub bands: Vec<GradeBand>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            bands: vec![
                GradeBand {
                    grade: Grade::A,
                    min: 80,
                    max: 100,
                },
                GradeBand {
                    grade: Grade::B,
                    min: 60,
                    max: 79,
                },
                GradeBand {
                    grade: Grade::C,
                    min: 40,
                    max: 59,
                },
                GradeBand {
                    grade: Grade::D,
                    min: 0,
                    max: 39,
                },
            ],
        }
    }
}

impl ScoreConfig {
    /// Load the configuration from the environment.
    ///
    /// Each table is a JSON value; a missing or unparseable table falls
    /// back to its default, never to an error.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let weights = std::env::var(SEVERITY_WEIGHTS_ENV)
            .ok()
            .and_then(|raw| serde_json::from_str::<SeverityWeights>(&raw).ok())
            .unwrap_or(defaults.weights);
        let bands = std::env::var(GRADE_BANDS_ENV)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<GradeBand>>(&raw).ok())
            .filter(|bands| !bands.is_empty())
            .unwrap_or(defaults.bands);
        Self { weights, bands }
    }

    /// Map a numeric score to a grade via the boundary table.
    pub fn grade_for(&self, score: u8) -> Grade {
        self.bands
            .iter()
            .find(|band| score >= band.min && score <= band.max)
            .map(|band| band.grade)
            // A score outside every configured band only happens with a
            // malformed custom table; fail toward the worst grade.
            .unwrap_or(Grade::D)
    }
}

/// Compute the numeric score for a severity summary: 100 minus the
/// weighted penalty per finding, floored at 0.
pub fn compute_score(summary: &SeveritySummary, weights: &SeverityWeights) -> u8 {
    let penalty = summary.critical as u64 * weights.critical as u64
        + summary.high as u64 * weights.high as u64
        + summary.medium as u64 * weights.medium as u64
        + summary.low as u64 * weights.low as u64;
    100u64.saturating_sub(penalty) as u8
}

/// Derive the overall verdict from the severity summary.
pub fn derive_status(summary: &SeveritySummary) -> ScanStatus {
    if summary.critical > 0 || summary.high > 0 {
        ScanStatus::Risky
    } else if summary.total() == 0 {
        ScanStatus::Safe
    } else {
        ScanStatus::NeedsReview
    }
}

/// Assemble an immutable report from pooled findings.
///
/// Findings are deduplicated and sorted here, so two scans of
/// byte-identical input produce identical findings, score, grade, and
/// status regardless of analyzer completion order. The id and
/// timestamp are supplied by the caller.
pub fn assemble_report(
    id: String,
    input: String,
    findings: Vec<Finding>,
    metadata: ScanMetadata,
    scanned_at: String,
    config: &ScoreConfig,
) -> ScanReport {
    let mut findings = dedup_findings(findings);
    sort_findings(&mut findings);

    let summary = SeveritySummary::from_findings(&findings);
    let score = compute_score(&summary, &config.weights);
    let grade = config.grade_for(score);
    let status = derive_status(&summary);

    ScanReport {
        id,
        input,
        score,
        grade,
        status,
        summary,
        findings,
        engine_version: ENGINE_VERSION.to_string(),
        scanned_at,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::{assemble_report, compute_score, derive_status, ScoreConfig, SeverityWeights};
    use crate::domain::{
        Finding, FindingSource, Grade, Provenance, ScanMetadata, ScanStatus, Severity,
        SeveritySummary, SourceKind,
    };

    fn summary(critical: usize, high: usize, medium: usize, low: usize) -> SeveritySummary {
        SeveritySummary {
            critical,
            high,
            medium,
            low,
        }
    }

    fn metadata() -> ScanMetadata {
        ScanMetadata {
            source_kind: SourceKind::Repo,
            provenance: Provenance::default(),
            files_scanned: 1,
            files_skipped: 0,
            scanners: Vec::new(),
        }
    }

    fn finding(rule_id: &str, severity: Severity) -> Finding {
        Finding {
            rule_id: rule_id.to_string(),
            severity,
            title: "title".to_string(),
            file: "file".to_string(),
            line: 1,
            snippet: "snippet".to_string(),
            recommendation: "fix".to_string(),
            source: FindingSource::Rules,
        }
    }

    #[test]
    fn default_grade_boundaries_match_documented_table() {
        let config = ScoreConfig::default();
        let cases = [
            (39u8, Grade::D),
            (40, Grade::C),
            (59, Grade::C),
            (60, Grade::B),
            (79, Grade::B),
            (80, Grade::A),
            (100, Grade::A),
        ];
        for (score, expected) in cases {
            assert_eq!(config.grade_for(score), expected, "score {score}");
        }
    }

    #[test]
    fn score_is_weighted_and_floored_at_zero() {
        let weights = SeverityWeights::default();
        assert_eq!(compute_score(&summary(0, 0, 0, 0), &weights), 100);
        assert_eq!(compute_score(&summary(1, 1, 1, 1), &weights), 49);
        assert_eq!(compute_score(&summary(10, 0, 0, 0), &weights), 0);
    }

    #[test]
    fn status_derives_from_summary() {
        assert_eq!(derive_status(&summary(0, 0, 0, 0)), ScanStatus::Safe);
        assert_eq!(derive_status(&summary(0, 0, 2, 1)), ScanStatus::NeedsReview);
        assert_eq!(derive_status(&summary(0, 1, 0, 0)), ScanStatus::Risky);
        assert_eq!(derive_status(&summary(1, 0, 0, 0)), ScanStatus::Risky);
    }

    #[test]
    fn assemble_dedups_and_orders_findings() {
        let findings = vec![
            finding("low", Severity::Low),
            finding("crit", Severity::Critical),
            finding("crit", Severity::Critical),
        ];
        let report = assemble_report(
            "id-1".to_string(),
            "octocat/hello".to_string(),
            findings,
            metadata(),
            "2026-01-01T00:00:00Z".to_string(),
            &ScoreConfig::default(),
        );

        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].rule_id, "crit");
        assert_eq!(report.summary.critical, 1);
        assert_eq!(report.score, 72);
        assert_eq!(report.grade, Grade::B);
        assert_eq!(report.status, ScanStatus::Risky);
    }

    #[test]
    fn assemble_is_deterministic_for_identical_input() {
        let findings = || {
            vec![
                finding("b", Severity::High),
                finding("a", Severity::High),
                finding("c", Severity::Low),
            ]
        };
        let build = || {
            assemble_report(
                "id".to_string(),
                "input".to_string(),
                findings(),
                metadata(),
                "2026-01-01T00:00:00Z".to_string(),
                &ScoreConfig::default(),
            )
        };
        let first = serde_json::to_string(&build()).expect("serialize");
        let second = serde_json::to_string(&build()).expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn custom_band_table_overrides_defaults() {
        let mut config = ScoreConfig::default();
        config.bands = vec![
            super::GradeBand {
                grade: Grade::A,
                min: 90,
                max: 100,
            },
            super::GradeBand {
                grade: Grade::D,
                min: 0,
                max: 89,
            },
        ];
        assert_eq!(config.grade_for(89), Grade::D);
        assert_eq!(config.grade_for(90), Grade::A);
    }
}
