//! Scan orchestration.
//!
//! Resolves intake, fans the rule engine and every adapter out
//! concurrently, and assembles the merged findings into an immutable
//! report. Adapter failure never aborts a scan; the whole run is bound
//! to a hard wall-clock deadline and the intake workspace is released
//! on every exit path.

use log::warn;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;

use harborscan_core::{
    Finding, ScanError, ScanMetadata, ScanReport, ScannerOutcome, ScoreConfig, assemble_report,
    evaluate,
};

use crate::adapters::{
    AdapterRun, GitleaksAdapter, InjectionAdapter, ScannerAdapter, SemgrepAdapter,
};
use crate::github::SourceFile;
use crate::intake::{IntakeResolver, IntakeResult};

/// Runs complete scans from caller input to stored-ready report.
#[derive(Debug, Clone)]
pub struct ScanService {
    resolver: IntakeResolver,
    semgrep: SemgrepAdapter,
    gitleaks: GitleaksAdapter,
    injection: InjectionAdapter,
    score_config: ScoreConfig,
}

impl ScanService {
    /// Build a service over explicit collaborators.
    pub fn new(
        resolver: IntakeResolver,
        semgrep: SemgrepAdapter,
        gitleaks: GitleaksAdapter,
        injection: InjectionAdapter,
        score_config: ScoreConfig,
    ) -> Self {
        Self {
            resolver,
            semgrep,
            gitleaks,
            injection,
            score_config,
        }
    }

    /// Build a service from environment configuration.
    pub fn from_env() -> Self {
        Self::new(
            IntakeResolver::from_env(),
            SemgrepAdapter::from_env(),
            GitleaksAdapter::from_env(),
            InjectionAdapter::from_env(),
            ScoreConfig::from_env(),
        )
    }

    /// Run one scan under the supplied wall-clock budget.
    ///
    /// A fired deadline drops the in-flight work, which releases the
    /// intake workspace, and maps to a `scan_timeout` error.
    pub async fn scan(&self, input: &str, budget: Duration) -> Result<ScanReport, ScanError> {
        match tokio::time::timeout(budget, self.scan_inner(input)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::ScanTimeout(
                "scan exceeded its time budget".to_string(),
            )),
        }
    }

    async fn scan_inner(&self, input: &str) -> Result<ScanReport, ScanError> {
        let mut intake = self.resolver.resolve(input).await?;
        let (findings, scanners) = self.run_scanners(&intake).await;
        let metadata = ScanMetadata {
            source_kind: intake.kind,
            provenance: intake.provenance.clone(),
            files_scanned: intake.files.len(),
            files_skipped: intake.files_skipped,
            scanners,
        };
        intake.cleanup();

        Ok(assemble_report(
            uuid::Uuid::new_v4().to_string(),
            input.to_string(),
            findings,
            metadata,
            chrono::Utc::now().to_rfc3339(),
            &self.score_config,
        ))
    }

    /// Fan out the rule engine and all adapters concurrently.
    ///
    /// Returns the pooled findings plus one outcome per analyzer,
    /// sorted by analyzer name so the metadata order is deterministic
    /// regardless of completion order.
    async fn run_scanners(&self, intake: &IntakeResult) -> (Vec<Finding>, Vec<ScannerOutcome>) {
        let workspace: PathBuf = intake
            .workspace_dir()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(std::env::temp_dir);
        let mut tasks: JoinSet<AdapterRun> = JoinSet::new();

        let files: Vec<SourceFile> = intake.files.clone();
        tasks.spawn(async move { run_rules(&files) });

        let semgrep = self.semgrep.clone();
        let dir = workspace.clone();
        tasks.spawn(async move { semgrep.run(&dir, &[]).await });

        let gitleaks = self.gitleaks.clone();
        let dir = workspace.clone();
        tasks.spawn(async move { gitleaks.run(&dir, &[]).await });

        let injection = self.injection.clone();
        let files = intake.files.clone();
        tasks.spawn(async move { injection.run(&workspace, &files).await });

        let mut findings = Vec::new();
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => {
                    findings.extend(run.findings);
                    outcomes.push(run.outcome);
                }
                Err(err) => {
                    warn!("scanner task did not complete: {err}");
                }
            }
        }
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        (findings, outcomes)
    }
}

/// Run the built-in pattern rules over every fetched file.
fn run_rules(files: &[SourceFile]) -> AdapterRun {
    let mut findings = Vec::new();
    for file in files {
        findings.extend(evaluate(&file.content, &file.path));
    }
    AdapterRun {
        outcome: ScannerOutcome::ok("rules", findings.len()),
        findings,
    }
}
