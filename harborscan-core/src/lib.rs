#![deny(missing_docs)]
//! HarborScan core library.
//!
//! This crate contains the domain types, pattern rule engine, finding
//! aggregation, and report assembly that power the broader HarborScan
//! platform. It performs no I/O; fetching and analyzer execution live
//! in the server crate.

pub mod domain;
pub mod error;
pub mod merge;
pub mod rules;
pub mod score;

pub use domain::{
    DetectionMethod, Finding, FindingSource, Grade, Provenance, ScanMetadata, ScanReport,
    ScanStatus, ScannerOutcome, ScannerStatus, Severity, SeveritySummary, SourceKind,
    ENGINE_VERSION,
};
pub use error::{Result, ScanError};
pub use merge::{dedup_findings, sort_findings};
pub use rules::{SNIPPET_MAX_CHARS, evaluate, truncate_snippet};
pub use score::{
    assemble_report, compute_score, derive_status, GradeBand, ScoreConfig, SeverityWeights,
};
