//! Report store contract and the in-memory default implementation.
//!
//! The store is an external collaborator: the core only relies on
//! `put`/`get` keyed by report id with last-write-wins semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use harborscan_core::ScanReport;

/// Durable keyed storage for completed scan reports.
#[cfg_attr(test, mockall::automock)]
pub trait ReportStore: Send + Sync {
    /// Persist a report, replacing any previous report with the same id.
    fn put(&self, report: ScanReport);
    /// Fetch a report by id.
    fn get(&self, id: &str) -> Option<ScanReport>;
}

/// In-memory report store backed by a `RwLock`ed map.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, ScanReport>>,
}

impl InMemoryReportStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for InMemoryReportStore {
    fn put(&self, report: ScanReport) {
        let mut reports = self.reports.write().expect("report store lock");
        reports.insert(report.id.clone(), report);
    }

    fn get(&self, id: &str) -> Option<ScanReport> {
        let reports = self.reports.read().expect("report store lock");
        reports.get(id).cloned()
    }
}
