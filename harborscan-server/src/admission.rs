//! Admission guard: sliding-window rate limiting plus a process-wide
//! concurrency cap, consulted before any scan work begins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use harborscan_core::ScanError;

/// Tracked-client count past which the window map is bulk-pruned.
const PRUNE_CLIENT_THRESHOLD: usize = 256;

/// Admission limits loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Sliding-window duration for the per-client rate check.
    pub window: Duration,
    /// Maximum requests per client within the window.
    pub max_requests: usize,
    /// Maximum scans allowed to run concurrently.
    pub max_concurrent: u32,
    /// Hard wall-clock budget for a single scan.
    pub scan_timeout: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
            max_concurrent: 4,
            scan_timeout: Duration::from_secs(120),
        }
    }
}

impl AdmissionConfig {
    /// Build the config from environment variables.
    ///
    /// `HARBORSCAN_RATE_WINDOW_SECS` (default 60),
    /// `HARBORSCAN_RATE_MAX_REQUESTS` (default 10),
    /// `HARBORSCAN_MAX_CONCURRENT_SCANS` (default 4),
    /// `HARBORSCAN_SCAN_TIMEOUT_SECS` (default 120). Non-numeric or
    /// non-positive values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            window: Duration::from_secs(env_positive(
                "HARBORSCAN_RATE_WINDOW_SECS",
                defaults.window.as_secs(),
            )),
            max_requests: env_positive(
                "HARBORSCAN_RATE_MAX_REQUESTS",
                defaults.max_requests as u64,
            ) as usize,
            max_concurrent: env_positive(
                "HARBORSCAN_MAX_CONCURRENT_SCANS",
                defaults.max_concurrent as u64,
            ) as u32,
            scan_timeout: Duration::from_secs(env_positive(
                "HARBORSCAN_SCAN_TIMEOUT_SECS",
                defaults.scan_timeout.as_secs(),
            )),
        }
    }
}

fn env_positive(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Process-wide gate combining the rate limiter and the in-flight cap.
///
/// This holds the only mutable shared state in the pipeline; everything
/// downstream of admission is constructed once and never mutated.
#[derive(Debug)]
pub struct AdmissionGuard {
    config: AdmissionConfig,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
    in_flight: AtomicU32,
}

/// An in-flight slot held for the duration of one scan.
///
/// Dropping the permit frees the slot, so a request future cancelled
/// mid-scan (client disconnect, server shutdown) can never strand
/// capacity.
#[must_use = "dropping the permit immediately frees the slot"]
#[derive(Debug)]
pub struct ScanPermit<'a> {
    guard: &'a AdmissionGuard,
}

impl Drop for ScanPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

impl AdmissionGuard {
    /// Create a guard with explicit limits.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            in_flight: AtomicU32::new(0),
        }
    }

    /// Create a guard from environment configuration.
    pub fn from_env() -> Self {
        Self::new(AdmissionConfig::from_env())
    }

    /// Hard wall-clock budget the caller must enforce on a scan.
    pub fn scan_timeout(&self) -> Duration {
        self.config.scan_timeout
    }

    /// Current number of in-flight scans.
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Attempt to take an in-flight slot; rejected when at capacity.
    /// The slot is freed when the returned permit is dropped.
    pub fn try_acquire(&self) -> Result<ScanPermit<'_>, ScanError> {
        let cap = self.config.max_concurrent;
        let acquired = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < cap { Some(current + 1) } else { None }
            });
        match acquired {
            Ok(_) => Ok(ScanPermit { guard: self }),
            Err(_) => Err(ScanError::TooManyConcurrent(
                "too many concurrent scans, retry later".to_string(),
            )),
        }
    }

    /// Release an in-flight slot. Safe to call at zero; the counter
    /// never goes negative.
    fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(1))
            });
    }

    /// Run both gates in order: rate window first, then concurrency.
    /// A request turned away at either gate holds no slot afterwards,
    /// and its rate allowance is only spent once both gates pass.
    pub fn admit(&self, client: &str) -> Result<ScanPermit<'_>, ScanError> {
        self.admit_at(client, Instant::now())
    }

    pub(crate) fn admit_at(&self, client: &str, now: Instant) -> Result<ScanPermit<'_>, ScanError> {
        let mut windows = self.windows.lock().expect("rate window lock");
        let window = self.config.window;

        let hits = windows.entry(client.to_string()).or_default();
        hits.retain(|hit| now.duration_since(*hit) < window);
        if hits.len() >= self.config.max_requests {
            return Err(ScanError::RateLimited(
                "rate limit exceeded, retry later".to_string(),
            ));
        }
        let permit = self.try_acquire()?;
        hits.push(now);

        // Idle clients are pruned lazily and in bulk, bounding memory
        // without a background sweep thread.
        if windows.len() > PRUNE_CLIENT_THRESHOLD {
            windows.retain(|_, hits| {
                hits.retain(|hit| now.duration_since(*hit) < window);
                !hits.is_empty()
            });
        }
        Ok(permit)
    }

    /// Clear all windows and zero the in-flight counter.
    pub fn reset(&self) {
        self.windows.lock().expect("rate window lock").clear();
        self.in_flight.store(0, Ordering::SeqCst);
    }
}
