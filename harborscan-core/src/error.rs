//! Error types for HarborScan core.

use std::{error::Error, fmt, io};

/// Error type for HarborScan scan operations.
///
/// Every externally observable variant carries a stable machine code
/// (see [`ScanError::code`]) plus a human message; internal causes are
/// never embedded in the message.
#[derive(Debug)]
pub enum ScanError {
    /// The caller-supplied input matched no supported grammar.
    InvalidInput(String),
    /// The input looked like a repository URL but could not be parsed.
    InvalidRepoUrl(String),
    /// The repository does not exist upstream.
    RepoNotFound(String),
    /// The repository exists but is private.
    RepoPrivate(String),
    /// Upstream denied access for a non-privacy reason.
    RepoAccessLimited(String),
    /// The upstream host rejected us for exceeding its rate limits.
    UpstreamRateLimited(String),
    /// The package does not exist in the registry.
    PackageNotFound(String),
    /// The package reference could not be parsed.
    InvalidPackageInput(String),
    /// The package tarball exceeded the configured download ceiling.
    TarballTooLarge(String),
    /// The archive contained more entries than allowed.
    ExtractedFilesExceeded(String),
    /// A single archive entry exceeded the per-file byte ceiling.
    ExtractedFileTooLarge(String),
    /// The scan exceeded its hard wall-clock budget.
    ScanTimeout(String),
    /// The client exceeded its sliding-window request allowance.
    RateLimited(String),
    /// The process-wide concurrent scan cap is saturated.
    TooManyConcurrent(String),
    /// An underlying I/O error.
    Io(io::Error),
    /// A catch-all error with a message.
    Other(String),
}

impl ScanError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidRepoUrl(_) => "invalid_repo_url",
            Self::RepoNotFound(_) => "repo_not_found",
            Self::RepoPrivate(_) => "repo_private",
            Self::RepoAccessLimited(_) => "repo_access_limited",
            Self::UpstreamRateLimited(_) => "rate_limited",
            Self::PackageNotFound(_) => "package_not_found",
            Self::InvalidPackageInput(_) => "invalid_package_input",
            Self::TarballTooLarge(_) => "tarball_too_large",
            Self::ExtractedFilesExceeded(_) => "extracted_files_exceeded",
            Self::ExtractedFileTooLarge(_) => "extracted_file_too_large",
            Self::ScanTimeout(_) => "scan_timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::TooManyConcurrent(_) => "too_many_concurrent",
            Self::Io(_) => "io_error",
            Self::Other(_) => "internal_error",
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidRepoUrl(message)
            | Self::RepoNotFound(message)
            | Self::RepoPrivate(message)
            | Self::RepoAccessLimited(message)
            | Self::UpstreamRateLimited(message)
            | Self::PackageNotFound(message)
            | Self::InvalidPackageInput(message)
            | Self::TarballTooLarge(message)
            | Self::ExtractedFilesExceeded(message)
            | Self::ExtractedFileTooLarge(message)
            | Self::ScanTimeout(message)
            | Self::RateLimited(message)
            | Self::TooManyConcurrent(message)
            | Self::Other(message) => write!(f, "{message}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl Error for ScanError {}

impl From<io::Error> for ScanError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Convenience result type for HarborScan core.
pub type Result<T> = std::result::Result<T, ScanError>;
