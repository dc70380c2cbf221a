//! npm registry package fetcher.
//!
//! Resolves a package name to a published version, downloads its
//! tarball under a byte ceiling, and extracts a bounded set of text
//! entries in memory. Archive paths are sanitized before they can ever
//! reach a workspace on disk.

use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Component;
use std::time::Duration;

use harborscan_core::ScanError;

use crate::github::{SourceFile, has_allowed_extension};

/// Ceiling on the downloaded tarball size.
pub const MAX_TARBALL_BYTES: u64 = 10 * 1024 * 1024;
/// Ceiling on the number of extracted archive entries.
pub const MAX_ENTRIES: usize = 200;
/// Ceiling on the size of a single extracted entry.
pub const MAX_ENTRY_BYTES: u64 = 200 * 1024;

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]*$").expect("package name pattern")
});

/// A parsed package reference from an install command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    /// Package name, possibly scoped.
    pub name: String,
    /// Pinned version; the `latest` dist-tag is used when absent.
    pub version: Option<String>,
}

/// Result of a package fetch.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    /// Extracted text files, archive prefix stripped.
    pub files: Vec<SourceFile>,
    /// Number of entries excluded by filters or sanitization.
    pub files_skipped: usize,
    /// Package name as resolved.
    pub name: String,
    /// Concrete version that was fetched.
    pub version: String,
}

/// Registry configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry base URL.
    pub registry_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl RegistryConfig {
    /// Build the config from environment variables.
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("HARBORSCAN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(30);
        Self {
            registry_url: std::env::var("NPM_REGISTRY_URL")
                .unwrap_or_else(|_| "https://registry.npmjs.org".to_string()),
            user_agent: std::env::var("HARBORSCAN_USER_AGENT")
                .unwrap_or_else(|_| "harborscan-server".to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: String,
}

/// Fetches package contents from an npm-compatible registry.
#[derive(Debug, Clone)]
pub struct RegistryFetcher {
    client: reqwest::Client,
    config: RegistryConfig,
}

impl RegistryFetcher {
    /// Build a fetcher with the supplied configuration.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build a fetcher from environment configuration.
    pub fn from_env() -> Self {
        Self::new(RegistryConfig::from_env())
    }

    /// Resolve, download, and extract the package.
    pub async fn fetch(&self, package: &PackageRef) -> Result<FetchedPackage, ScanError> {
        if !PACKAGE_NAME.is_match(&package.name) {
            return Err(ScanError::InvalidPackageInput(
                "package name is not valid".to_string(),
            ));
        }

        let base = self.config.registry_url.trim_end_matches('/').to_string();
        let encoded = urlencoding::encode(&package.name).into_owned();
        let packument: Packument = self.get_json(format!("{base}/{encoded}")).await?;

        let version = match &package.version {
            Some(version) => version.clone(),
            None => packument
                .dist_tags
                .get("latest")
                .cloned()
                .ok_or_else(|| {
                    ScanError::PackageNotFound("package has no latest version".to_string())
                })?,
        };
        let info = packument.versions.get(&version).ok_or_else(|| {
            ScanError::PackageNotFound("package version not found".to_string())
        })?;

        let bytes = self.download_tarball(&info.dist.tarball).await?;
        let (files, files_skipped) = extract_archive(&bytes)?;
        Ok(FetchedPackage {
            files,
            files_skipped,
            name: package.name.clone(),
            version,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, ScanError> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|_| ScanError::Other("registry response could not be decoded".to_string()))
    }

    async fn download_tarball(&self, url: &str) -> Result<Vec<u8>, ScanError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status.as_u16()));
        }
        if let Some(length) = response.content_length() {
            if length > MAX_TARBALL_BYTES {
                return Err(ScanError::TarballTooLarge(
                    "package tarball exceeds the size limit".to_string(),
                ));
            }
        }
        // The declared length is advisory (chunked responses carry
        // none); the body is streamed and the ceiling enforced on the
        // accumulated bytes so an oversized download aborts mid-flight.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|_| ScanError::Other("tarball download failed".to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > MAX_TARBALL_BYTES {
                return Err(ScanError::TarballTooLarge(
                    "package tarball exceeds the size limit".to_string(),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Extract text entries from a gzipped tarball, enforcing entry-count
/// and per-entry-size ceilings. Returns the files plus the number of
/// entries excluded.
fn extract_archive(bytes: &[u8]) -> Result<(Vec<SourceFile>, usize), ScanError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut files = Vec::new();
    let mut skipped = 0usize;
    let mut seen = 0usize;

    for entry in archive
        .entries()
        .map_err(|_| ScanError::Other("package tarball is not a valid archive".to_string()))?
    {
        let mut entry =
            entry.map_err(|_| ScanError::Other("package tarball is not a valid archive".to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        seen += 1;
        if seen > MAX_ENTRIES {
            return Err(ScanError::ExtractedFilesExceeded(
                "package archive contains too many files".to_string(),
            ));
        }
        if entry.size() > MAX_ENTRY_BYTES {
            return Err(ScanError::ExtractedFileTooLarge(
                "package archive entry exceeds the size limit".to_string(),
            ));
        }

        let path = entry
            .path()
            .map_err(|_| ScanError::Other("package tarball is not a valid archive".to_string()))?
            .into_owned();
        let relative = match sanitize_entry_path(&path) {
            Some(relative) => relative,
            // Absolute or parent-traversing paths never reach a workspace.
            None => {
                skipped += 1;
                continue;
            }
        };
        if !has_allowed_extension(&relative) {
            skipped += 1;
            continue;
        }

        let mut content = String::new();
        if entry.read_to_string(&mut content).is_err() {
            skipped += 1;
            continue;
        }
        files.push(SourceFile {
            path: relative,
            content,
        });
    }
    Ok((files, skipped))
}

/// Strip the npm `package/` prefix and reject unsafe components.
fn sanitize_entry_path(path: &std::path::Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if parts.len() > 1 {
        parts.remove(0);
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn request_error(err: reqwest::Error) -> ScanError {
    if err.is_timeout() {
        ScanError::ScanTimeout("registry request timed out".to_string())
    } else {
        ScanError::Other("registry request failed".to_string())
    }
}

fn map_status(status: u16) -> ScanError {
    match status {
        404 => ScanError::PackageNotFound("package not found".to_string()),
        429 => ScanError::UpstreamRateLimited("registry rate limit exhausted".to_string()),
        _ => ScanError::Other("registry request failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            if header.set_path(path).is_err() {
                // `set_path` refuses `..` components, but the traversal
                // test needs such an entry on the wire; write the raw
                // name bytes directly instead.
                header.as_gnu_mut().unwrap().name[..path.len()]
                    .copy_from_slice(path.as_bytes());
            }
            header.set_cksum();
            builder
                .append(&header, content.as_bytes())
                .expect("append entry");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip")
    }

    fn fetcher(server: &MockServer) -> RegistryFetcher {
        RegistryFetcher::new(RegistryConfig {
            registry_url: server.base_url(),
            user_agent: "harborscan-tests".to_string(),
            request_timeout: Duration::from_secs(5),
        })
    }

    fn packument_body(server: &MockServer, version: &str) -> String {
        format!(
            r#"{{"dist-tags":{{"latest":"{version}"}},"versions":{{"{version}":{{"dist":{{"tarball":"{}/left-pad/-/left-pad-{version}.tgz"}}}}}}}}"#,
            server.base_url()
        )
    }

    #[actix_web::test]
    async fn fetch_resolves_latest_and_extracts_text_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/left-pad");
            then.status(200)
                .header("content-type", "application/json")
                .body(packument_body(&server, "1.3.0"));
        });
        let body = tarball(&[
            ("package/index.js", "module.exports = pad;\n"),
            ("package/logo.png", "binary"),
        ]);
        server.mock(|when, then| {
            when.method(GET).path("/left-pad/-/left-pad-1.3.0.tgz");
            then.status(200).body(body);
        });

        let fetched = fetcher(&server)
            .fetch(&PackageRef {
                name: "left-pad".to_string(),
                version: None,
            })
            .await
            .expect("fetch");

        assert_eq!(fetched.version, "1.3.0");
        assert_eq!(fetched.files.len(), 1);
        assert_eq!(fetched.files[0].path, "index.js");
        assert_eq!(fetched.files_skipped, 1);
    }

    #[actix_web::test]
    async fn missing_package_maps_to_package_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/nope");
            then.status(404).body("{}");
        });

        let err = fetcher(&server)
            .fetch(&PackageRef {
                name: "nope".to_string(),
                version: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "package_not_found");
    }

    #[actix_web::test]
    async fn unknown_version_maps_to_package_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/left-pad");
            then.status(200)
                .header("content-type", "application/json")
                .body(packument_body(&server, "1.3.0"));
        });

        let err = fetcher(&server)
            .fetch(&PackageRef {
                name: "left-pad".to_string(),
                version: Some("9.9.9".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "package_not_found");
    }

    #[actix_web::test]
    async fn malformed_name_is_rejected_before_any_request() {
        let server = MockServer::start();
        let err = fetcher(&server)
            .fetch(&PackageRef {
                name: "Not A Package!".to_string(),
                version: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_package_input");
    }

    #[actix_web::test]
    async fn oversized_tarball_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/left-pad");
            then.status(200)
                .header("content-type", "application/json")
                .body(packument_body(&server, "1.3.0"));
        });
        let oversized = vec![0u8; (MAX_TARBALL_BYTES + 1) as usize];
        server.mock(|when, then| {
            when.method(GET).path("/left-pad/-/left-pad-1.3.0.tgz");
            then.status(200).body(oversized);
        });

        let err = fetcher(&server)
            .fetch(&PackageRef {
                name: "left-pad".to_string(),
                version: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "tarball_too_large");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn chunked_download_without_a_length_is_capped_mid_stream() {
        use std::io::{Read as _, Write as _};
        use std::net::TcpListener;

        // Serves an endless chunked body with no Content-Length header,
        // so the ceiling can only be enforced on the accumulated bytes.
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut head = [0u8; 1024];
            let _ = stream.read(&mut head);
            if stream
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
                .is_err()
            {
                return;
            }
            let chunk = vec![b'a'; 1024 * 1024];
            let frame = format!("{:x}\r\n", chunk.len());
            loop {
                if stream.write_all(frame.as_bytes()).is_err()
                    || stream.write_all(&chunk).is_err()
                    || stream.write_all(b"\r\n").is_err()
                {
                    return;
                }
            }
        });

        let fetcher = RegistryFetcher::new(RegistryConfig {
            registry_url: format!("http://{addr}"),
            user_agent: "harborscan-tests".to_string(),
            request_timeout: Duration::from_secs(30),
        });
        let err = fetcher
            .download_tarball(&format!("http://{addr}/left-pad/-/left-pad-1.3.0.tgz"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "tarball_too_large");
        let _ = server.join();
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let big = "a".repeat((MAX_ENTRY_BYTES + 1) as usize);
        let body = tarball(&[("package/big.js", &big)]);
        let err = extract_archive(&body).unwrap_err();
        assert_eq!(err.code(), "extracted_file_too_large");
    }

    #[test]
    fn too_many_entries_are_rejected() {
        let names: Vec<String> = (0..=MAX_ENTRIES)
            .map(|i| format!("package/file{i}.js"))
            .collect();
        let entries: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x")).collect();
        let body = tarball(&entries);
        let err = extract_archive(&body).unwrap_err();
        assert_eq!(err.code(), "extracted_files_exceeded");
    }

    #[test]
    fn traversal_entries_are_excluded() {
        let body = tarball(&[
            ("package/ok.js", "fine"),
            ("package/../escape.js", "bad"),
        ]);
        let (files, skipped) = extract_archive(&body).expect("extract");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "ok.js");
        assert_eq!(skipped, 1);
    }

    #[test]
    fn scoped_names_pass_validation() {
        assert!(PACKAGE_NAME.is_match("@scope/pkg"));
        assert!(PACKAGE_NAME.is_match("left-pad"));
        assert!(!PACKAGE_NAME.is_match("UPPER"));
        assert!(!PACKAGE_NAME.is_match("@bad scope/pkg"));
    }
}
