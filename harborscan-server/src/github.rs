//! GitHub source fetcher.
//!
//! Retrieves a bounded set of text files from a repository via the
//! GitHub REST API. All external JSON is parsed into strict shapes at
//! this boundary; upstream failures map to typed [`ScanError`]s.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::time::Duration;

use harborscan_core::ScanError;

/// Extensions accepted by the intake filter.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "bash", "cjs", "go", "js", "json", "jsx", "md", "mjs", "ps1", "py", "rb", "rs", "sh", "toml",
    "ts", "tsx", "txt", "yaml", "yml", "zsh",
];

/// Maximum number of files fetched per scan.
pub const MAX_FILES: usize = 50;
/// Maximum size of a single fetched blob.
pub const MAX_FILE_BYTES: u64 = 200 * 1024;
/// Number of blobs taken by the plain-text fallback when no file
/// matches the extension filter.
const PLAIN_TEXT_FALLBACK_MAX: usize = 10;

/// Sub-directories probed when resolving a skill-add shorthand.
const SKILL_DIR_CONVENTIONS: &[&str] = &["skill", "skills", "packages"];

/// A parsed `owner/repo[@ref]` reference plus optional sub-paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Git reference; the default branch is resolved when absent.
    pub reference: Option<String>,
    /// Restrict the tree listing to these prefixes when non-empty.
    pub subpaths: Vec<String>,
}

impl RepoRef {
    /// Canonical `https://github.com/...` URL for provenance.
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

/// A fetched source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path within the repository or archive.
    pub path: String,
    /// Decoded text content.
    pub content: String,
}

/// Result of a repository fetch.
#[derive(Debug, Clone)]
pub struct FetchedRepo {
    /// Fetched files in tree-listing order.
    pub files: Vec<SourceFile>,
    /// Number of blobs excluded by filters or bounds.
    pub files_skipped: usize,
    /// Effective repository URL.
    pub resolved_url: String,
}

/// GitHub API configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// GitHub API base URL.
    pub api_url: String,
    /// Optional bearer credential for authenticated requests.
    pub token: Option<String>,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl GithubConfig {
    /// Build the config from environment variables.
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("HARBORSCAN_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(30);
        Self {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            user_agent: std::env::var("HARBORSCAN_USER_AGENT")
                .unwrap_or_else(|_| "harborscan-server".to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Fetches repository file sets from the GitHub API.
#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubFetcher {
    /// Build a fetcher with the supplied configuration.
    pub fn new(config: GithubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build a fetcher from environment configuration.
    pub fn from_env() -> Self {
        Self::new(GithubConfig::from_env())
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, ScanError> {
        let response = self.request(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let rate_limited = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|value| value.to_str().ok())
                .map(|value| value == "0")
                .unwrap_or(false);
            return Err(map_status(status.as_u16(), rate_limited));
        }
        response
            .json::<T>()
            .await
            .map_err(|_| ScanError::Other("upstream response could not be decoded".to_string()))
    }

    /// Fetch a bounded, text-decoded file set for the repository.
    pub async fn fetch(&self, repo_ref: &RepoRef) -> Result<FetchedRepo, ScanError> {
        let base = self.config.api_url.trim_end_matches('/').to_string();
        let owner = &repo_ref.owner;
        let repo = &repo_ref.repo;

        let reference = match &repo_ref.reference {
            Some(reference) => reference.clone(),
            None => {
                let info: RepoInfo = self.get_json(format!("{base}/repos/{owner}/{repo}")).await?;
                info.default_branch
            }
        };

        let tree: TreeResponse = self
            .get_json(format!(
                "{base}/repos/{owner}/{repo}/git/trees/{reference}?recursive=1"
            ))
            .await?;

        let blobs: Vec<&TreeEntry> = tree
            .tree
            .iter()
            .filter(|entry| entry.kind == "blob")
            .filter(|entry| {
                repo_ref.subpaths.is_empty()
                    || repo_ref
                        .subpaths
                        .iter()
                        .any(|prefix| entry.path == *prefix || entry.path.starts_with(&format!("{prefix}/")))
            })
            .collect();
        let total_blobs = blobs.len();

        let mut selected: Vec<&TreeEntry> = blobs
            .iter()
            .copied()
            .filter(|entry| has_allowed_extension(&entry.path))
            .filter(|entry| entry.size.unwrap_or(0) <= MAX_FILE_BYTES)
            .take(MAX_FILES)
            .collect();

        // A repository with no recognized source files is not silently
        // scanned empty: fall back to a bounded set of plain blobs.
        if selected.is_empty() {
            selected = blobs
                .iter()
                .copied()
                .filter(|entry| entry.size.unwrap_or(0) <= MAX_FILE_BYTES)
                .take(PLAIN_TEXT_FALLBACK_MAX)
                .collect();
        }

        let mut files = Vec::with_capacity(selected.len());
        for entry in &selected {
            let encoded_path = encode_path(&entry.path);
            let content: ContentResponse = self
                .get_json(format!(
                    "{base}/repos/{owner}/{repo}/contents/{encoded_path}?ref={reference}"
                ))
                .await?;
            match decode_blob(&content) {
                Some(text) => files.push(SourceFile {
                    path: entry.path.clone(),
                    content: text,
                }),
                // Binary or undecodable blobs are excluded, not fatal.
                None => continue,
            }
        }

        let files_skipped = total_blobs.saturating_sub(files.len());
        Ok(FetchedRepo {
            files,
            files_skipped,
            resolved_url: repo_ref.url(),
        })
    }

    /// Probe the repository's known skill sub-directory conventions.
    ///
    /// Returns the prioritized, deduplicated, lexicographically sorted
    /// list of sub-paths that exist, or an error when the repository
    /// itself is not discoverable.
    pub async fn probe_skill_dirs(&self, owner: &str, repo: &str) -> Result<Vec<String>, ScanError> {
        let base = self.config.api_url.trim_end_matches('/').to_string();
        // Existence check first so a missing repository surfaces as a
        // typed error rather than an empty candidate list.
        let _: RepoInfo = self.get_json(format!("{base}/repos/{owner}/{repo}")).await?;

        let mut candidates = Vec::new();
        for dir in SKILL_DIR_CONVENTIONS {
            let url = format!("{base}/repos/{owner}/{repo}/contents/{dir}");
            let response = self.request(url).send().await.map_err(request_error)?;
            if response.status().is_success() {
                candidates.push((*dir).to_string());
            }
        }
        candidates.sort();
        candidates.dedup();
        Ok(candidates)
    }
}

/// Whether the path carries an extension from [`ALLOWED_EXTENSIONS`].
pub(crate) fn has_allowed_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_blob(content: &ContentResponse) -> Option<String> {
    let text = if content.encoding != "base64" {
        if content.content.is_empty() {
            return None;
        }
        content.content.clone()
    } else {
        let compact: String = content
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = BASE64.decode(compact).ok()?;
        String::from_utf8(bytes).ok()?
    };
    // The tree listing's size field is advisory; the fetched content
    // is bounded again here.
    if text.len() as u64 > MAX_FILE_BYTES {
        return None;
    }
    Some(text)
}

fn request_error(err: reqwest::Error) -> ScanError {
    if err.is_timeout() {
        ScanError::ScanTimeout("upstream request timed out".to_string())
    } else {
        ScanError::Other("upstream request failed".to_string())
    }
}

fn map_status(status: u16, rate_limited: bool) -> ScanError {
    match status {
        404 => ScanError::RepoNotFound("repository not found".to_string()),
        401 => ScanError::RepoPrivate("repository is private".to_string()),
        403 if rate_limited => {
            ScanError::UpstreamRateLimited("upstream rate limit exhausted".to_string())
        }
        403 => ScanError::RepoAccessLimited("repository access is limited".to_string()),
        429 => ScanError::UpstreamRateLimited("upstream rate limit exhausted".to_string()),
        _ => ScanError::Other("upstream request failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn fetcher(server: &MockServer) -> GithubFetcher {
        GithubFetcher::new(GithubConfig {
            api_url: server.base_url(),
            token: None,
            user_agent: "harborscan-tests".to_string(),
            request_timeout: Duration::from_secs(5),
        })
    }

    fn repo_ref() -> RepoRef {
        RepoRef {
            owner: "octocat".to_string(),
            repo: "hello".to_string(),
            reference: None,
            subpaths: Vec::new(),
        }
    }

    fn blob_body(text: &str) -> String {
        let encoded = BASE64.encode(text.as_bytes());
        format!(r#"{{"content":"{encoded}","encoding":"base64"}}"#)
    }

    #[actix_web::test]
    async fn fetch_resolves_default_branch_and_decodes_blobs() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"default_branch":"main"}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/git/trees/main");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"tree":[
                        {"path":"index.js","type":"blob","size":30},
                        {"path":"logo.png","type":"blob","size":10},
                        {"path":"src","type":"tree"}
                    ]}"#,
                );
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/contents/index.js");
            then.status(200)
                .header("content-type", "application/json")
                .body(blob_body("console.log('hi');\n"));
        });

        let fetched = fetcher(&server).fetch(&repo_ref()).await.expect("fetch");

        assert_eq!(fetched.files.len(), 1);
        assert_eq!(fetched.files[0].path, "index.js");
        assert_eq!(fetched.files[0].content, "console.log('hi');\n");
        assert_eq!(fetched.files_skipped, 1);
        assert_eq!(fetched.resolved_url, "https://github.com/octocat/hello");
    }

    #[actix_web::test]
    async fn fetch_falls_back_to_plain_blobs_when_nothing_matches() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/git/trees/main");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"tree":[{"path":"LICENSE","type":"blob","size":12}]}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/contents/LICENSE");
            then.status(200)
                .header("content-type", "application/json")
                .body(blob_body("MIT License\n"));
        });

        let mut reference = repo_ref();
        reference.reference = Some("main".to_string());
        let fetched = fetcher(&server).fetch(&reference).await.expect("fetch");

        assert_eq!(fetched.files.len(), 1);
        assert_eq!(fetched.files[0].path, "LICENSE");
    }

    #[actix_web::test]
    async fn fetch_honors_subpath_restriction() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/git/trees/main");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"tree":[
                        {"path":"skills/alpha.md","type":"blob","size":5},
                        {"path":"README.md","type":"blob","size":5}
                    ]}"#,
                );
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/octocat/hello/contents/skills/alpha.md");
            then.status(200)
                .header("content-type", "application/json")
                .body(blob_body("# alpha\n"));
        });

        let mut reference = repo_ref();
        reference.reference = Some("main".to_string());
        reference.subpaths = vec!["skills".to_string()];
        let fetched = fetcher(&server).fetch(&reference).await.expect("fetch");

        assert_eq!(fetched.files.len(), 1);
        assert_eq!(fetched.files[0].path, "skills/alpha.md");
    }

    #[actix_web::test]
    async fn missing_repo_maps_to_repo_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello");
            then.status(404).body(r#"{"message":"Not Found"}"#);
        });

        let err = fetcher(&server).fetch(&repo_ref()).await.unwrap_err();
        assert_eq!(err.code(), "repo_not_found");
    }

    #[actix_web::test]
    async fn forbidden_maps_to_access_limited_or_rate_limited() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello");
            then.status(403).body("{}");
        });
        let err = fetcher(&server).fetch(&repo_ref()).await.unwrap_err();
        assert_eq!(err.code(), "repo_access_limited");

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello");
            then.status(403)
                .header("x-ratelimit-remaining", "0")
                .body("{}");
        });
        let err = fetcher(&server).fetch(&repo_ref()).await.unwrap_err();
        assert_eq!(err.code(), "rate_limited");
    }

    #[actix_web::test]
    async fn probe_skill_dirs_returns_sorted_existing_conventions() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"default_branch":"main"}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/contents/skills");
            then.status(200)
                .header("content-type", "application/json")
                .body("[]");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/contents/skill");
            then.status(404).body("{}");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/octocat/hello/contents/packages");
            then.status(200)
                .header("content-type", "application/json")
                .body("[]");
        });

        let dirs = fetcher(&server)
            .probe_skill_dirs("octocat", "hello")
            .await
            .expect("probe");
        assert_eq!(dirs, vec!["packages".to_string(), "skills".to_string()]);
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(has_allowed_extension("README.MD"));
        assert!(has_allowed_extension("script.sh"));
        assert!(!has_allowed_extension("logo.png"));
        assert!(!has_allowed_extension("Makefile"));
    }

    #[test]
    fn decode_blob_bounds_content_whatever_the_tree_claimed() {
        let oversized = "a".repeat((MAX_FILE_BYTES + 1) as usize);

        let content = ContentResponse {
            content: BASE64.encode(&oversized),
            encoding: "base64".to_string(),
        };
        assert!(decode_blob(&content).is_none());

        let content = ContentResponse {
            content: oversized,
            encoding: "none".to_string(),
        };
        assert!(decode_blob(&content).is_none());

        let content = ContentResponse {
            content: BASE64.encode("small enough"),
            encoding: "base64".to_string(),
        };
        assert_eq!(decode_blob(&content).as_deref(), Some("small enough"));
    }
}
