//! Intake resolution.
//!
//! Classifies caller input (repository URL, package install command,
//! or an add-skill shorthand), invokes the matching fetcher, and
//! materializes the fetched files into a scratch workspace whose
//! cleanup is idempotent.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

use harborscan_core::{Provenance, ScanError, SourceKind};

use crate::github::{GithubFetcher, RepoRef, SourceFile};
use crate::registry::{PackageRef, RegistryFetcher};

static NAME_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("segment pattern"));

/// Tools whose install commands are recognized as package input.
const INSTALL_TOOLS: &[&str] = &["bun", "npm", "npx", "pnpm", "yarn"];
const INSTALL_VERBS: &[&str] = &["add", "i", "install"];

/// A resolved intake: fetched files plus a scratch workspace.
///
/// The workspace holds a materialized copy of every fetched file so
/// subprocess scanners can run against it. [`IntakeResult::cleanup`]
/// removes it and may be called more than once.
#[derive(Debug)]
pub struct IntakeResult {
    /// Whether the input resolved to a repository or a package.
    pub kind: SourceKind,
    /// Fetched files in fetch order.
    pub files: Vec<SourceFile>,
    /// Number of files excluded by filters or bounds.
    pub files_skipped: usize,
    /// Where the files came from.
    pub provenance: Provenance,
    workspace: Option<PathBuf>,
}

impl IntakeResult {
    /// Path of the scratch workspace, if one still exists.
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Remove the scratch workspace. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.workspace.take() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                warn!("failed to remove scan workspace: {err}");
            }
        }
    }
}

impl Drop for IntakeResult {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Classifies input and routes it to the matching fetcher.
#[derive(Debug, Clone)]
pub struct IntakeResolver {
    github: GithubFetcher,
    registry: RegistryFetcher,
}

impl IntakeResolver {
    /// Build a resolver over the supplied fetchers.
    pub fn new(github: GithubFetcher, registry: RegistryFetcher) -> Self {
        Self { github, registry }
    }

    /// Build a resolver from environment configuration.
    pub fn from_env() -> Self {
        Self::new(GithubFetcher::from_env(), RegistryFetcher::from_env())
    }

    /// Resolve caller input to fetched files plus provenance.
    ///
    /// Classification order: repository URL, package install command,
    /// add-skill shorthand, then anything else as an opaque repository
    /// reference. Unrecognized but plausible input is never dropped.
    pub async fn resolve(&self, input: &str) -> Result<IntakeResult, ScanError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ScanError::InvalidInput("input is empty".to_string()));
        }

        if let Some(repo_ref) = parse_repo_url(input) {
            return self.fetch_repo(repo_ref).await;
        }
        if let Some(package) = parse_install_command(input) {
            return self.fetch_package(package).await;
        }
        if let Some((owner, repo)) = parse_shorthand(input) {
            match self.github.probe_skill_dirs(&owner, &repo).await {
                Ok(subpaths) => {
                    return self
                        .fetch_repo(RepoRef {
                            owner,
                            repo,
                            reference: None,
                            subpaths,
                        })
                        .await;
                }
                Err(err) => {
                    // Shorthand resolution failure degrades to a
                    // package lookup instead of propagating.
                    warn!("skill shorthand did not resolve ({}): trying registry", err.code());
                    return self
                        .fetch_package(PackageRef {
                            name: format!("{owner}/{repo}"),
                            version: None,
                        })
                        .await;
                }
            }
        }

        match parse_opaque_reference(input) {
            Some(repo_ref) => self.fetch_repo(repo_ref).await,
            None => Err(ScanError::InvalidRepoUrl(
                "input could not be resolved to a repository".to_string(),
            )),
        }
    }

    async fn fetch_repo(&self, repo_ref: RepoRef) -> Result<IntakeResult, ScanError> {
        let fetched = self.github.fetch(&repo_ref).await?;
        let workspace = materialize(&fetched.files)?;
        Ok(IntakeResult {
            kind: SourceKind::Repo,
            files: fetched.files,
            files_skipped: fetched.files_skipped,
            provenance: Provenance {
                repo_url: Some(fetched.resolved_url),
                package_name: None,
                package_version: None,
            },
            workspace: Some(workspace),
        })
    }

    async fn fetch_package(&self, package: PackageRef) -> Result<IntakeResult, ScanError> {
        let fetched = self.registry.fetch(&package).await?;
        let workspace = materialize(&fetched.files)?;
        Ok(IntakeResult {
            kind: SourceKind::Package,
            files: fetched.files,
            files_skipped: fetched.files_skipped,
            provenance: Provenance {
                repo_url: None,
                package_name: Some(fetched.name),
                package_version: Some(fetched.version),
            },
            workspace: Some(workspace),
        })
    }
}

/// Write fetched files into a fresh scratch directory.
fn materialize(files: &[SourceFile]) -> Result<PathBuf, ScanError> {
    let dir = std::env::temp_dir().join(format!("harborscan-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    for file in files {
        let relative = Path::new(&file.path);
        // Fetchers already sanitize paths; re-check before touching disk.
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            continue;
        }
        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &file.content)?;
    }
    Ok(dir)
}

/// Parse the GitHub URL forms, with optional `.git`, ref, and sub-path.
fn parse_repo_url(input: &str) -> Option<RepoRef> {
    let rest = input
        .strip_prefix("https://github.com/")
        .or_else(|| input.strip_prefix("http://github.com/"))
        .or_else(|| input.strip_prefix("github.com/"))?;
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.trim_end_matches(".git").to_string();
    if !NAME_SEGMENT.is_match(&owner) || !NAME_SEGMENT.is_match(&repo) {
        return None;
    }

    let mut reference = None;
    let mut subpaths = Vec::new();
    let remaining: Vec<&str> = segments.collect();
    if let Some(marker) = remaining.first() {
        if *marker == "tree" || *marker == "blob" {
            reference = remaining.get(1).map(|s| s.to_string());
            if remaining.len() > 2 {
                subpaths.push(remaining[2..].join("/"));
            }
        }
    }
    Some(RepoRef {
        owner,
        repo,
        reference,
        subpaths,
    })
}

/// Parse `<tool> install|i|add <name>[@version]` (npx takes the name
/// directly).
fn parse_install_command(input: &str) -> Option<PackageRef> {
    let mut tokens = input.split_whitespace();
    let tool = tokens.next()?;
    if !INSTALL_TOOLS.contains(&tool) {
        return None;
    }
    let name_token = if tool == "npx" {
        tokens.next()?
    } else {
        let verb = tokens.next()?;
        if !INSTALL_VERBS.contains(&verb) {
            return None;
        }
        tokens.next()?
    };
    // Flags like `-g` are not a package name.
    let name_token = if name_token.starts_with('-') {
        tokens.next()?
    } else {
        name_token
    };
    Some(split_name_version(name_token))
}

/// Split `name[@version]`, keeping the scope marker of scoped names.
fn split_name_version(token: &str) -> PackageRef {
    let at = token.rfind('@').filter(|idx| *idx > 0);
    match at {
        Some(idx) => PackageRef {
            name: token[..idx].to_string(),
            version: Some(token[idx + 1..].to_string()),
        },
        None => PackageRef {
            name: token.to_string(),
            version: None,
        },
    }
}

/// A bare `owner/repo` token is treated as an add-skill shorthand.
fn parse_shorthand(input: &str) -> Option<(String, String)> {
    let (owner, repo) = input.split_once('/')?;
    if repo.contains('/') || !NAME_SEGMENT.is_match(owner) || !NAME_SEGMENT.is_match(repo) {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Last-resort parse: squeeze `owner/repo` out of anything with at
/// least two path-like segments.
fn parse_opaque_reference(input: &str) -> Option<RepoRef> {
    let trimmed = input
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let (owner, repo) = (segments[segments.len() - 2], segments[segments.len() - 1]);
    let repo = repo.trim_end_matches(".git");
    if !NAME_SEGMENT.is_match(owner) || !NAME_SEGMENT.is_match(repo) {
        return None;
    }
    Some(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        reference: None,
        subpaths: Vec::new(),
    })
}
