//! Git ref tracking: resolves a repository+ref to a commit hash via
//! provider REST API, falling back to the raw Git protocol.

pub mod provider;
pub mod raw;

use async_trait::async_trait;
use semver::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("auth config invalid: {0}")]
    InvalidAuth(String),
    #[error("repository unreachable: {0}")]
    Unreachable(String),
    #[error("ref not found: {0}")]
    RefNotFound(String),
    #[error("provider API error: {0}")]
    Provider(String),
    #[error("raw protocol probe failed: {0}")]
    RawProtocol(String),
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Git authentication. Empty required fields fail validation fast with a
/// distinguishable error kind, before any network call is attempted.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    None,
    Token(String),
    Basic(String, String),
    Ssh(Vec<u8>),
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), GitError> {
        match self {
            AuthConfig::None => Ok(()),
            AuthConfig::Token(t) if t.is_empty() => {
                Err(GitError::InvalidAuth("token auth requires a non-empty token".into()))
            }
            AuthConfig::Basic(u, p) if u.is_empty() || p.is_empty() => {
                Err(GitError::InvalidAuth("basic auth requires user and password".into()))
            }
            AuthConfig::Ssh(key) if key.is_empty() => {
                Err(GitError::InvalidAuth("ssh auth requires key bytes".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Controls which semver deltas are accepted as an update for a tag-based
/// ref. Non-semver tags fall back to plain equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    Patch,
    Minor,
    Major,
    None,
}

impl UpdatePolicy {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "patch" => UpdatePolicy::Patch,
            "minor" => UpdatePolicy::Minor,
            "none" => UpdatePolicy::None,
            _ => UpdatePolicy::Major,
        }
    }

    /// Whether moving from `old` to `new` is permitted by this policy.
    /// Both values are first tried as semver; if either fails to parse,
    /// the comparison degrades to plain string equality (i.e. any
    /// difference counts as an update, consistent with a plain ref).
    pub fn allows(&self, old: &str, new: &str) -> bool {
        if *self == UpdatePolicy::None {
            return false;
        }
        if old == new {
            return false;
        }
        let (Ok(old_v), Ok(new_v)) = (parse_semver(old), parse_semver(new)) else {
            return true;
        };
        match self {
            UpdatePolicy::None => false,
            UpdatePolicy::Patch => {
                new_v.major == old_v.major && new_v.minor == old_v.minor && new_v.patch > old_v.patch
            }
            UpdatePolicy::Minor => {
                new_v.major == old_v.major
                    && (new_v.minor > old_v.minor
                        || (new_v.minor == old_v.minor && new_v.patch > old_v.patch))
            }
            UpdatePolicy::Major => new_v > old_v,
        }
    }
}

fn parse_semver(s: &str) -> Result<Version, semver::Error> {
    Version::parse(s.trim_start_matches('v'))
}

#[async_trait]
pub trait GitTracker: Send + Sync {
    async fn get_latest_commit(
        &self,
        repo_url: &str,
        git_ref: &str,
        auth: &AuthConfig,
    ) -> Result<String, GitError>;
}

/// Default tracker: dispatches by host (github.com / gitlab.com REST APIs),
/// falling back to a raw-protocol `ls-remote`-equivalent probe for anything
/// else, or when the provider API returns a non-404 error.
pub struct GitTrackerImpl {
    http: reqwest::Client,
}

impl GitTrackerImpl {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl Default for GitTrackerImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitTracker for GitTrackerImpl {
    async fn get_latest_commit(
        &self,
        repo_url: &str,
        git_ref: &str,
        auth: &AuthConfig,
    ) -> Result<String, GitError> {
        auth.validate()?;

        let host = url::Url::parse(repo_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();

        let provider_result = match host.as_str() {
            "github.com" => Some(provider::github_commit(&self.http, repo_url, git_ref, auth).await),
            "gitlab.com" => Some(provider::gitlab_commit(&self.http, repo_url, git_ref, auth).await),
            _ => None,
        };

        match provider_result {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(GitError::RefNotFound(_))) | None => {
                raw::ls_remote_resolve(repo_url, git_ref, auth).await
            }
            Some(Err(e)) => Err(e),
        }
    }
}
