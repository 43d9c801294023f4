//! GitHub / GitLab REST probes for the latest commit on a ref.

use reqwest::Client;
use serde::Deserialize;

use super::{AuthConfig, GitError};

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitlabCommit {
    id: String,
}

fn repo_path(repo_url: &str) -> Result<(String, String), GitError> {
    let url = url::Url::parse(repo_url).map_err(|e| GitError::Provider(e.to_string()))?;
    let path = url.path().trim_start_matches('/').trim_end_matches(".git");
    let mut parts = path.splitn(2, '/');
    let owner = parts.next().unwrap_or_default().to_string();
    let repo = parts.next().unwrap_or_default().to_string();
    if owner.is_empty() || repo.is_empty() {
        return Err(GitError::Provider(format!("cannot parse owner/repo from {repo_url}")));
    }
    Ok((owner, repo))
}

pub async fn github_commit(
    http: &Client,
    repo_url: &str,
    git_ref: &str,
    auth: &AuthConfig,
) -> Result<String, GitError> {
    let (owner, repo) = repo_path(repo_url)?;
    let url = format!("https://api.github.com/repos/{owner}/{repo}/commits/{git_ref}");

    let mut req = http.get(&url).header("User-Agent", "sentinel-daemon");
    req = match auth {
        AuthConfig::Token(t) => req.header("Authorization", format!("token {t}")),
        AuthConfig::Basic(u, p) => req.basic_auth(u, Some(p)),
        _ => req,
    };

    let resp = req.send().await?;
    if resp.status().as_u16() == 404 {
        return Err(GitError::RefNotFound(format!("{owner}/{repo}@{git_ref}")));
    }
    if !resp.status().is_success() {
        return Err(GitError::Provider(format!(
            "github API returned {} for {owner}/{repo}@{git_ref}",
            resp.status()
        )));
    }

    let commit: GithubCommit = resp.json().await?;
    Ok(commit.sha)
}

pub async fn gitlab_commit(
    http: &Client,
    repo_url: &str,
    git_ref: &str,
    auth: &AuthConfig,
) -> Result<String, GitError> {
    let (owner, repo) = repo_path(repo_url)?;
    let project = urlencoding_path(&format!("{owner}/{repo}"));
    let url = format!("https://gitlab.com/api/v4/projects/{project}/repository/commits/{git_ref}");

    let mut req = http.get(&url);
    req = match auth {
        AuthConfig::Token(t) => req.header("Private-Token", t),
        AuthConfig::Basic(u, p) => req.basic_auth(u, Some(p)),
        _ => req,
    };

    let resp = req.send().await?;
    if resp.status().as_u16() == 404 {
        return Err(GitError::RefNotFound(format!("{owner}/{repo}@{git_ref}")));
    }
    if !resp.status().is_success() {
        return Err(GitError::Provider(format!(
            "gitlab API returned {} for {owner}/{repo}@{git_ref}",
            resp.status()
        )));
    }

    let commit: GitlabCommit = resp.json().await?;
    Ok(commit.id)
}

/// Percent-encode a path segment the way GitLab expects for `project`
/// (the `/` between namespace and name must be escaped as `%2F`).
fn urlencoding_path(s: &str) -> String {
    s.replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_path_parses_github_style_url() {
        let (owner, repo) = repo_path("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn repo_path_strips_dot_git_suffix() {
        let (owner, repo) = repo_path("https://github.com/acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn gitlab_project_path_escapes_slash() {
        assert_eq!(urlencoding_path("acme/widgets"), "acme%2Fwidgets");
    }
}
