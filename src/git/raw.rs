//! Raw Git protocol fallback: an in-memory `ls-remote`-equivalent probe,
//! used for any host that isn't GitHub/GitLab, or when the provider API
//! call fails with something other than a 404.

use git2::{Remote, RemoteCallbacks};

use super::{AuthConfig, GitError};

/// Resolve `git_ref` against the remote's advertised reference list
/// without creating a working tree. For a plain name (no `/`), resolution
/// tries an exact branch ref first, then an exact tag ref. Refs containing
/// `/` are matched verbatim.
pub async fn ls_remote_resolve(repo_url: &str, git_ref: &str, auth: &AuthConfig) -> Result<String, GitError> {
    auth.validate()?;

    let repo_url = repo_url.to_string();
    let git_ref = git_ref.to_string();
    let auth = auth.clone();

    tokio::task::spawn_blocking(move || ls_remote_blocking(&repo_url, &git_ref, &auth))
        .await
        .map_err(|e| GitError::RawProtocol(format!("raw protocol probe task panicked: {e}")))?
}

/// Build the credential callback for the validated auth. `AuthConfig::None`
/// leaves the default (anonymous) callbacks untouched.
fn build_callbacks(auth: &AuthConfig) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    match auth.clone() {
        AuthConfig::None => {}
        AuthConfig::Token(token) => {
            callbacks.credentials(move |_url, _username, _allowed| git2::Cred::userpass_plaintext(&token, ""));
        }
        AuthConfig::Basic(user, pass) => {
            callbacks.credentials(move |_url, _username, _allowed| git2::Cred::userpass_plaintext(&user, &pass));
        }
        AuthConfig::Ssh(key) => {
            let key = String::from_utf8_lossy(&key).into_owned();
            callbacks.credentials(move |_url, username, _allowed| {
                git2::Cred::ssh_key_from_memory(username.unwrap_or("git"), None, &key, None)
            });
        }
    }
    callbacks
}

fn ls_remote_blocking(repo_url: &str, git_ref: &str, auth: &AuthConfig) -> Result<String, GitError> {
    // git2 needs a repository handle to create a detached remote, but
    // `Remote::create_detached` lets us probe without a working tree.
    let mut remote = Remote::create_detached(repo_url)
        .map_err(|e| GitError::RawProtocol(format!("cannot create remote for {repo_url}: {e}")))?;

    let callbacks = build_callbacks(auth);
    remote
        .connect_auth(git2::Direction::Fetch, Some(callbacks), None)
        .map_err(|e| GitError::Unreachable(format!("{repo_url}: {e}")))?;

    let refs = remote
        .list()
        .map_err(|e| GitError::RawProtocol(format!("failed to list refs on {repo_url}: {e}")))?;

    if git_ref.contains('/') {
        for head in refs {
            if head.name() == git_ref {
                return Ok(head.oid().to_string());
            }
        }
        return Err(GitError::RefNotFound(git_ref.to_string()));
    }

    let branch_ref = format!("refs/heads/{git_ref}");
    let tag_ref = format!("refs/tags/{git_ref}");

    let mut tag_match = None;
    for head in refs {
        if head.name() == branch_ref {
            return Ok(head.oid().to_string());
        }
        if head.name() == tag_ref {
            tag_match = Some(head.oid().to_string());
        }
    }

    tag_match.ok_or_else(|| GitError::RefNotFound(git_ref.to_string()))
}
