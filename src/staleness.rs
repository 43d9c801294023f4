//! `StalenessDetector`: decides whether a single container's image has
//! drifted from what's running, without touching any other container.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::container::Container;
use crate::git::{AuthConfig, GitError, GitTracker};
use crate::host::{HostClient, HostError};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Outcome of scanning one container for staleness.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub new_reference: String,
    pub stale: bool,
    pub skipped: bool,
}

impl ScanOutcome {
    fn fresh(reference: String) -> Self {
        Self { new_reference: reference, stale: false, skipped: false }
    }

    fn skip(reference: String) -> Self {
        Self { new_reference: reference, stale: false, skipped: true }
    }

    fn stale(reference: String) -> Self {
        Self { new_reference: reference, stale: true, skipped: false }
    }
}

/// Scan `container` for staleness. `monitor_only` has no effect here — a
/// monitor-only container is still scanned and correctly marked
/// stale/fresh, it is only ever excluded from the engine's candidate
/// selection (the step that decides what actually gets stopped/started).
///
/// 1. `no_pull` (policy or daemon-wide) skips the registry round-trip and
///    compares against whatever image is already present locally.
/// 2. Otherwise pull the image reference first (HEAD-first semantics:
///    the pull itself is what tells us if a new digest exists).
/// 3. A Git-tracked container delegates to `GitTracker` instead of the
///    registry; the comparison is against the recorded commit, not an
///    image digest.
pub async fn scan(
    container: &Container,
    host: &Arc<dyn HostClient>,
    git: &Arc<dyn GitTracker>,
    git_auth: &AuthConfig,
    daemon_no_pull: bool,
) -> Result<ScanOutcome, ScanError> {
    if let Some(git_cfg) = &container.policy.git {
        return scan_git_tracked(container, git, git_cfg, git_auth).await;
    }

    if daemon_no_pull || container.policy.no_pull {
        debug!("{}: no-pull, comparing against local image", container.name);
        let local = host.local_image_id(&container.image_name).await?;
        return Ok(compare(container, local));
    }

    match host.pull_image(&container.image_name).await {
        Ok(()) => {}
        Err(e) => {
            warn!("{}: pull failed: {e}", container.name);
            return Ok(ScanOutcome::skip(container.image_id.clone()));
        }
    }

    let local = host.local_image_id(&container.image_name).await?;
    Ok(compare(container, local))
}

fn compare(container: &Container, new_image_id: String) -> ScanOutcome {
    if new_image_id == container.image_id {
        ScanOutcome::fresh(new_image_id)
    } else {
        ScanOutcome::stale(new_image_id)
    }
}

async fn scan_git_tracked(
    container: &Container,
    git: &Arc<dyn GitTracker>,
    git_cfg: &crate::container::GitLabelConfig,
    git_auth: &AuthConfig,
) -> Result<ScanOutcome, ScanError> {
    let latest = git
        .get_latest_commit(&git_cfg.repo_url, &git_cfg.git_ref, git_auth)
        .await?;

    let current = git_cfg.last_commit.clone().unwrap_or_default();

    let advances = match (current.is_empty(), latest == current) {
        (true, _) => true,
        (false, true) => false,
        (false, false) => git_cfg.policy.allows(&current, &latest),
    };

    if advances {
        Ok(ScanOutcome::stale(latest))
    } else {
        Ok(ScanOutcome::fresh(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_flags_stale_on_digest_change() {
        let outcome = compare(&sample_container("old-id"), "new-id".to_string());
        assert!(outcome.stale);
    }

    #[test]
    fn compare_is_fresh_on_matching_digest() {
        let outcome = compare(&sample_container("same-id"), "same-id".to_string());
        assert!(!outcome.stale);
    }

    fn sample_container(image_id: &str) -> Container {
        use crate::container::ContainerPolicy;
        use bollard::container::Config as BollardConfig;
        use chrono::Utc;

        Container {
            id: "c1".to_string(),
            name: "c1".to_string(),
            image_id: image_id.to_string(),
            image_name: "repo:tag".to_string(),
            created_at: Utc::now(),
            running: true,
            restarting: false,
            labels: Default::default(),
            policy: ContainerPolicy::default(),
            create_config: BollardConfig::default(),
            host_config: None,
            stale: false,
            linked_to_restarting: false,
        }
    }
}
