//! Container snapshot and the policy parsed once from its labels.
//!
//! Mirrors the split the design notes call for: an immutable data record
//! for predicates/metadata (this module) plus a small capability trait for
//! the mutating side (`crate::host::HostClient`). Nothing here talks to
//! Docker directly.

pub mod labels;

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::Config as BollardConfig;
use bollard::models::HostConfig;
use chrono::{DateTime, Utc};

use crate::git::UpdatePolicy;

/// Opaque container identity as reported by the container runtime.
pub type ContainerId = String;

/// Strip an optional `sha256:` prefix and take the first 12 hex chars of
/// the digest. Strings shorter than that are returned unchanged.
pub fn short_id(id: &str) -> String {
    let digest = id.strip_prefix("sha256:").unwrap_or(id);
    if digest.len() < 12 {
        id.to_string()
    } else {
        digest[..12].to_string()
    }
}

/// Shell commands and the shared timeout for the four lifecycle hooks.
#[derive(Debug, Clone, Default)]
pub struct LifecycleHooks {
    pub pre_check: Option<String>,
    pub post_check: Option<String>,
    pub pre_update: Option<String>,
    pub post_update: Option<String>,
    pub timeout: Duration,
}

impl LifecycleHooks {
    pub fn is_empty(&self) -> bool {
        self.pre_check.is_none()
            && self.post_check.is_none()
            && self.pre_update.is_none()
            && self.post_update.is_none()
    }
}

/// Git-ref tracking configuration parsed from a container's labels.
#[derive(Debug, Clone)]
pub struct GitLabelConfig {
    pub repo_url: String,
    pub git_ref: String,
    pub policy: UpdatePolicy,
    pub last_commit: Option<String>,
}

/// Policy parsed once from a container's labels at list time. Engine code
/// reads fields here rather than re-deriving predicates from raw labels on
/// every access.
#[derive(Debug, Clone)]
pub struct ContainerPolicy {
    pub enabled: bool,
    pub monitor_only: bool,
    pub scope: Option<String>,
    pub no_pull: bool,
    pub no_restart: bool,
    pub stop_signal: String,
    pub stop_timeout: Duration,
    pub hooks: LifecycleHooks,
    pub pre_update_skip_exit_code: i64,
    pub watchtower_self: bool,
    /// Names (within the scanned set) this container must start after.
    pub depends_on: Vec<String>,
    /// Grouping identifier; distinct from `depends_on`, used only to tag
    /// related containers for reporting/diagnostics.
    pub container_chain: Option<String>,
    pub git: Option<GitLabelConfig>,
}

impl Default for ContainerPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor_only: false,
            scope: None,
            no_pull: false,
            no_restart: false,
            stop_signal: "SIGTERM".to_string(),
            stop_timeout: Duration::from_secs(10),
            hooks: LifecycleHooks::default(),
            pre_update_skip_exit_code: 75,
            watchtower_self: false,
            depends_on: Vec::new(),
            container_chain: None,
            git: None,
        }
    }
}

/// Immutable snapshot of one container, as seen at the start of a cycle.
/// `stale` and `linked_to_restarting` are the only fields the engine may
/// mutate during the cycle that produced this snapshot.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub image_id: String,
    pub image_name: String,
    pub created_at: DateTime<Utc>,
    pub running: bool,
    pub restarting: bool,
    pub labels: HashMap<String, String>,
    pub policy: ContainerPolicy,
    /// Preserved creation config, reused verbatim when recreating.
    pub create_config: BollardConfig<String>,
    pub host_config: Option<HostConfig>,

    pub stale: bool,
    pub linked_to_restarting: bool,
}

impl Container {
    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }

    pub fn short_image_id(&self) -> String {
        short_id(&self.image_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_strips_sha256_prefix() {
        let digest = "a".repeat(64);
        let full = format!("sha256:{digest}");
        assert_eq!(short_id(&full), digest[..12]);
    }

    #[test]
    fn short_id_of_bare_hex_string() {
        let digest = "b".repeat(40);
        assert_eq!(short_id(&digest), digest[..12]);
    }

    #[test]
    fn short_id_of_short_string_is_unchanged() {
        assert_eq!(short_id("abc123"), "abc123");
        assert_eq!(short_id("sha256:abc"), "sha256:abc");
    }
}
