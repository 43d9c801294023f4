//! Label -> `ContainerPolicy` parsing.
//!
//! Labels are the only configuration surface a container itself can carry.
//! Everything here is a pure function over a label map; no I/O, no Docker
//! calls. Parsed once per `HostClient::list_containers` call.

use std::collections::HashMap;
use std::time::Duration;

use crate::container::{ContainerPolicy, GitLabelConfig, LifecycleHooks};
use crate::git::UpdatePolicy;

const ENABLE: &str = "sentinel.enable";
const MONITOR_ONLY: &str = "sentinel.monitor-only";
const SCOPE: &str = "sentinel.scope";
const NO_PULL: &str = "sentinel.no-pull";
const NO_RESTART: &str = "sentinel.no-restart";
const STOP_SIGNAL: &str = "sentinel.stop-signal";
const STOP_TIMEOUT: &str = "sentinel.stop-timeout";
const WATCHTOWER_SELF: &str = "sentinel.self";
const DEPENDS_ON: &str = "sentinel.depends-on";
const CONTAINER_CHAIN: &str = "sentinel.chain";
const SKIP_EXIT_CODE: &str = "sentinel.lifecycle.skip-exit-code";
const HOOK_PRE_CHECK: &str = "sentinel.lifecycle.pre-check";
const HOOK_POST_CHECK: &str = "sentinel.lifecycle.post-check";
const HOOK_PRE_UPDATE: &str = "sentinel.lifecycle.pre-update";
const HOOK_POST_UPDATE: &str = "sentinel.lifecycle.post-update";
const HOOK_TIMEOUT: &str = "sentinel.lifecycle.timeout";
const GIT_REPO: &str = "sentinel.git.repo";
const GIT_REF: &str = "sentinel.git.ref";
const GIT_POLICY: &str = "sentinel.git.policy";
const GIT_LAST_COMMIT: &str = "sentinel.git.last-commit";

/// Defaults applied where a label is absent, supplied by daemon configuration
/// (so e.g. the skip-exit-code and hook timeout are config-carried, not
/// hard-coded, per the open question in the design notes).
#[derive(Debug, Clone)]
pub struct PolicyDefaults {
    pub stop_timeout: Duration,
    pub hook_timeout: Duration,
    pub pre_update_skip_exit_code: i64,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            hook_timeout: Duration::from_secs(60),
            pre_update_skip_exit_code: 75,
        }
    }
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

pub fn parse_policy(labels: &HashMap<String, String>, defaults: &PolicyDefaults) -> ContainerPolicy {
    let enabled = labels.get(ENABLE).map(|v| truthy(v)).unwrap_or(true);
    let monitor_only = labels.get(MONITOR_ONLY).map(|v| truthy(v)).unwrap_or(false);
    let scope = labels.get(SCOPE).cloned();
    let no_pull = labels.get(NO_PULL).map(|v| truthy(v)).unwrap_or(false);
    let no_restart = labels.get(NO_RESTART).map(|v| truthy(v)).unwrap_or(false);
    let stop_signal = labels.get(STOP_SIGNAL).cloned().unwrap_or_else(|| "SIGTERM".to_string());
    let stop_timeout = labels
        .get(STOP_TIMEOUT)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.stop_timeout);
    let watchtower_self = labels.get(WATCHTOWER_SELF).map(|v| truthy(v)).unwrap_or(false);
    let container_chain = labels.get(CONTAINER_CHAIN).cloned();
    let depends_on = labels
        .get(DEPENDS_ON)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let pre_update_skip_exit_code = labels
        .get(SKIP_EXIT_CODE)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(defaults.pre_update_skip_exit_code);

    let hook_timeout = labels
        .get(HOOK_TIMEOUT)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.hook_timeout);

    let hooks = LifecycleHooks {
        pre_check: labels.get(HOOK_PRE_CHECK).cloned().filter(|v| !v.is_empty()),
        post_check: labels.get(HOOK_POST_CHECK).cloned().filter(|v| !v.is_empty()),
        pre_update: labels.get(HOOK_PRE_UPDATE).cloned().filter(|v| !v.is_empty()),
        post_update: labels.get(HOOK_POST_UPDATE).cloned().filter(|v| !v.is_empty()),
        timeout: hook_timeout,
    };

    let git = labels.get(GIT_REPO).map(|repo_url| GitLabelConfig {
        repo_url: repo_url.clone(),
        git_ref: labels.get(GIT_REF).cloned().unwrap_or_else(|| "main".to_string()),
        policy: labels
            .get(GIT_POLICY)
            .map(|v| UpdatePolicy::parse(v))
            .unwrap_or(UpdatePolicy::Major),
        last_commit: labels.get(GIT_LAST_COMMIT).cloned(),
    });

    ContainerPolicy {
        enabled,
        monitor_only,
        scope,
        no_pull,
        no_restart,
        stop_signal,
        stop_timeout,
        hooks,
        pre_update_skip_exit_code,
        watchtower_self,
        depends_on,
        container_chain,
        git,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_when_no_labels_present() {
        let policy = parse_policy(&HashMap::new(), &PolicyDefaults::default());
        assert!(policy.enabled);
        assert!(!policy.monitor_only);
        assert!(policy.depends_on.is_empty());
        assert!(policy.git.is_none());
    }

    #[test]
    fn parses_depends_on_list() {
        let policy = parse_policy(
            &labels(&[(DEPENDS_ON, "db, cache ,queue")]),
            &PolicyDefaults::default(),
        );
        assert_eq!(policy.depends_on, vec!["db", "cache", "queue"]);
    }

    #[test]
    fn parses_git_tracking_config() {
        let policy = parse_policy(
            &labels(&[
                (GIT_REPO, "https://github.com/acme/app"),
                (GIT_REF, "v1.2.3"),
                (GIT_POLICY, "minor"),
            ]),
            &PolicyDefaults::default(),
        );
        let git = policy.git.expect("git config parsed");
        assert_eq!(git.repo_url, "https://github.com/acme/app");
        assert_eq!(git.git_ref, "v1.2.3");
        assert_eq!(git.policy, UpdatePolicy::Minor);
    }

    #[test]
    fn skip_exit_code_falls_back_to_default() {
        let defaults = PolicyDefaults { pre_update_skip_exit_code: 42, ..PolicyDefaults::default() };
        let policy = parse_policy(&HashMap::new(), &defaults);
        assert_eq!(policy.pre_update_skip_exit_code, 42);
    }
}
