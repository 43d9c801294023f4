//! `LifecycleRunner`: executes the four hook commands a container may
//! declare on its labels (`pre-check`, `post-check`, `pre-update`,
//! `post-update`).

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::container::Container;
use crate::host::{HostClient, HostError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    PreCheck,
    PostCheck,
    PreUpdate,
    PostUpdate,
}

#[derive(Debug, Error)]
pub enum LifecycleHookError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("hook exited with status {0}")]
    NonZeroExit(i64),
}

/// Outcome of running one hook.
#[derive(Debug, Clone, Copy)]
pub struct HookOutcome {
    pub skip_update: bool,
    pub timed_out: bool,
}

impl HookOutcome {
    fn noop() -> Self {
        Self { skip_update: false, timed_out: false }
    }
}

/// Run `hook` against `container`, targeting `target_id` (the container
/// itself for pre-hooks, the freshly started replacement for post-hooks).
///
/// An empty/absent command is a no-op. `pre-update` treats the configured
/// skip exit code as `skip_update=true` with no error; any other non-zero
/// exit is an error. Timeout failures never kill the container; they
/// surface as a hook error.
pub async fn exec(
    host: &Arc<dyn HostClient>,
    container: &Container,
    target_id: &str,
    hook: Hook,
    uid: Option<u32>,
    gid: Option<u32>,
) -> Result<HookOutcome, LifecycleHookError> {
    let command = match hook {
        Hook::PreCheck => &container.policy.hooks.pre_check,
        Hook::PostCheck => &container.policy.hooks.post_check,
        Hook::PreUpdate => &container.policy.hooks.pre_update,
        Hook::PostUpdate => &container.policy.hooks.post_update,
    };

    let Some(command) = command else {
        return Ok(HookOutcome::noop());
    };

    let outcome = host
        .exec(target_id, command, container.policy.hooks.timeout, uid, gid)
        .await?;

    if outcome.timed_out {
        warn!("{}: {:?} hook timed out", container.name, hook);
        return Err(LifecycleHookError::Host(HostError::Timeout));
    }

    if hook == Hook::PreUpdate && outcome.exit_code == container.policy.pre_update_skip_exit_code {
        return Ok(HookOutcome { skip_update: true, timed_out: false });
    }

    if outcome.exit_code != 0 {
        return Err(LifecycleHookError::NonZeroExit(outcome.exit_code));
    }

    Ok(HookOutcome::noop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bollard::container::Config as BollardConfig;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::container::ContainerPolicy;
    use crate::host::{ContainerFilter, DiskUsage, ExecOutcome, HostInfo, VersionInfo};

    struct FakeHost {
        exit_code: i64,
        timed_out: bool,
    }

    #[async_trait]
    impl HostClient for FakeHost {
        async fn list_containers(&self, _: &ContainerFilter) -> Result<Vec<Container>, HostError> {
            unimplemented!()
        }
        async fn get_container(&self, _: &str) -> Result<Container, HostError> {
            unimplemented!()
        }
        async fn pull_image(&self, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn local_image_id(&self, _: &str) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn stop_container(&self, _: &Container, _: Duration) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn start_container(&self, _: &Container) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn rename_container(&self, _: &str, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn remove_container(&self, _: &str, _: bool) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn remove_image(&self, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn create_from(&self, _: &Container, _: &str, _: &str) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn exec(
            &self,
            _: &str,
            _: &str,
            _: Duration,
            _: Option<u32>,
            _: Option<u32>,
        ) -> Result<ExecOutcome, HostError> {
            Ok(ExecOutcome { exit_code: self.exit_code, timed_out: self.timed_out })
        }
        async fn wait_healthy(&self, _: &str, _: Duration) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn has_healthcheck(&self, _: &str) -> Result<bool, HostError> {
            unimplemented!()
        }
        async fn host_info(&self) -> Result<HostInfo, HostError> {
            unimplemented!()
        }
        async fn version(&self) -> Result<VersionInfo, HostError> {
            unimplemented!()
        }
        async fn disk_usage(&self) -> Result<DiskUsage, HostError> {
            unimplemented!()
        }
    }

    fn container_with_hook(command: &str) -> Container {
        let mut policy = ContainerPolicy::default();
        policy.hooks.pre_update = Some(command.to_string());
        Container {
            id: "c1".to_string(),
            name: "c1".to_string(),
            image_id: "i1".to_string(),
            image_name: "repo:tag".to_string(),
            created_at: Utc::now(),
            running: true,
            restarting: false,
            labels: HashMap::new(),
            policy,
            create_config: BollardConfig::default(),
            host_config: None,
            stale: false,
            linked_to_restarting: false,
        }
    }

    #[tokio::test]
    async fn absent_hook_is_a_noop() {
        let host: Arc<dyn HostClient> = Arc::new(FakeHost { exit_code: 0, timed_out: false });
        let container = {
            let mut c = container_with_hook("echo hi");
            c.policy.hooks.pre_update = None;
            c
        };
        let outcome = exec(&host, &container, "c1", Hook::PreUpdate, None, None).await.unwrap();
        assert!(!outcome.skip_update);
    }

    #[tokio::test]
    async fn pre_update_distinguished_exit_code_skips() {
        let host: Arc<dyn HostClient> = Arc::new(FakeHost { exit_code: 75, timed_out: false });
        let container = container_with_hook("check.sh");
        let outcome = exec(&host, &container, "c1", Hook::PreUpdate, None, None).await.unwrap();
        assert!(outcome.skip_update);
    }

    #[tokio::test]
    async fn pre_update_other_nonzero_exit_is_error() {
        let host: Arc<dyn HostClient> = Arc::new(FakeHost { exit_code: 1, timed_out: false });
        let container = container_with_hook("check.sh");
        let result = exec(&host, &container, "c1", Hook::PreUpdate, None, None).await;
        assert!(matches!(result, Err(LifecycleHookError::NonZeroExit(1))));
    }
}
