//! `HostClient`: the capability trait the engine uses for every mutating
//! or I/O-bound container operation. `crate::container::Container` stays
//! an immutable data record; this is the small interface around it
//! (`Stop`, `Start`, `Rename`, `ExecuteCommand`, `WaitForContainerHealthy`,
//! ...) the design notes call for instead of a ~35-method god interface.

pub mod bollard_client;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::container::{Container, ContainerId};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container already exists: {0}")]
    AlreadyExists(String),
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("image pull failed: {0}")]
    ImagePull(String),
    #[error("{0}")]
    Other(String),
}

/// Filter applied when listing containers (by label and/or name prefix).
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    pub label: Option<String>,
    pub name_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i64,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct HostInfo {
    pub containers_running: i64,
    pub containers_stopped: i64,
    pub images: i64,
    pub driver: String,
    pub os: String,
    pub architecture: String,
}

#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone)]
pub struct DiskUsage {
    pub images_size: i64,
    pub containers_size: i64,
    pub volumes_size: i64,
}

#[async_trait]
pub trait HostClient: Send + Sync {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<Container>, HostError>;
    async fn get_container(&self, id: &str) -> Result<Container, HostError>;

    async fn pull_image(&self, image_name: &str) -> Result<(), HostError>;
    async fn local_image_id(&self, image_name: &str) -> Result<String, HostError>;

    async fn stop_container(&self, container: &Container, timeout: Duration) -> Result<(), HostError>;
    async fn start_container(&self, container: &Container) -> Result<ContainerId, HostError>;
    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), HostError>;
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), HostError>;
    async fn remove_image(&self, image_id: &str) -> Result<(), HostError>;

    async fn create_from(&self, container: &Container, new_name: &str, image_name: &str) -> Result<ContainerId, HostError>;

    async fn exec(
        &self,
        container_id: &str,
        cmd: &str,
        timeout: Duration,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<ExecOutcome, HostError>;

    async fn wait_healthy(&self, container_id: &str, timeout: Duration) -> Result<(), HostError>;
    async fn has_healthcheck(&self, container_id: &str) -> Result<bool, HostError>;

    async fn host_info(&self) -> Result<HostInfo, HostError>;
    async fn version(&self) -> Result<VersionInfo, HostError>;
    async fn disk_usage(&self) -> Result<DiskUsage, HostError>;
}

/// Labels applied to recreated containers so a future cycle can attribute
/// them back to this daemon.
pub fn merge_labels(base: &HashMap<String, String>, extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (k, v) in extra {
        merged.insert(k.to_string(), v.to_string());
    }
    merged
}
