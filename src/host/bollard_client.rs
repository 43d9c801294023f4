//! Concrete `HostClient` backed by `bollard::Docker`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config as BollardConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, RemoveContainerOptions, RenameContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::container::labels::{parse_policy, PolicyDefaults};
use crate::container::{Container, ContainerId};

use super::{ContainerFilter, DiskUsage, ExecOutcome, HostClient, HostError, HostInfo, VersionInfo};

pub struct BollardHostClient {
    docker: Docker,
    defaults: PolicyDefaults,
    /// Whether CPU resource limits (shares/quota/period/cpuset/nano-cpus)
    /// carry over onto a recreated container. Off by default: a recreate
    /// picks up whatever resource defaults are current rather than
    /// perpetuating limits set on a now-stale container.
    cpu_copy_mode: bool,
}

impl BollardHostClient {
    pub fn connect(socket: Option<&str>, cpu_copy_mode: bool) -> Result<Self, HostError> {
        let docker = match socket {
            Some(addr) => Docker::connect_with_socket(addr, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker, defaults: PolicyDefaults::default(), cpu_copy_mode })
    }

    pub fn with_docker(docker: Docker, cpu_copy_mode: bool) -> Self {
        Self { docker, defaults: PolicyDefaults::default(), cpu_copy_mode }
    }

    async fn to_container(&self, summary: bollard::models::ContainerSummary) -> Result<Container, HostError> {
        let id = summary.id.clone().unwrap_or_default();
        let inspect = self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await?;

        let name = summary
            .names
            .and_then(|n| n.first().cloned())
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();

        let labels = summary.labels.unwrap_or_default();
        let policy = parse_policy(&labels, &self.defaults);

        let created_at = summary
            .created
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        let restarting = inspect
            .state
            .as_ref()
            .and_then(|s| s.restarting)
            .unwrap_or(false);

        let create_config = build_create_config(inspect.config.clone().unwrap_or_default());
        let host_config = inspect.host_config.clone();

        Ok(Container {
            id,
            name,
            image_id: summary.image_id.unwrap_or_default(),
            image_name: summary.image.unwrap_or_default(),
            created_at,
            running,
            restarting,
            labels,
            policy,
            create_config,
            host_config,
            stale: false,
            linked_to_restarting: false,
        })
    }
}

#[async_trait]
impl HostClient for BollardHostClient {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<Container>, HostError> {
        let mut label_filters = Vec::new();
        if let Some(label) = &filter.label {
            label_filters.push(label.clone());
        }

        let mut filters = HashMap::new();
        if !label_filters.is_empty() {
            filters.insert("label".to_string(), label_filters);
        }

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let container = self.to_container(summary).await?;
            if let Some(prefix) = &filter.name_prefix {
                if !container.name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            containers.push(container);
        }
        Ok(containers)
    }

    async fn get_container(&self, id: &str) -> Result<Container, HostError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_not_found)?;

        let summary = bollard::models::ContainerSummary {
            id: inspect.id.clone(),
            names: inspect.name.clone().map(|n| vec![n]),
            image: inspect.config.as_ref().and_then(|c| c.image.clone()),
            image_id: inspect.image.clone(),
            labels: inspect.config.as_ref().and_then(|c| c.labels.clone()),
            created: inspect
                .created
                .as_ref()
                .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
                .map(|dt| dt.timestamp()),
            ..Default::default()
        };
        self.to_container(summary).await
    }

    async fn pull_image(&self, image_name: &str) -> Result<(), HostError> {
        let options = CreateImageOptions { from_image: image_name, ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("pull {}: {}", image_name, status);
                    }
                }
                Err(e) => return Err(HostError::ImagePull(e.to_string())),
            }
        }
        Ok(())
    }

    async fn local_image_id(&self, image_name: &str) -> Result<String, HostError> {
        let image = self.docker.inspect_image(image_name).await.map_err(map_not_found)?;
        Ok(image.id.unwrap_or_default())
    }

    async fn stop_container(&self, container: &Container, timeout: Duration) -> Result<(), HostError> {
        let options = StopContainerOptions { t: timeout.as_secs() as i64 };
        match self.docker.stop_container(&container.id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(e) => Err(map_not_found(e)),
        }
    }

    async fn start_container(&self, container: &Container) -> Result<ContainerId, HostError> {
        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_not_found)?;
        Ok(container.id.clone())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), HostError> {
        let options = RenameContainerOptions { name: new_name };
        self.docker.rename_container(id, options).await.map_err(map_not_found)?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), HostError> {
        let options = RemoveContainerOptions { force, v: false, ..Default::default() };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(HostError::Docker(e)),
        }
    }

    async fn remove_image(&self, image_id: &str) -> Result<(), HostError> {
        let options = RemoveImageOptions { force: false, ..Default::default() };
        match self.docker.remove_image(image_id, Some(options), None).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(HostError::Docker(e)),
        }
    }

    async fn create_from(&self, container: &Container, new_name: &str, image_name: &str) -> Result<ContainerId, HostError> {
        let mut config: BollardConfig<String> = container.create_config.clone();
        config.image = Some(image_name.to_string());
        config.host_config = container.host_config.clone();

        if !self.cpu_copy_mode {
            if let Some(host_config) = config.host_config.as_mut() {
                host_config.cpu_shares = None;
                host_config.nano_cpus = None;
                host_config.cpu_period = None;
                host_config.cpu_quota = None;
                host_config.cpuset_cpus = None;
                host_config.cpuset_mems = None;
            }
        }

        let options = CreateContainerOptions { name: new_name, platform: None };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                if let bollard::errors::Error::DockerResponseServerError { status_code: 409, .. } = e {
                    return HostError::AlreadyExists(new_name.to_string());
                }
                HostError::Docker(e)
            })?;

        info!("created replacement container {} ({})", new_name, response.id);
        Ok(response.id)
    }

    async fn exec(
        &self,
        container_id: &str,
        cmd: &str,
        timeout: Duration,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<ExecOutcome, HostError> {
        let argv = shell_words::split(cmd).map_err(|e| HostError::Other(format!("invalid hook command: {e}")))?;

        let user = match (uid, gid) {
            (Some(u), Some(g)) => Some(format!("{u}:{g}")),
            (Some(u), None) => Some(u.to_string()),
            _ => None,
        };

        let create_options = CreateExecOptions {
            cmd: Some(argv),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            user,
            ..Default::default()
        };

        let exec = self.docker.create_exec(container_id, create_options).await?;

        let run = async {
            if let StartExecResults::Attached { mut output, .. } =
                self.docker.start_exec(&exec.id, None).await?
            {
                while let Some(chunk) = output.next().await {
                    chunk?;
                }
            }
            self.docker.inspect_exec(&exec.id).await
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(inspect)) => Ok(ExecOutcome {
                exit_code: inspect.exit_code.unwrap_or(0),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(HostError::Docker(e)),
            Err(_) => {
                warn!("lifecycle hook timed out in container {}", container_id);
                Ok(ExecOutcome { exit_code: -1, timed_out: true })
            }
        }
    }

    async fn wait_healthy(&self, container_id: &str, timeout: Duration) -> Result<(), HostError> {
        if !self.has_healthcheck(container_id).await? {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let inspect = self.docker.inspect_container(container_id, None::<InspectContainerOptions>).await?;
            let status = inspect
                .state
                .as_ref()
                .and_then(|s| s.health.as_ref())
                .and_then(|h| h.status);

            match status {
                Some(bollard::models::HealthStatusEnum::HEALTHY) => return Ok(()),
                Some(bollard::models::HealthStatusEnum::UNHEALTHY) => {
                    return Err(HostError::Other(format!("container {container_id} reported unhealthy")));
                }
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(HostError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn has_healthcheck(&self, container_id: &str) -> Result<bool, HostError> {
        let inspect = self.docker.inspect_container(container_id, None::<InspectContainerOptions>).await?;
        Ok(inspect
            .config
            .and_then(|c| c.healthcheck)
            .map(|h| h.test.map(|t| !t.is_empty()).unwrap_or(false))
            .unwrap_or(false))
    }

    async fn host_info(&self) -> Result<HostInfo, HostError> {
        let info = self.docker.info().await?;
        Ok(HostInfo {
            containers_running: info.containers_running.unwrap_or(0),
            containers_stopped: info.containers_stopped.unwrap_or(0),
            images: info.images.unwrap_or(0),
            driver: info.driver.unwrap_or_default(),
            os: info.operating_system.unwrap_or_default(),
            architecture: info.architecture.unwrap_or_default(),
        })
    }

    async fn version(&self) -> Result<VersionInfo, HostError> {
        let version = self.docker.version().await?;
        Ok(VersionInfo {
            version: version.version.unwrap_or_default(),
            api_version: version.api_version.unwrap_or_default(),
            os: version.os.unwrap_or_default(),
            arch: version.arch.unwrap_or_default(),
        })
    }

    async fn disk_usage(&self) -> Result<DiskUsage, HostError> {
        let usage = self.docker.df().await?;
        let images_size = usage.images.unwrap_or_default().iter().map(|i| i.size).sum();
        let containers_size = usage
            .containers
            .unwrap_or_default()
            .iter()
            .map(|c| c.size_rw.unwrap_or(0))
            .sum();
        let volumes_size = usage
            .volumes
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.usage_data.as_ref().map(|d| d.size))
            .sum();

        Ok(DiskUsage { images_size, containers_size, volumes_size })
    }
}

/// `bollard::models::ContainerConfig` (the inspect-response type) and
/// `bollard::container::Config` (the create-request type) are distinct
/// structs with no conversion between them; build the latter field by
/// field from the former. `host_config`/`networking_config` are left for
/// the caller to set explicitly, since the inspect-side host config is
/// tracked separately on `Container`.
fn build_create_config(cfg: bollard::models::ContainerConfig) -> BollardConfig<String> {
    BollardConfig {
        hostname: cfg.hostname,
        domainname: cfg.domainname,
        user: cfg.user,
        attach_stdin: cfg.attach_stdin,
        attach_stdout: cfg.attach_stdout,
        attach_stderr: cfg.attach_stderr,
        exposed_ports: cfg.exposed_ports,
        tty: cfg.tty,
        open_stdin: cfg.open_stdin,
        stdin_once: cfg.stdin_once,
        env: cfg.env,
        cmd: cfg.cmd,
        healthcheck: cfg.healthcheck,
        args_escaped: cfg.args_escaped,
        image: cfg.image,
        volumes: cfg.volumes,
        working_dir: cfg.working_dir,
        entrypoint: cfg.entrypoint,
        network_disabled: cfg.network_disabled,
        mac_address: cfg.mac_address,
        on_build: cfg.on_build,
        labels: cfg.labels,
        stop_signal: cfg.stop_signal,
        stop_timeout: cfg.stop_timeout,
        shell: cfg.shell,
        host_config: None,
        networking_config: None,
    }
}

fn map_not_found(e: bollard::errors::Error) -> HostError {
    if let bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } = &e {
        return HostError::NotFound(e.to_string());
    }
    HostError::Docker(e)
}
