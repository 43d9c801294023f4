//! Configuration structures and loading.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::git::{AuthConfig as GitAuthConfig, UpdatePolicy};
use crate::notify::template::{StaticData, Template};

/// Top-level daemon configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub daemon: DaemonConfiguration,

    #[serde(default)]
    pub docker: DockerConfiguration,

    #[serde(default)]
    pub lifecycle: LifecycleConfiguration,

    #[serde(default)]
    pub http_api: HttpApiConfiguration,

    #[serde(default)]
    pub notifications: NotificationsConfiguration,

    #[serde(default)]
    pub git: GitConfiguration,
}

impl Configuration {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = std::path::Path::new(path);
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {path}"))?;

        let config: Configuration =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Structural validation beyond what serde/defaults already enforce.
    /// Fatal at startup, per the error taxonomy's `ConfigInvalid`.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.interval_secs == 0 && !self.daemon.run_once {
            anyhow::bail!("daemon.interval_secs must be non-zero unless daemon.run_once is set");
        }
        if self.http_api.enabled && self.http_api.bearer_token.trim().is_empty() {
            anyhow::bail!("http_api.bearer_token must be set when http_api.enabled is true");
        }
        self.git.auth().validate().map_err(|e| anyhow::anyhow!("git.auth: {e}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfiguration {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub update_on_start: bool,
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub no_restart: bool,
    #[serde(default)]
    pub no_pull: bool,
    #[serde(default)]
    pub monitor_only: bool,
    #[serde(default)]
    pub rolling_restart: bool,
    #[serde(default)]
    pub label_precedence: bool,
    #[serde(default = "default_pull_failure_delay_secs")]
    pub pull_failure_delay_secs: u64,
    #[serde(default)]
    pub no_self_update: bool,
    /// Whether CPU resource limits carry over onto a recreated container.
    #[serde(default)]
    pub cpu_copy_mode: bool,
    #[serde(default = "default_pre_update_skip_exit_code")]
    pub pre_update_skip_exit_code: i64,
}

impl Default for DaemonConfiguration {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_once: false,
            update_on_start: false,
            cleanup: false,
            no_restart: false,
            no_pull: false,
            monitor_only: false,
            rolling_restart: false,
            label_precedence: false,
            pull_failure_delay_secs: default_pull_failure_delay_secs(),
            no_self_update: false,
            cpu_copy_mode: false,
            pre_update_skip_exit_code: default_pre_update_skip_exit_code(),
        }
    }
}

impl DaemonConfiguration {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_pull_failure_delay_secs() -> u64 {
    60
}

fn default_pre_update_skip_exit_code() -> i64 {
    75
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfiguration {
    /// `None` lets `BollardHostClient::connect` probe the rootless/Desktop
    /// sockets before falling back to `/var/run/docker.sock`.
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub label_filter: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Default for DockerConfiguration {
    fn default() -> Self {
        Self { socket: None, label_filter: None, scope: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfiguration {
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,
}

impl Default for LifecycleConfiguration {
    fn default() -> Self {
        Self { uid: None, gid: None, hook_timeout_secs: default_hook_timeout_secs() }
    }
}

fn default_hook_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpApiConfiguration {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub bearer_token: String,
}

impl Default for HttpApiConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_http_host(),
            port: default_http_port(),
            bearer_token: String::new(),
        }
    }
}

fn default_http_host() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    8990
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfiguration {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_notification_level")]
    pub level: String,
    #[serde(default = "default_template_name")]
    pub template: String,
    #[serde(default)]
    pub delay_secs: u64,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl Default for NotificationsConfiguration {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            level: default_notification_level(),
            template: default_template_name(),
            delay_secs: 0,
            title: default_title(),
            hostname: None,
        }
    }
}

impl NotificationsConfiguration {
    pub fn level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }

    pub fn template(&self) -> Template {
        Template::parse(&self.template).unwrap_or(Template::Default)
    }

    pub fn static_data(&self) -> StaticData {
        let host = self
            .hostname
            .clone()
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "unknown".to_string());
        StaticData { title: self.title.clone(), host }
    }
}

fn default_notification_level() -> String {
    "info".into()
}

fn default_template_name() -> String {
    "default".into()
}

fn default_title() -> String {
    "sentinel".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfiguration {
    #[serde(default)]
    pub auth: GitAuthSpec,
}

impl Default for GitConfiguration {
    fn default() -> Self {
        Self { auth: GitAuthSpec::default() }
    }
}

impl GitConfiguration {
    pub fn auth(&self) -> GitAuthConfig {
        self.auth.resolve()
    }
}

/// Serde-friendly mirror of `git::AuthConfig`; daemon-level only, never
/// per-container (see design notes).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitAuthSpec {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl GitAuthSpec {
    pub fn resolve(&self) -> GitAuthConfig {
        match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) if !token.is_empty() => GitAuthConfig::Token(token.clone()),
            (_, Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                GitAuthConfig::Basic(user.clone(), pass.clone())
            }
            _ => GitAuthConfig::None,
        }
    }
}

/// Default Git update policy when a container's label doesn't specify one.
/// Not currently surfaced as a config key; kept here as the single place
/// that would grow one.
pub fn default_git_policy() -> UpdatePolicy {
    UpdatePolicy::Major
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_defaults_are_sane() {
        let daemon = DaemonConfiguration::default();
        assert_eq!(daemon.interval_secs, 300);
        assert!(!daemon.run_once);
    }

    #[test]
    fn git_auth_spec_prefers_token_over_basic() {
        let spec = GitAuthSpec {
            token: Some("t".into()),
            username: Some("u".into()),
            password: Some("p".into()),
        };
        assert!(matches!(spec.resolve(), GitAuthConfig::Token(t) if t == "t"));
    }

    #[test]
    fn git_auth_spec_falls_back_to_none() {
        let spec = GitAuthSpec::default();
        assert!(matches!(spec.resolve(), GitAuthConfig::None));
    }

    #[test]
    fn validate_rejects_zero_interval_without_run_once() {
        let mut config = sample();
        config.daemon.interval_secs = 0;
        config.daemon.run_once = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_http_api_without_token() {
        let mut config = sample();
        config.http_api.enabled = true;
        config.http_api.bearer_token = String::new();
        assert!(config.validate().is_err());
    }

    fn sample() -> Configuration {
        Configuration {
            debug: false,
            daemon: DaemonConfiguration::default(),
            docker: DockerConfiguration::default(),
            lifecycle: LifecycleConfiguration::default(),
            http_api: HttpApiConfiguration::default(),
            notifications: NotificationsConfiguration::default(),
            git: GitConfiguration::default(),
        }
    }
}
