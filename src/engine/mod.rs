//! `UpdateEngine`: orchestrates one full cycle — filter, scan, plan,
//! stop/start (or rolling-restart), cleanup — and owns the session
//! `Progress`.

pub mod progress;
pub mod report;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::container::Container;
use crate::git::{AuthConfig, GitTracker};
use crate::host::{ContainerFilter, HostClient, HostError};
use crate::lifecycle::{self, Hook};
use crate::sorter::{self, SorterError};
use crate::staleness::{self, ScanError};

use progress::Progress;
pub use report::Report;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to list containers: {0}")]
    List(#[from] HostError),
}

#[derive(Debug, Clone)]
pub struct CycleParams {
    pub filter: ContainerFilter,
    pub no_pull: bool,
    pub no_restart: bool,
    pub cleanup: bool,
    pub rolling_restart: bool,
    pub monitor_only: bool,
    pub lifecycle_uid: Option<u32>,
    pub lifecycle_gid: Option<u32>,
    pub self_update_enabled: bool,
    pub git_auth: AuthConfig,
    /// Whether the scheduler should run a cycle immediately on startup,
    /// rather than waiting for the first interval tick/trigger.
    pub update_on_start: bool,
}

impl Default for CycleParams {
    fn default() -> Self {
        Self {
            filter: ContainerFilter::default(),
            no_pull: false,
            no_restart: false,
            cleanup: false,
            rolling_restart: false,
            monitor_only: false,
            lifecycle_uid: None,
            lifecycle_gid: None,
            self_update_enabled: true,
            git_auth: AuthConfig::None,
            update_on_start: false,
        }
    }
}

pub struct UpdateEngine {
    host: Arc<dyn HostClient>,
    git: Arc<dyn GitTracker>,
}

impl UpdateEngine {
    pub fn new(host: Arc<dyn HostClient>, git: Arc<dyn GitTracker>) -> Self {
        Self { host, git }
    }

    pub async fn cycle(&self, params: &CycleParams) -> Result<Report, EngineError> {
        let mut all = self.host.list_containers(&params.filter).await?;
        sorter::by_creation(&mut all);

        let mut progress = Progress::new();
        self.scan_all(&mut all, &mut progress, params).await;

        let (mut plan_candidates, watchtower_self) = self.partition_self(all);

        self.apply_linked_closure(&mut plan_candidates, params);

        let candidates: Vec<Container> = plan_candidates
            .into_iter()
            .filter(|c| c.stale || c.linked_to_restarting)
            .filter(|c| !(params.monitor_only || c.policy.monitor_only))
            .filter(|c| !(params.no_restart || c.policy.no_restart))
            .collect();

        if candidates.is_empty() {
            if let Some(watchtower) = watchtower_self {
                self.maybe_self_update(watchtower, &mut progress, params).await;
            }
            return Ok(Report::new(progress));
        }

        let plan = match sorter::by_deps(candidates) {
            Ok(plan) => plan,
            Err(SorterError::CircularDependency(names)) => {
                error!("circular dependency among containers: {names:?}");
                if let Some(watchtower) = watchtower_self {
                    self.maybe_self_update(watchtower, &mut progress, params).await;
                }
                return Ok(Report::new(progress));
            }
        };

        if params.no_restart {
            if let Some(watchtower) = watchtower_self {
                self.maybe_self_update(watchtower, &mut progress, params).await;
            }
            return Ok(Report::new(progress));
        }

        if params.rolling_restart {
            self.run_rolling(plan, &mut progress, params).await;
        } else {
            self.run_two_pass(plan, &mut progress, params).await;
        }

        if let Some(watchtower) = watchtower_self {
            self.maybe_self_update(watchtower, &mut progress, params).await;
        }

        if params.cleanup {
            self.cleanup_old_images(&progress).await;
        }

        Ok(Report::new(progress))
    }

    async fn scan_all(&self, all: &mut [Container], progress: &mut Progress, params: &CycleParams) {
        for container in all.iter_mut() {
            match staleness::scan(container, &self.host, &self.git, &params.git_auth, params.no_pull).await {
                Ok(outcome) if outcome.skipped => {
                    progress.add_scanned(container, outcome.new_reference);
                }
                Ok(outcome) => {
                    container.stale = outcome.stale;
                    progress.add_scanned(container, outcome.new_reference);
                }
                Err(ScanError::Host(e)) => {
                    warn!("{}: scan failed: {e}", container.name);
                    progress.add_skipped(container, Some(e.to_string()));
                }
                Err(ScanError::Git(e)) => {
                    warn!("{}: git scan failed: {e}", container.name);
                    progress.add_skipped(container, Some(e.to_string()));
                }
            }
        }
    }

    /// Split off the `watchtower-self` container (at most one is expected);
    /// it never takes part in the ordinary dependency plan.
    fn partition_self(&self, all: Vec<Container>) -> (Vec<Container>, Option<Container>) {
        let mut rest = Vec::with_capacity(all.len());
        let mut watchtower_self = None;
        for c in all {
            if c.policy.watchtower_self && watchtower_self.is_none() {
                watchtower_self = Some(c);
            } else {
                rest.push(c);
            }
        }
        (rest, watchtower_self)
    }

    /// Grow the candidate set to include every container that transitively
    /// depends on an already-stale candidate, marking each addition
    /// `linked_to_restarting` (see glossary).
    fn apply_linked_closure(&self, all: &mut [Container], params: &CycleParams) {
        let mut closure: HashSet<String> = all
            .iter()
            .filter(|c| c.stale && !(params.monitor_only || c.policy.monitor_only) && !(params.no_restart || c.policy.no_restart))
            .map(|c| c.name.clone())
            .collect();

        loop {
            let mut grew = false;
            for c in all.iter() {
                if closure.contains(&c.name) {
                    continue;
                }
                if c.policy.depends_on.iter().any(|dep| closure.contains(dep)) {
                    closure.insert(c.name.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for c in all.iter_mut() {
            if closure.contains(&c.name) && !c.stale {
                c.linked_to_restarting = true;
            }
        }
    }

    async fn run_two_pass(&self, plan: Vec<Container>, progress: &mut Progress, params: &CycleParams) {
        let mut to_replace = Vec::new();

        for c in &plan {
            if let Err(e) = lifecycle::exec(&self.host, c, &c.id, Hook::PreCheck, params.lifecycle_uid, params.lifecycle_gid).await {
                warn!("{}: pre-check hook failed (continuing): {e}", c.name);
            }

            match lifecycle::exec(&self.host, c, &c.id, Hook::PreUpdate, params.lifecycle_uid, params.lifecycle_gid).await {
                Ok(outcome) if outcome.skip_update => {
                    info!("{}: pre-update hook requested skip", c.name);
                    progress.mark_skipped(&c.id);
                    continue;
                }
                Ok(_) => to_replace.push(c.clone()),
                Err(e) => {
                    warn!("{}: pre-update hook failed: {e}", c.name);
                    progress.update_failed([(c.id.clone(), e.to_string())]);
                }
            }
        }

        if to_replace.is_empty() {
            return;
        }

        for c in to_replace.iter().rev() {
            if let Err(e) = self.host.stop_container(c, c.policy.stop_timeout).await {
                warn!("{}: stop failed: {e}", c.name);
                progress.update_failed([(c.id.clone(), e.to_string())]);
            }
        }

        for c in &to_replace {
            if progress.get(&c.id).map(|s| s.error.is_some()).unwrap_or(false) {
                continue;
            }
            self.start_replacement(c, progress, params).await;
        }
    }

    async fn run_rolling(&self, plan: Vec<Container>, progress: &mut Progress, params: &CycleParams) {
        for c in &plan {
            if let Err(e) = lifecycle::exec(&self.host, c, &c.id, Hook::PreCheck, params.lifecycle_uid, params.lifecycle_gid).await {
                warn!("{}: pre-check hook failed (continuing): {e}", c.name);
            }

            match lifecycle::exec(&self.host, c, &c.id, Hook::PreUpdate, params.lifecycle_uid, params.lifecycle_gid).await {
                Ok(outcome) if outcome.skip_update => {
                    info!("{}: pre-update hook requested skip", c.name);
                    progress.mark_skipped(&c.id);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("{}: pre-update hook failed: {e}", c.name);
                    progress.update_failed([(c.id.clone(), e.to_string())]);
                    continue;
                }
            }

            if let Err(e) = self.host.stop_container(c, c.policy.stop_timeout).await {
                warn!("{}: stop failed: {e}", c.name);
                progress.update_failed([(c.id.clone(), e.to_string())]);
                continue;
            }

            self.start_replacement(c, progress, params).await;
        }
    }

    async fn start_replacement(&self, c: &Container, progress: &mut Progress, params: &CycleParams) {
        let new_name = c.name.clone();
        let new_id = match self.host.create_from(c, &new_name, &c.image_name).await {
            Ok(id) => id,
            Err(e) => {
                warn!("{}: create failed, attempting to restart original: {e}", c.name);
                if let Err(restart_err) = self.host.start_container(c).await {
                    error!("{}: restart of original also failed: {restart_err}", c.name);
                }
                progress.update_failed([(c.id.clone(), e.to_string())]);
                return;
            }
        };

        if let Err(e) = self.host.start_container(&Container { id: new_id.clone(), ..c.clone() }).await {
            warn!("{}: start of replacement failed: {e}", c.name);
            progress.update_failed([(c.id.clone(), e.to_string())]);
            return;
        }

        if let Err(e) = self.host.wait_healthy(&new_id, c.policy.stop_timeout).await {
            warn!("{}: replacement did not become healthy: {e}", c.name);
        }

        if let Err(e) = lifecycle::exec(&self.host, c, &new_id, Hook::PostUpdate, params.lifecycle_uid, params.lifecycle_gid).await {
            warn!("{}: post-update hook failed (update still recorded): {e}", c.name);
        }
        if let Err(e) = lifecycle::exec(&self.host, c, &new_id, Hook::PostCheck, params.lifecycle_uid, params.lifecycle_gid).await {
            warn!("{}: post-check hook failed (continuing): {e}", c.name);
        }

        if c.linked_to_restarting && !c.stale {
            progress.mark_restarted(&c.id, new_id);
        } else {
            progress.mark_for_update(&c.id, new_id);
        }
    }

    async fn maybe_self_update(&self, mut watchtower: Container, progress: &mut Progress, params: &CycleParams) {
        if !params.self_update_enabled {
            progress.mark_skipped(&watchtower.id);
            return;
        }

        match staleness::scan(&watchtower, &self.host, &self.git, &params.git_auth, params.no_pull).await {
            Ok(outcome) => {
                watchtower.stale = outcome.stale;
                progress.add_scanned(&watchtower, outcome.new_reference);
            }
            Err(e) => {
                progress.add_skipped(&watchtower, Some(e.to_string()));
                return;
            }
        }

        if !watchtower.stale {
            return;
        }

        let new_name = watchtower.name.clone();
        match self.host.create_from(&watchtower, &new_name, &watchtower.image_name).await {
            Ok(new_id) => {
                if let Err(e) = self.host.start_container(&Container { id: new_id.clone(), ..watchtower.clone() }).await {
                    error!("self-update: failed to start replacement: {e}");
                    progress.update_failed([(watchtower.id.clone(), e.to_string())]);
                    return;
                }
                progress.mark_for_update(&watchtower.id, new_id);
                if let Err(e) = self.host.stop_container(&watchtower, watchtower.policy.stop_timeout).await {
                    warn!("self-update: failed to stop previous instance: {e}");
                }
            }
            Err(e) => {
                progress.update_failed([(watchtower.id.clone(), e.to_string())]);
            }
        }
    }

    async fn cleanup_old_images(&self, progress: &Progress) {
        for status in progress.values() {
            if status.new_container_id.is_some() && status.old_image != status.new_image {
                if let Err(e) = self.host.remove_image(&status.old_image).await {
                    warn!("cleanup: failed to remove old image {}: {e}", status.old_image);
                }
            }
        }
    }
}
