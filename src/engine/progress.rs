//! Per-session container-status map. Single-writer within one
//! `UpdateEngine::cycle`; no lock is needed (see the concurrency model).

use std::collections::BTreeMap;

use crate::container::{Container, ContainerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unknown,
    Skipped,
    Scanned,
    Updated,
    Failed,
    Fresh,
    Stale,
    /// A container that was itself fresh but recreated to bind to a
    /// dependency's new instance (see `linked_to_restarting`).
    Restarted,
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub id: ContainerId,
    pub old_image: String,
    pub new_image: String,
    pub name: String,
    pub image_name: String,
    pub error: Option<String>,
    pub state: ContainerState,
    pub monitor_only: bool,
    pub new_container_id: Option<ContainerId>,
}

impl ContainerStatus {
    pub fn scanned(container: &Container, new_image: String) -> Self {
        Self {
            id: container.id.clone(),
            old_image: container.image_id.clone(),
            new_image,
            name: container.name.clone(),
            image_name: container.image_name.clone(),
            error: None,
            state: ContainerState::Scanned,
            monitor_only: container.policy.monitor_only,
            new_container_id: None,
        }
    }
}

/// Map keyed by `ContainerId`, mutated over the course of one cycle.
#[derive(Debug, Default)]
pub struct Progress {
    entries: BTreeMap<ContainerId, ContainerStatus>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scanned(&mut self, container: &Container, new_image: String) {
        self.entries
            .insert(container.id.clone(), ContainerStatus::scanned(container, new_image));
    }

    pub fn add_skipped(&mut self, container: &Container, error: Option<String>) {
        let mut status = ContainerStatus::scanned(container, container.image_id.clone());
        status.state = ContainerState::Skipped;
        status.error = error;
        self.entries.insert(container.id.clone(), status);
    }

    pub fn add(&mut self, status: ContainerStatus) {
        self.entries.insert(status.id.clone(), status);
    }

    pub fn get(&self, id: &str) -> Option<&ContainerStatus> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ContainerStatus> {
        self.entries.get_mut(id)
    }

    pub fn mark_for_update(&mut self, id: &str, new_container_id: ContainerId) {
        if let Some(status) = self.entries.get_mut(id) {
            status.state = ContainerState::Updated;
            status.new_container_id = Some(new_container_id);
            status.error = None;
        }
    }

    pub fn mark_restarted(&mut self, id: &str, new_container_id: ContainerId) {
        if let Some(status) = self.entries.get_mut(id) {
            status.state = ContainerState::Restarted;
            status.new_container_id = Some(new_container_id);
            status.error = None;
        }
    }

    pub fn mark_skipped(&mut self, id: &str) {
        if let Some(status) = self.entries.get_mut(id) {
            status.state = ContainerState::Skipped;
        }
    }

    pub fn update_failed(&mut self, failures: impl IntoIterator<Item = (ContainerId, String)>) {
        for (id, err) in failures {
            if let Some(status) = self.entries.get_mut(&id) {
                status.state = ContainerState::Failed;
                status.error = Some(err);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_values(self) -> impl Iterator<Item = ContainerStatus> {
        self.entries.into_values()
    }

    pub fn values(&self) -> impl Iterator<Item = &ContainerStatus> {
        self.entries.values()
    }
}
