//! The immutable, categorized, sorted output of a finished cycle.

use std::collections::HashSet;

use super::progress::{ContainerState, ContainerStatus, Progress};

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub scanned: Vec<ContainerStatus>,
    pub updated: Vec<ContainerStatus>,
    pub restarted: Vec<ContainerStatus>,
    pub failed: Vec<ContainerStatus>,
    pub skipped: Vec<ContainerStatus>,
    pub stale: Vec<ContainerStatus>,
    pub fresh: Vec<ContainerStatus>,
}

fn sort_by_id(list: &mut [ContainerStatus]) {
    list.sort_by(|a, b| a.id.cmp(&b.id));
}

impl Report {
    /// Build a report from a finished cycle's progress map.
    ///
    /// - Skipped containers land in `skipped` only, never `scanned`.
    /// - Every other container is `scanned`.
    /// - `old_image == new_image` rewrites the state to `Fresh`.
    /// - Otherwise dispatch by state: `Updated`/`Restarted`/`Failed`/`Stale`
    ///   go to their matching list; anything else (including a `Scanned`
    ///   container that remained stale because restart was disabled)
    ///   rewrites to `Stale`.
    pub fn new(progress: Progress) -> Self {
        let mut report = Report::default();

        for mut status in progress.into_values() {
            if status.state == ContainerState::Skipped {
                report.skipped.push(status);
                continue;
            }

            report.scanned.push(status.clone());

            // The fresh-rewrite only applies to containers that were never
            // acted on: an explicit Updated/Restarted/Failed marking always
            // wins, even if the image reference happens to be unchanged
            // (a linked-to-restarting container keeps its own image).
            if status.state == ContainerState::Scanned && status.old_image == status.new_image {
                status.state = ContainerState::Fresh;
                report.fresh.push(status);
                continue;
            }

            match status.state {
                ContainerState::Updated => report.updated.push(status),
                ContainerState::Restarted => report.restarted.push(status),
                ContainerState::Failed => report.failed.push(status),
                ContainerState::Stale => report.stale.push(status),
                ContainerState::Fresh => report.fresh.push(status),
                _ => {
                    status.state = ContainerState::Stale;
                    report.stale.push(status);
                }
            }
        }

        sort_by_id(&mut report.scanned);
        sort_by_id(&mut report.updated);
        sort_by_id(&mut report.restarted);
        sort_by_id(&mut report.failed);
        sort_by_id(&mut report.skipped);
        sort_by_id(&mut report.stale);
        sort_by_id(&mut report.fresh);

        report
    }

    /// Deduplicated union, prioritized updated > restarted > failed >
    /// skipped > stale > fresh > scanned, sorted ascending by id.
    pub fn all(&self) -> Vec<ContainerStatus> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for list in [
            &self.updated,
            &self.restarted,
            &self.failed,
            &self.skipped,
            &self.stale,
            &self.fresh,
            &self.scanned,
        ] {
            for status in list {
                if seen.insert(status.id.clone()) {
                    out.push(status.clone());
                }
            }
        }

        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, ContainerPolicy};
    use bollard::container::Config as BollardConfig;
    use chrono::Utc;

    fn container(id: &str) -> Container {
        Container {
            id: id.to_string(),
            name: id.to_string(),
            image_id: "i1".to_string(),
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

    #[test]
    fn scanned_plus_skipped_equals_progress_len() {
        let mut progress = Progress::new();
        progress.add_scanned(&container("a"), "i1".to_string());
        progress.add_skipped(&container("b"), None);
        let total = progress.len();
        let report = Report::new(progress);
        assert_eq!(report.scanned.len() + report.skipped.len(), total);
        assert!(report.scanned.iter().all(|s| s.id != "b"));
    }

    #[test]
    fn fresh_container_is_never_stale_or_updated() {
        let mut progress = Progress::new();
        progress.add_scanned(&container("a"), "i1".to_string()); // old == new
        let report = Report::new(progress);
        assert_eq!(report.fresh.len(), 1);
        assert!(report.stale.is_empty());
        assert!(report.updated.is_empty());
    }

    #[test]
    fn lists_are_ascending_by_id() {
        let mut progress = Progress::new();
        progress.add_scanned(&container("b"), "i2".to_string());
        progress.add_scanned(&container("a"), "i2".to_string());
        let report = Report::new(progress);
        assert_eq!(report.stale[0].id, "a");
        assert_eq!(report.stale[1].id, "b");
    }

    #[test]
    fn all_deduplicates_and_is_sorted() {
        let mut progress = Progress::new();
        progress.add_scanned(&container("a"), "i2".to_string());
        progress.mark_for_update("a", "new-a".to_string());
        let report = Report::new(progress);
        let all = report.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[0].state, ContainerState::Updated);
    }
}
