//! Drives `UpdateEngine::cycle` at a fixed interval, on an external
//! trigger, or exactly once. At most one cycle runs at a time; triggers
//! arriving mid-cycle coalesce into a single pending flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{CycleParams, Report, UpdateEngine};
use crate::notify::NotificationCore;

#[derive(Debug, Clone)]
pub enum DriveMode {
    Interval(Duration),
    Triggered,
    Once,
}

pub struct Scheduler {
    engine: Arc<UpdateEngine>,
    notifier: Option<Arc<NotificationCore>>,
    params: CycleParams,
    pending: Arc<AtomicBool>,
    trigger_notify: Arc<tokio::sync::Notify>,
    cancel: CancellationToken,
    last_report: Arc<parking_lot::RwLock<Report>>,
}

impl Scheduler {
    pub fn new(engine: Arc<UpdateEngine>, notifier: Option<Arc<NotificationCore>>, params: CycleParams) -> Self {
        Self {
            engine,
            notifier,
            params,
            pending: Arc::new(AtomicBool::new(false)),
            trigger_notify: Arc::new(tokio::sync::Notify::new()),
            cancel: CancellationToken::new(),
            last_report: Arc::new(parking_lot::RwLock::new(Report::default())),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the most recently completed cycle's report, for the HTTP
    /// metrics surface. Empty (default) before the first cycle runs.
    pub fn last_report(&self) -> Report {
        self.last_report.read().clone()
    }

    /// Coalesced external trigger (HTTP `/v1/update`, or a future cycle
    /// arriving while one is already in flight).
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.trigger_notify.notify_one();
    }

    pub async fn run(&self, mode: DriveMode) {
        match mode {
            DriveMode::Once => {
                self.run_cycle().await;
            }
            DriveMode::Interval(interval) => self.run_interval(interval).await,
            DriveMode::Triggered => self.run_triggered().await,
        }
    }

    async fn run_interval(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; consume it regardless

        if self.params.update_on_start {
            self.run_cycle().await;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("scheduler cancelled, exiting after safe point");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.run_cycle().await;
        }
    }

    async fn run_triggered(&self) {
        if self.params.update_on_start {
            self.run_cycle().await;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("scheduler cancelled, exiting after safe point");
                    return;
                }
                _ = self.trigger_notify.notified() => {}
            }

            // Drain any coalesced triggers that arrived during the cycle.
            while self.pending.swap(false, Ordering::SeqCst) {
                self.run_cycle().await;
                if self.cancel.is_cancelled() {
                    return;
                }
            }
        }
    }

    async fn run_cycle(&self) -> Report {
        debug!("starting cycle");

        if let Some(notifier) = &self.notifier {
            notifier.start_notification();
        }

        let report = match self.engine.cycle(&self.params).await {
            Ok(report) => report,
            Err(e) => {
                warn!("cycle failed: {e}");
                Report::default()
            }
        };

        info!(
            scanned = report.scanned.len(),
            updated = report.updated.len(),
            failed = report.failed.len(),
            "cycle complete"
        );

        if let Some(notifier) = &self.notifier {
            notifier.send_notification(&report);
        }

        *self.last_report.write() = report.clone();

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::git::{AuthConfig, GitError, GitTracker};
    use crate::host::{ContainerFilter, DiskUsage, ExecOutcome, HostClient, HostError, HostInfo, VersionInfo};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct EmptyHost(Arc<AtomicUsize>);

    #[async_trait]
    impl HostClient for EmptyHost {
        async fn list_containers(&self, _: &ContainerFilter) -> Result<Vec<Container>, HostError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
        async fn get_container(&self, _: &str) -> Result<Container, HostError> {
            unimplemented!()
        }
        async fn pull_image(&self, _: &str) -> Result<(), HostError> {
            Ok(())
        }
        async fn local_image_id(&self, _: &str) -> Result<String, HostError> {
            Ok(String::new())
        }
        async fn stop_container(&self, _: &Container, _: StdDuration) -> Result<(), HostError> {
            Ok(())
        }
        async fn start_container(&self, c: &Container) -> Result<String, HostError> {
            Ok(c.id.clone())
        }
        async fn rename_container(&self, _: &str, _: &str) -> Result<(), HostError> {
            Ok(())
        }
        async fn remove_container(&self, _: &str, _: bool) -> Result<(), HostError> {
            Ok(())
        }
        async fn remove_image(&self, _: &str) -> Result<(), HostError> {
            Ok(())
        }
        async fn create_from(&self, c: &Container, _: &str, _: &str) -> Result<String, HostError> {
            Ok(c.id.clone())
        }
        async fn exec(&self, _: &str, _: &str, _: StdDuration, _: Option<u32>, _: Option<u32>) -> Result<ExecOutcome, HostError> {
            Ok(ExecOutcome { exit_code: 0, timed_out: false })
        }
        async fn wait_healthy(&self, _: &str, _: StdDuration) -> Result<(), HostError> {
            Ok(())
        }
        async fn has_healthcheck(&self, _: &str) -> Result<bool, HostError> {
            Ok(false)
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

    struct FakeGit;
    #[async_trait]
    impl GitTracker for FakeGit {
        async fn get_latest_commit(&self, _: &str, _: &str, _: &AuthConfig) -> Result<String, GitError> {
            Err(GitError::RefNotFound("unused".into()))
        }
    }

    #[tokio::test]
    async fn once_mode_runs_exactly_one_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(EmptyHost(calls.clone()));
        let engine = Arc::new(UpdateEngine::new(host, Arc::new(FakeGit)));
        let scheduler = Scheduler::new(engine, None, CycleParams::default());

        scheduler.run(DriveMode::Once).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn triggered_mode_runs_once_per_coalesced_trigger() {
        let calls = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(EmptyHost(calls.clone()));
        let engine = Arc::new(UpdateEngine::new(host, Arc::new(FakeGit)));
        let scheduler = Arc::new(Scheduler::new(engine, None, CycleParams::default()));

        let cancel = scheduler.cancellation_token();
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(DriveMode::Triggered).await })
        };

        scheduler.trigger();
        scheduler.trigger(); // coalesced with the first, arriving before drain
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        cancel.cancel();
        let _ = handle.await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
