//! Main daemon command - loads configuration, wires the engine/scheduler/
//! notifier, and (optionally) serves the HTTP metrics/trigger surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use sentinel_daemon::config::Configuration;
use sentinel_daemon::engine::{CycleParams, UpdateEngine};
use sentinel_daemon::git::GitTrackerImpl;
use sentinel_daemon::host::bollard_client::BollardHostClient;
use sentinel_daemon::host::{ContainerFilter, HostClient};
use sentinel_daemon::notify::{self, NotificationCore, NotifierConfig, NotifyHandle};
use sentinel_daemon::router::{self, AppState};
use sentinel_daemon::scheduler::{DriveMode, Scheduler};

/// Run the daemon. `run_once` forces a single cycle regardless of
/// `config.daemon.run_once` (used by the `run-once` subcommand). `notify_handle`
/// is the reload handle for the placeholder logging layer installed in
/// `main`; it is swapped for the real notifier once one is constructed.
pub async fn run(config_path: &str, run_once: bool, notify_handle: NotifyHandle) -> Result<()> {
    info!("loading configuration from: {config_path}");
    let config = Configuration::load(config_path)?;

    let host: Arc<dyn HostClient> =
        Arc::new(BollardHostClient::connect(config.docker.socket.as_deref(), config.daemon.cpu_copy_mode)?);
    let git = Arc::new(GitTrackerImpl::new());

    let engine = Arc::new(UpdateEngine::new(host.clone(), git));

    let notifier = if config.notifications.urls.is_empty() {
        None
    } else {
        let core = NotificationCore::new(NotifierConfig {
            urls: config.notifications.urls.clone(),
            min_level: config.notifications.level(),
            template: config.notifications.template(),
            static_data: config.notifications.static_data(),
            delay: Duration::from_secs(config.notifications.delay_secs),
        });
        notify::install(&notify_handle, core.clone())?;
        Some(core)
    };

    let params = CycleParams {
        filter: ContainerFilter { label: config.docker.label_filter.clone(), name_prefix: None },
        no_pull: config.daemon.no_pull,
        no_restart: config.daemon.no_restart,
        cleanup: config.daemon.cleanup,
        rolling_restart: config.daemon.rolling_restart,
        monitor_only: config.daemon.monitor_only,
        lifecycle_uid: config.lifecycle.uid,
        lifecycle_gid: config.lifecycle.gid,
        self_update_enabled: !config.daemon.no_self_update,
        update_on_start: config.daemon.update_on_start,
        git_auth: config.git.auth(),
    };

    let scheduler = Arc::new(Scheduler::new(engine.clone(), notifier.clone(), params));

    if run_once || config.daemon.run_once {
        scheduler.run(DriveMode::Once).await;
        if let Some(notifier) = &notifier {
            notifier.close().await;
        }
        return Ok(());
    }

    let cancel = scheduler.cancellation_token();

    let mut http_handle = None;
    if config.http_api.enabled {
        let state = AppState {
            scheduler: scheduler.clone(),
            host,
            bearer_token: config.http_api.bearer_token.clone(),
        };
        let app = router::build_router(state);
        let bind_addr: SocketAddr = format!("{}:{}", config.http_api.host, config.http_api.port).parse()?;
        info!("starting HTTP metrics/trigger surface on {bind_addr}");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        let http_cancel = cancel.clone();
        tokio::spawn(async move {
            http_cancel.cancelled().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        http_handle = Some(tokio::spawn(async move {
            if let Err(e) = axum_server::bind(bind_addr).handle(handle).serve(app.into_make_service()).await {
                warn!("HTTP surface stopped: {e}");
            }
        }));
    }

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let mode = if config.http_api.enabled {
            DriveMode::Triggered
        } else {
            DriveMode::Interval(config.daemon.interval())
        };
        tokio::spawn(async move { scheduler.run(mode).await })
    };

    tokio::spawn({
        let scheduler = scheduler.clone();
        let interval = config.daemon.interval();
        let cancel = cancel.clone();
        let http_enabled = config.http_api.enabled;
        async move {
            if !http_enabled {
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => scheduler.trigger(),
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("received shutdown signal, stopping scheduler...");
    cancel.cancel();

    let _ = scheduler_task.await;
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    if let Some(notifier) = &notifier {
        notifier.close().await;
    }

    info!("daemon stopped");
    Ok(())
}
