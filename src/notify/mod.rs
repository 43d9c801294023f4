//! `NotificationCore`: batches log entries over a cycle, renders a
//! template, and fans the result out to configured service URLs with a
//! post-cycle delay.

pub mod classify;
pub mod template;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{info, warn};
use tracing_subscriber::layer::Context;
use tracing_subscriber::{reload, Layer, Registry};

use crate::engine::Report;
use template::{Data, LogEntry, StaticData, Template};
use transport::Router;

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub urls: Vec<String>,
    pub min_level: tracing::Level,
    pub template: Template,
    pub static_data: StaticData,
    pub delay: Duration,
}

/// Accepts log entries during a cycle and fans out a rendered summary
/// once the cycle ends. One sender task runs for the notifier's lifetime,
/// fed by a capacity-1 channel so a slow send never blocks the cycle.
pub struct NotificationCore {
    config: NotifierConfig,
    router: Arc<Router>,
    entries: RwLock<Vec<LogEntry>>,
    batching: AtomicBool,
    closed: AtomicBool,
    receiving: AtomicBool,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
    sender_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationCore {
    pub fn new(config: NotifierConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(1);
        let router = Arc::new(Router::new(Client::new()));
        let core = Arc::new(Self {
            config,
            router,
            entries: RwLock::new(Vec::new()),
            batching: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
            tx,
            shutdown: CancellationToken::new(),
            sender_task: Mutex::new(None),
        });

        if core.receiving.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            let handle = core.clone().spawn_sender(rx);
            *core.sender_task.lock() = Some(handle);
        }

        core
    }

    fn spawn_sender(self: Arc<Self>, mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
        let delay = self.config.delay;
        let urls = self.config.urls.clone();
        let router = self.router.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(message) => message,
                        None => break,
                    },
                };

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let failures = router.send(&message, &urls).await;
                for failure in &failures {
                    warn!(
                        scheme = %failure.scheme,
                        url = %failure.sanitized_url,
                        kind = failure.kind.as_str(),
                        "notification delivery failed: {}",
                        failure.reason
                    );
                }
            }
        })
    }

    /// Record a log entry; dropped if below the configured level, tagged
    /// `notify=no`, or arriving after `close()`. Outside a batch, each
    /// entry is sent immediately as its own message.
    pub fn fire(&self, level: tracing::Level, message: &str, notify: bool) {
        if self.closed.load(Ordering::SeqCst) || !notify || level > self.config.min_level {
            return;
        }

        let entry = LogEntry { level: level.to_string(), message: message.to_string() };

        if self.batching.load(Ordering::SeqCst) {
            self.entries.write().push(entry);
        } else {
            let rendered = self.render(&[entry], &Report::default());
            self.enqueue(rendered);
        }
    }

    /// Open a batch: allocate a fresh entries buffer.
    pub fn start_notification(&self) {
        self.entries.write().clear();
        self.batching.store(true, Ordering::SeqCst);
    }

    /// Close the batch, render the full template against the finished
    /// report, and enqueue the rendered message.
    pub fn send_notification(&self, report: &Report) {
        self.batching.store(false, Ordering::SeqCst);
        let entries = std::mem::take(&mut *self.entries.write());
        let rendered = self.render(&entries, report);
        self.enqueue(rendered);
    }

    fn render(&self, entries: &[LogEntry], report: &Report) -> String {
        let data = Data { static_data: &self.config.static_data, entries, report };
        self.config.template.render(&data)
    }

    fn enqueue(&self, message: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // Bounded to 1: a producer that can't enqueue immediately drops
        // the message rather than block the cycle.
        let _ = self.tx.try_send(message);
    }

    /// Idempotent: subsequent calls are no-ops. Signals the sender task to
    /// stop and waits for it to drain/exit before returning.
    pub async fn close(&self) {
        if self.closed.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            self.shutdown.cancel();
            let handle = self.sender_task.lock().take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
            info!("notifier closed");
        }
    }
}

struct FireVisitor {
    message: String,
    notify: bool,
}

impl Visit for FireVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "notify" {
            self.notify = value;
        }
    }
}

/// Taps the `tracing` event stream directly: any in-cycle `info!`/`warn!`
/// carrying a `notify = false` field is excluded, everything else at or
/// above the configured level is fed into `fire`. Implemented on `Arc<Self>`
/// since the layer is installed while cloned handles are held elsewhere
/// (the engine/scheduler side) and `NotificationCore` itself holds no
/// `Clone` data to hand the subscriber a fresh owned copy.
impl<S> Layer<S> for Arc<NotificationCore>
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FireVisitor { message: String::new(), notify: true };
        event.record(&mut visitor);
        self.fire(*event.metadata().level(), &visitor.message, visitor.notify);
    }
}

/// Boxed layer slot the notifier is hot-swapped into once the real config
/// is loaded. `main` installs a no-op placeholder at startup since the
/// global subscriber can only be set once, before `Configuration::load`
/// has had a chance to run.
pub type NotifyLayer = Box<dyn Layer<Registry> + Send + Sync>;
pub type NotifyHandle = reload::Handle<NotifyLayer, Registry>;

pub fn noop_layer() -> NotifyLayer {
    Box::new(tracing_subscriber::layer::Identity::new())
}

/// Swap the placeholder layer installed at startup for the real notifier,
/// once it has been constructed from the loaded configuration.
pub fn install(handle: &NotifyHandle, core: Arc<NotificationCore>) -> Result<(), reload::Error> {
    handle.reload(Box::new(core) as NotifyLayer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::Progress;

    fn config() -> NotifierConfig {
        NotifierConfig {
            urls: vec![],
            min_level: tracing::Level::INFO,
            template: Template::Default,
            static_data: StaticData { title: "sentinel".into(), host: "h".into() },
            delay: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let core = NotificationCore::new(config());
        core.close().await;
        core.close().await;
        core.close().await;
        assert!(core.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn batching_buffers_entries_until_send() {
        let core = NotificationCore::new(config());
        core.start_notification();
        core.fire(tracing::Level::INFO, "scanning", true);
        core.fire(tracing::Level::WARN, "stale found", true);
        assert_eq!(core.entries.read().len(), 2);
        core.send_notification(&Report::new(Progress::new()));
        assert_eq!(core.entries.read().len(), 0);
    }

    #[tokio::test]
    async fn notify_no_entries_are_dropped() {
        let core = NotificationCore::new(config());
        core.start_notification();
        core.fire(tracing::Level::INFO, "hidden", false);
        assert!(core.entries.read().is_empty());
    }

    #[tokio::test]
    async fn entries_after_close_are_dropped() {
        let core = NotificationCore::new(config());
        core.close().await;
        core.start_notification();
        core.fire(tracing::Level::INFO, "too late", true);
        // fire() still buffers into entries (closed only blocks enqueue),
        // but send_notification must not deliver after close.
        core.send_notification(&Report::new(Progress::new()));
    }
}
