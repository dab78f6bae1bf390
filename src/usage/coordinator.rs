//! Refresh coordination: periodic timer, single-flight guard, snapshot cell

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::usage::fetcher::{FetchRequest, UsageBackend, UsageFetcher};
use crate::usage::mock::mock_snapshot;
use crate::usage::models::{platform_for_base_url, UsageSnapshot};
use crate::usage::normalize::normalize;
use crate::usage::settings::SettingsProvider;

/// Interval between scheduled refreshes
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// Presentation-side hook, notified after each refresh cycle settles
///
/// Decouples the core from any host UI: a status bar, an exporter, or a
/// test recorder all attach the same way. Consumers can also just poll
/// [`RefreshCoordinator::current`].
pub trait SnapshotConsumer: Send + Sync {
    fn on_snapshot_updated(&self, snapshot: &UsageSnapshot);
}

struct CoordinatorInner {
    settings: Arc<dyn SettingsProvider>,
    backend: Arc<dyn UsageBackend>,
    /// Last settled snapshot; single writer (the refresh cycle), many readers
    snapshot: Mutex<Option<Arc<UsageSnapshot>>>,
    /// At most one fetch-and-normalize cycle in flight
    in_flight: AtomicBool,
    consumers: Mutex<Vec<Arc<dyn SnapshotConsumer>>>,
}

/// Clears the single-flight flag when the cycle ends, however it ends
struct InFlightReset<'a>(&'a AtomicBool);

impl Drop for InFlightReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CoordinatorInner {
    /// Run one refresh cycle and publish the resulting snapshot
    ///
    /// Every outcome (success, unconfigured, fetch failure) produces a valid
    /// snapshot; nothing here can stop the periodic timer or leave the
    /// single-flight guard set.
    async fn run_cycle(self: Arc<Self>) {
        let _in_flight = InFlightReset(&self.in_flight);

        let settings = self.settings.settings();
        let platform = platform_for_base_url(&settings.api_base_url);

        let snapshot = if settings.use_mock_data {
            debug!("Mock mode enabled, synthesizing snapshot");
            mock_snapshot(platform)
        } else {
            match settings.resolve_api_key() {
                None => {
                    warn!("No API token configured");
                    UsageSnapshot::unconfigured(platform)
                }
                Some(api_key) => {
                    let request = FetchRequest {
                        base_url: settings.api_base_url.clone(),
                        api_key,
                        timeout_ms: settings.timeout_ms,
                    };
                    match self.backend.fetch(&request).await {
                        Ok(payloads) => normalize(&payloads.model, &payloads.quota, platform),
                        Err(e) => {
                            warn!("Usage fetch failed: {}", e);
                            UsageSnapshot::failed(platform, e.to_string())
                        }
                    }
                }
            }
        };

        self.store(snapshot);
    }

    fn store(&self, snapshot: UsageSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.snapshot.lock() {
            Ok(mut cell) => *cell = Some(Arc::clone(&snapshot)),
            Err(e) => warn!("Failed to acquire snapshot lock: {}", e),
        }
        self.notify(&snapshot);
    }

    /// Hand the settled snapshot to every subscribed consumer
    ///
    /// The consumer list is cloned out of the lock first, so a callback may
    /// call `subscribe` itself; a panicking consumer is contained and logged,
    /// never wedging the refresh loop or poisoning the list.
    fn notify(&self, snapshot: &UsageSnapshot) {
        let consumers: Vec<Arc<dyn SnapshotConsumer>> = match self.consumers.lock() {
            Ok(consumers) => consumers.clone(),
            Err(e) => {
                warn!("Failed to acquire consumers lock: {}", e);
                return;
            }
        };

        for consumer in consumers {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| consumer.on_snapshot_updated(snapshot)));
            if outcome.is_err() {
                warn!("Snapshot consumer panicked during notification");
            }
        }
    }
}

/// Drives periodic and on-demand refreshes and holds the latest snapshot
///
/// Cloning shares the same underlying state; all clones see the same
/// snapshot and the same single-flight guard.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RefreshCoordinator {
    /// Coordinator backed by the real HTTP fetcher
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_backend(settings, Arc::new(UsageFetcher))
    }

    /// Coordinator with a custom backend (test doubles, recording fetchers)
    pub fn with_backend(settings: Arc<dyn SettingsProvider>, backend: Arc<dyn UsageBackend>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                settings,
                backend,
                snapshot: Mutex::new(None),
                in_flight: AtomicBool::new(false),
                consumers: Mutex::new(Vec::new()),
            }),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach a consumer notified after every settled cycle
    pub fn subscribe(&self, consumer: Arc<dyn SnapshotConsumer>) {
        if let Ok(mut consumers) = self.inner.consumers.lock() {
            consumers.push(consumer);
        }
    }

    /// Perform one immediate refresh, then refresh every 60 seconds
    ///
    /// The timer runs independently of consumer activity. Each tick spawns
    /// its cycle as a separate task, so [`stop`](Self::stop) never cancels an
    /// in-flight cycle.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(REFRESH_INTERVAL_SECS));

            loop {
                // First tick fires immediately, giving the initial refresh
                ticker.tick().await;

                if inner.in_flight.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_ok() {
                    tokio::spawn(Arc::clone(&inner).run_cycle());
                } else {
                    debug!("Refresh already in flight, skipping scheduled tick");
                }
            }
        });

        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(old) = ticker.replace(handle) {
                old.abort();
            }
        }
        info!("Started usage refresh (every {}s)", REFRESH_INTERVAL_SECS);
    }

    /// Refresh now, unless a cycle is already in flight
    ///
    /// Re-entrant calls are dropped, not queued and not cancelled-and-
    /// restarted; returns whether a cycle actually ran. Forced and scheduled
    /// refreshes run identical logic; `force` exists so presentation
    /// collaborators can short-circuit the wait for the next scheduled tick.
    pub async fn refresh(&self, force: bool) -> bool {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("Refresh already in flight, dropping call (force={})", force);
            return false;
        }

        Arc::clone(&self.inner).run_cycle().await;
        true
    }

    /// Latest settled snapshot; `None` only before the first cycle completes
    pub fn current(&self) -> Option<Arc<UsageSnapshot>> {
        self.inner.snapshot.lock().ok().and_then(|cell| cell.clone())
    }

    /// Cancel the periodic timer
    ///
    /// An outstanding refresh cycle completes on its own; its result is
    /// stored and nothing further happens.
    pub fn stop(&self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(handle) = ticker.take() {
                handle.abort();
                info!("Stopped usage refresh timer");
            }
        }
    }
}
