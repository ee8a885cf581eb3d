use async_trait::async_trait;
use log::{debug, info, warn};
use rocket::tokio;
use rocket::tokio::sync::Notify;
use rocket::tokio::task::JoinHandle;
use rocket::tokio::time::MissedTickBehavior;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::envoy::client::{TelemetryClient, Trigger};
use crate::envoy::data_models::{EnergyMetrics, PublishedReading};
use crate::error::{EnvoyError, EnvoyResult};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Anything that can produce one metrics reading per cycle.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn compute_metrics(&self, trigger: Trigger) -> EnvoyResult<EnergyMetrics>;

    fn last_error_details(&self) -> String {
        String::new()
    }
}

#[async_trait]
impl MetricsSource for TelemetryClient {
    async fn compute_metrics(&self, trigger: Trigger) -> EnvoyResult<EnergyMetrics> {
        TelemetryClient::compute_metrics(self, trigger).await
    }

    fn last_error_details(&self) -> String {
        TelemetryClient::last_error_details(self)
    }
}

pub type Subscriber = Arc<dyn Fn(&EnergyMetrics) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stop signal owned by one run of the timer loop. A restart creates a fresh one, so a
/// tick still in flight from an older run always sees itself as stopped.
struct Run {
    stopped: AtomicBool,
    wake: Notify,
}

impl Run {
    fn new() -> Self {
        Run {
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct TimerTask {
    run: Arc<Run>,
    handle: JoinHandle<()>,
}

/// Held for the duration of a manual refresh; timer ticks that see it skip their cycle.
struct ManualGuard<'a>(&'a AtomicUsize);

impl<'a> ManualGuard<'a> {
    fn acquire(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        ManualGuard(counter)
    }
}

impl Drop for ManualGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Shared {
    source: Mutex<Option<Arc<dyn MetricsSource>>>,
    manual_in_progress: AtomicUsize,
    disposed: AtomicBool,
    last_published: Mutex<Option<PublishedReading>>,
    current: Mutex<Option<EnergyMetrics>>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl Shared {
    fn source(&self) -> Option<Arc<dyn MetricsSource>> {
        lock(&self.source).clone()
    }

    async fn run_timer(self: Arc<Self>, run: Arc<Run>, period: Duration) {
        // first tick completes immediately
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = run.wake.notified() => {}
            }
            if run.is_stopped() {
                break;
            }
            self.tick(&run).await;
        }
        debug!(target: "app", "Auto refresh loop exited");
    }

    async fn tick(&self, run: &Run) {
        if run.is_stopped() {
            return;
        }
        if self.manual_in_progress.load(Ordering::SeqCst) > 0 {
            debug!(target: "app", "Manual refresh in progress, skipping timer tick");
            return;
        }
        let Some(source) = self.source() else {
            return;
        };

        let result = source.compute_metrics(Trigger::Timer).await;

        if run.is_stopped() {
            debug!(target: "app", "Auto refresh stopped during fetch, discarding result");
            return;
        }

        let metrics = match result {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(target: "app", "Timer refresh failed: {} [{}]", e, source.last_error_details());
                return;
            }
        };

        if !self.record_if_changed(&metrics) {
            debug!(target: "app", "No significant change, update suppressed");
            return;
        }
        debug!(target: "app", "Publishing timer update P:{:.1}W C:{:.1}W", metrics.production, metrics.consumption);
        self.notify(&metrics);
    }

    fn record_if_changed(&self, metrics: &EnergyMetrics) -> bool {
        let mut last = lock(&self.last_published);
        if last.as_ref().is_some_and(|last| !metrics.differs_from(last)) {
            return false;
        }
        *last = Some(PublishedReading::from(metrics));
        *lock(&self.current) = Some(metrics.clone());
        true
    }

    fn record(&self, metrics: &EnergyMetrics) {
        *lock(&self.last_published) = Some(PublishedReading::from(metrics));
        *lock(&self.current) = Some(metrics.clone());
    }

    /// Invoke subscribers in registration order. A panicking subscriber is logged and skipped.
    fn notify(&self, metrics: &EnergyMetrics) {
        let subscribers: Vec<Subscriber> = lock(&self.subscribers)
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(metrics))).is_err() {
                warn!(target: "app", "Subscriber panicked while handling energy update");
            }
        }
    }
}

/// Polls a [`MetricsSource`] on a recurring timer and publishes readings to subscribers.
///
/// Manual refreshes always publish. Timer ticks skip their cycle while a manual refresh is
/// running and only publish significant changes. Operations on a disposed aggregator return
/// [`EnvoyError::Disposed`], except `stop_auto_refresh`, `unsubscribe` and `dispose`, which
/// are no-ops. Dropping the aggregator disposes it.
pub struct PollingAggregator {
    shared: Arc<Shared>,
    timer: Mutex<Option<TimerTask>>,
    interval: Mutex<Duration>,
}

impl PollingAggregator {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        PollingAggregator {
            shared: Arc::new(Shared {
                source: Mutex::new(Some(source)),
                manual_in_progress: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
                last_published: Mutex::new(None),
                current: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            timer: Mutex::new(None),
            interval: Mutex::new(DEFAULT_REFRESH_INTERVAL),
        }
    }

    fn ensure_live(&self) -> EnvoyResult<()> {
        if self.is_disposed() {
            Err(EnvoyError::Disposed)
        } else {
            Ok(())
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    pub async fn manual_refresh(&self) -> EnvoyResult<EnergyMetrics> {
        self.ensure_live()?;
        let source = self.shared.source().ok_or(EnvoyError::Disposed)?;

        let _guard = ManualGuard::acquire(&self.shared.manual_in_progress);
        match source.compute_metrics(Trigger::Manual).await {
            Ok(metrics) => {
                if !self.is_disposed() {
                    self.shared.record(&metrics);
                    self.shared.notify(&metrics);
                }
                Ok(metrics)
            }
            Err(e) => {
                warn!(target: "app", "Manual refresh failed: {} [{}]", e, source.last_error_details());
                Err(e)
            }
        }
    }

    pub fn start_auto_refresh(&self, interval_seconds: u64) -> EnvoyResult<()> {
        self.start_auto_refresh_every(Duration::from_secs(interval_seconds))
    }

    /// (Re)start the timer. The first tick fires immediately. Must be called from within a
    /// Tokio runtime.
    pub fn start_auto_refresh_every(&self, period: Duration) -> EnvoyResult<()> {
        self.ensure_live()?;
        if period.is_zero() {
            return Err(EnvoyError::InvalidArgument(
                "Refresh interval must be greater than zero".to_string(),
            ));
        }
        *lock(&self.interval) = period;

        let mut timer = lock(&self.timer);
        if let Some(old) = timer.take() {
            old.run.stop();
        }

        let run = Arc::new(Run::new());
        let handle = tokio::spawn(self.shared.clone().run_timer(run.clone(), period));
        *timer = Some(TimerTask { run, handle });

        info!(target: "app", "Auto refresh started every {:?}", period);
        Ok(())
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(task) = lock(&self.timer).take() {
            task.run.stop();
            info!(target: "app", "Auto refresh stopped");
        }
    }

    pub fn set_refresh_interval(&self, interval_seconds: u64) -> EnvoyResult<()> {
        self.start_auto_refresh(interval_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        *lock(&self.interval)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|task| !task.run.is_stopped() && !task.handle.is_finished())
    }

    pub fn subscribe<F>(&self, subscriber: F) -> EnvoyResult<SubscriptionId>
    where
        F: Fn(&EnergyMetrics) + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.subscribers).push((id, Arc::new(subscriber)));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.shared.subscribers).retain(|(sid, _)| *sid != id);
    }

    pub fn current_metrics(&self) -> Option<EnergyMetrics> {
        lock(&self.shared.current).clone()
    }

    pub fn last_error_details(&self) -> String {
        self.shared
            .source()
            .map(|s| s.last_error_details())
            .unwrap_or_default()
    }

    pub fn is_manual_refresh_in_progress(&self) -> bool {
        self.shared.manual_in_progress.load(Ordering::SeqCst) > 0
    }

    /// Stop the timer, drop all subscribers and release the metrics source. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_auto_refresh();
        lock(&self.shared.subscribers).clear();
        lock(&self.shared.source).take();
        debug!(target: "app", "Polling aggregator disposed");
    }
}

impl Drop for PollingAggregator {
    fn drop(&mut self) {
        self.dispose();
    }
}
