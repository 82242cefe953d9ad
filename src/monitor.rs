//! Resumable remote sync-job monitor.
//!
//! Tracks one long-running, server-executed synchronization job from the
//! client side. Every observed snapshot is persisted so tracking survives
//! the process being killed mid-job; on startup a persisted Running
//! snapshot is resumed without restarting the job. Terminal transitions
//! stop the poll loop, clear the persisted state, and fire the completion
//! callbacks.
//!
//! Flow:
//! 1. `begin()` asks the server to start a job and spawns the poll loop
//! 2. Every snapshot is persisted and aggregated into progress
//! 3. On a terminal status the store is cleared and callbacks fire once
//! 4. A server that forgot the job (404) is treated as completion

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::job::{JobStatus, SyncJob};
use crate::progress::SyncProgress;
use crate::store::JobStore;
use crate::transport::{PollOutcome, StartOutcome, SyncTransport};

/// Lifecycle phase of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No job is being tracked.
    Idle,
    Running,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Failed)
    }
}

type ProgressFn = dyn Fn(&SyncJob, &SyncProgress) + Send + Sync;
type TerminalFn = dyn Fn(&SyncJob) + Send + Sync;

/// Cancellation handle for one live poll loop.
struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PollerHandle {
    fn stop(&self) {
        // The receiver is gone once the loop exits on its own.
        let _ = self.shutdown_tx.send(true);
    }
}

struct MonitorShared {
    phase: SyncPhase,
    /// Last observed snapshot. Present whenever the phase is Running, and
    /// for terminal phases reached through a tracked job. A failed start
    /// leaves it empty.
    job: Option<SyncJob>,
    /// Human-readable failure, set when the phase is Failed.
    error: Option<String>,
    poller: Option<PollerHandle>,
}

struct MonitorInner {
    transport: Arc<dyn SyncTransport>,
    store: Arc<dyn JobStore>,
    config: SyncConfig,
    shared: Mutex<MonitorShared>,
    /// Bumped on every begin()/cancel(). A tick whose epoch no longer
    /// matches discards its result instead of applying it.
    epoch: AtomicU64,
    progress_callbacks: Mutex<Vec<Arc<ProgressFn>>>,
    terminal_callbacks: Mutex<Vec<Arc<TerminalFn>>>,
}

/// Client-side monitor for one remote sync job.
///
/// Cheap to clone; all clones share state. Must be constructed inside a
/// Tokio runtime, since resuming a persisted job spawns the poll loop
/// immediately.
#[derive(Clone)]
pub struct SyncMonitor {
    inner: Arc<MonitorInner>,
}

impl SyncMonitor {
    /// Create a monitor, resuming any job persisted by a previous process.
    ///
    /// A persisted Running snapshot becomes the in-memory state before this
    /// returns (no flash of Idle for the caller) and the poll loop starts
    /// against the stored id without asking the server for a new job. A
    /// persisted terminal snapshot only survives a crash between the final
    /// persist and the clear; it is discarded without firing callbacks.
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        store: Arc<dyn JobStore>,
        config: SyncConfig,
    ) -> Self {
        let inner = Arc::new(MonitorInner {
            transport,
            store,
            config,
            shared: Mutex::new(MonitorShared {
                phase: SyncPhase::Idle,
                job: None,
                error: None,
                poller: None,
            }),
            epoch: AtomicU64::new(0),
            progress_callbacks: Mutex::new(Vec::new()),
            terminal_callbacks: Mutex::new(Vec::new()),
        });

        match inner.store.load() {
            Some(job) if job.status == JobStatus::Running => {
                info!(sync_id = %job.id, "Resuming persisted sync job");
                let sync_id = job.id.clone();
                {
                    let mut shared = inner.shared.lock();
                    shared.phase = SyncPhase::Running;
                    shared.job = Some(job);
                }
                MonitorInner::spawn_poller(&inner, sync_id);
            }
            Some(job) => {
                warn!(
                    sync_id = %job.id,
                    status = ?job.status,
                    "Discarding stale terminal sync state from a previous run"
                );
                inner.store.clear();
            }
            None => {}
        }

        Self { inner }
    }

    /// Start a new sync job, replacing any tracking already in flight.
    ///
    /// Transport failures never escape: they are converted into state
    /// transitions observable through [`phase`](Self::phase),
    /// [`last_error`](Self::last_error), and the terminal callbacks.
    pub async fn begin(&self) {
        let inner = &self.inner;
        let epoch = inner.begin_epoch();
        {
            let mut shared = inner.shared.lock();
            shared.phase = SyncPhase::Idle;
            shared.job = None;
            shared.error = None;
        }

        match inner.transport.start_job().await {
            Ok(StartOutcome::Started { sync_id }) => {
                if !inner.epoch_is(epoch) {
                    debug!("Discarding start result after cancel");
                    return;
                }
                let job = SyncJob::started(sync_id.clone());
                inner.store.save(&job);
                inner.enter_running(job);
                MonitorInner::spawn_poller(inner, sync_id);
            }
            Ok(StartOutcome::NotSupported) => {
                info!("Server predates job-based sync, falling back to legacy sync");
                let result = inner.transport.legacy_start().await;
                if !inner.epoch_is(epoch) {
                    debug!("Discarding legacy sync result after cancel");
                    return;
                }
                match result {
                    Ok(()) => inner.enter_terminal(SyncJob::legacy_completed(), false),
                    Err(e) => inner.enter_failed(None, e.to_string()),
                }
            }
            Err(e) => {
                if !inner.epoch_is(epoch) {
                    return;
                }
                inner.enter_failed(None, e.to_string());
            }
        }
    }

    /// Stop polling without dismissing the tracked job.
    ///
    /// The server-side job keeps running and the persisted snapshot is
    /// kept, so a later bootstrap can resume it. Any poll already in flight
    /// has its result discarded. Idempotent; a no-op on an Idle monitor.
    pub fn cancel(&self) {
        self.inner.begin_epoch();
    }

    /// Acknowledge a terminal job and return the monitor to Idle.
    pub fn dismiss(&self) {
        let cleared = {
            let mut shared = self.inner.shared.lock();
            if shared.phase.is_terminal() {
                shared.phase = SyncPhase::Idle;
                shared.job = None;
                shared.error = None;
                true
            } else {
                false
            }
        };
        if cleared {
            // Usually already cleared by the terminal transition; a Failed
            // poll leaves its snapshot behind.
            self.inner.store.clear();
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.shared.lock().phase
    }

    /// Full record of the tracked job as last observed.
    pub fn current_snapshot(&self) -> Option<SyncJob> {
        self.inner.shared.lock().job.clone()
    }

    /// Failure message, set while the phase is Failed.
    pub fn last_error(&self) -> Option<String> {
        self.inner.shared.lock().error.clone()
    }

    /// Aggregate progress of the tracked job's sub-tasks.
    pub fn progress(&self) -> SyncProgress {
        let shared = self.inner.shared.lock();
        match &shared.job {
            Some(job) => SyncProgress::from_tasks(&job.sub_tasks),
            None => SyncProgress::from_tasks(&[]),
        }
    }

    /// Register a callback fired on every Running snapshot.
    pub fn on_progress(&self, f: impl Fn(&SyncJob, &SyncProgress) + Send + Sync + 'static) {
        self.inner.progress_callbacks.lock().push(Arc::new(f));
    }

    /// Register a callback fired once when the tracked job reaches a
    /// terminal state.
    pub fn on_terminal(&self, f: impl Fn(&SyncJob) + Send + Sync + 'static) {
        self.inner.terminal_callbacks.lock().push(Arc::new(f));
    }
}

impl MonitorInner {
    /// Invalidate any live poll loop and any result still in flight,
    /// returning the epoch for the caller's own transport calls.
    fn begin_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = self.shared.lock().poller.take();
        if let Some(handle) = handle {
            handle.stop();
        }
        epoch
    }

    fn epoch_is(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn spawn_poller(inner: &Arc<MonitorInner>, sync_id: String) {
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        inner.shared.lock().poller = Some(PollerHandle { shutdown_tx });

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.poll_interval);
            // A slow poll delays the next tick instead of bursting; ticks
            // stay strictly sequential.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A tick racing a just-sent shutdown must not issue
                        // another poll.
                        if !inner.epoch_is(epoch) {
                            return;
                        }
                        let result = inner.transport.poll_job(&sync_id).await;
                        if !inner.epoch_is(epoch) {
                            debug!(sync_id = %sync_id, "Discarding poll result after cancel");
                            return;
                        }
                        if !inner.apply_poll_result(&sync_id, result) {
                            return;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!(sync_id = %sync_id, "Poll loop stopped");
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Apply one poll result to the state machine. Returns false when the
    /// loop must stop.
    fn apply_poll_result(
        &self,
        sync_id: &str,
        result: Result<PollOutcome, TransportError>,
    ) -> bool {
        match result {
            Ok(PollOutcome::Snapshot(job)) if job.status == JobStatus::Running => {
                self.store.save(&job);
                self.enter_running(job);
                true
            }
            Ok(PollOutcome::Snapshot(job)) => {
                self.enter_terminal(job, true);
                false
            }
            Ok(PollOutcome::NotFound) => {
                // A job the server no longer recognizes is indistinguishable
                // from one that finished and was garbage-collected. Treating
                // disappearance as fatal would strand the user, so assume
                // completion and trigger the same refresh.
                info!(sync_id = %sync_id, "Server no longer knows the job, assuming completion");
                let mut job = self
                    .shared
                    .lock()
                    .job
                    .clone()
                    .unwrap_or_else(|| SyncJob::started(sync_id));
                job.status = JobStatus::Completed;
                job.finished_at = Some(Utc::now());
                job.sub_tasks.clear();
                self.enter_terminal(job, false);
                false
            }
            Err(e) => {
                let job = self.shared.lock().job.clone();
                self.enter_failed(job, e.to_string());
                false
            }
        }
    }

    fn enter_running(&self, job: SyncJob) {
        let progress = SyncProgress::from_tasks(&job.sub_tasks);
        {
            let mut shared = self.shared.lock();
            shared.phase = SyncPhase::Running;
            shared.job = Some(job.clone());
            shared.error = None;
        }
        self.fire_progress(&job, &progress);
    }

    /// Apply a terminal snapshot: the server-reported ones (persisted, then
    /// the slot is cleared) and the synthesized legacy/assumed-completed
    /// records (never persisted, the slot is just cleared).
    fn enter_terminal(&self, job: SyncJob, persist_first: bool) {
        if persist_first {
            self.store.save(&job);
        }
        self.store.clear();

        let phase = match job.status {
            JobStatus::Failed => SyncPhase::Failed,
            _ => SyncPhase::Completed,
        };
        {
            let mut shared = self.shared.lock();
            shared.phase = phase;
            shared.error = job.error.clone();
            shared.job = Some(job.clone());
            if let Some(handle) = shared.poller.take() {
                handle.stop();
            }
        }
        info!(sync_id = %job.id, status = ?job.status, "Sync job finished");
        self.fire_terminal(&job);
    }

    /// Transport failure: record the error and stop. The failed snapshot
    /// stays persisted; the next bootstrap discards it as stale without
    /// firing callbacks.
    fn enter_failed(&self, job: Option<SyncJob>, message: String) {
        let failed_job = job.map(|mut job| {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            job.error = Some(message.clone());
            job
        });
        if let Some(job) = &failed_job {
            self.store.save(job);
        }
        {
            let mut shared = self.shared.lock();
            shared.phase = SyncPhase::Failed;
            shared.error = Some(message.clone());
            shared.job = failed_job.clone();
            if let Some(handle) = shared.poller.take() {
                handle.stop();
            }
        }
        warn!("Sync failed: {}", message);
        if let Some(job) = &failed_job {
            self.fire_terminal(job);
        }
    }

    fn fire_progress(&self, job: &SyncJob, progress: &SyncProgress) {
        let callbacks: Vec<_> = self.progress_callbacks.lock().clone();
        for callback in callbacks {
            callback(job, progress);
        }
    }

    fn fire_terminal(&self, job: &SyncJob) {
        let callbacks: Vec<_> = self.terminal_callbacks.lock().clone();
        for callback in callbacks {
            callback(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AccountSyncTask, TaskStatus};
    use crate::store::MemoryJobStore;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedTransport {
        start_results: Mutex<VecDeque<Result<StartOutcome, TransportError>>>,
        poll_results: Mutex<VecDeque<Result<PollOutcome, TransportError>>>,
        legacy_results: Mutex<VecDeque<Result<(), TransportError>>>,
        poll_calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn push_start(&self, result: Result<StartOutcome, TransportError>) {
            self.start_results.lock().push_back(result);
        }

        fn push_poll(&self, result: Result<PollOutcome, TransportError>) {
            self.poll_results.lock().push_back(result);
        }

        fn push_legacy(&self, result: Result<(), TransportError>) {
            self.legacy_results.lock().push_back(result);
        }

        fn poll_count(&self) -> usize {
            self.poll_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SyncTransport for ScriptedTransport {
        async fn start_job(&self) -> Result<StartOutcome, TransportError> {
            self.start_results
                .lock()
                .pop_front()
                .expect("unexpected start_job call")
        }

        async fn poll_job(&self, _sync_id: &str) -> Result<PollOutcome, TransportError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.poll_results.lock().pop_front();
            match next {
                Some(result) => result,
                // Script exhausted: park until the loop is cancelled.
                None => std::future::pending().await,
            }
        }

        async fn legacy_start(&self) -> Result<(), TransportError> {
            self.legacy_results
                .lock()
                .pop_front()
                .expect("unexpected legacy_start call")
        }
    }

    fn running_snapshot(id: &str, tasks: Vec<AccountSyncTask>) -> SyncJob {
        let mut job = SyncJob::started(id);
        job.sub_tasks = tasks;
        job
    }

    fn completed_snapshot(id: &str) -> SyncJob {
        let mut job = SyncJob::started(id);
        job.status = JobStatus::Completed;
        job.finished_at = Some(Utc::now());
        job
    }

    fn task(id: &str, status: TaskStatus) -> AccountSyncTask {
        AccountSyncTask {
            resource_id: id.to_string(),
            platform_tag: "mailchimp".to_string(),
            status,
            current_step: None,
        }
    }

    fn test_monitor(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryJobStore>,
    ) -> SyncMonitor {
        let config = SyncConfig {
            poll_interval: Duration::from_millis(100),
            ..SyncConfig::default()
        };
        SyncMonitor::new(transport, store, config)
    }

    async fn wait_for_phase(monitor: &SyncMonitor, phase: SyncPhase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.phase() != phase {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for {:?}, currently {:?}",
                phase,
                monitor.phase()
            )
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_polls_to_completion() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        transport.push_poll(Ok(PollOutcome::Snapshot(running_snapshot(
            "j1",
            vec![task("acct-1", TaskStatus::Running)],
        ))));
        transport.push_poll(Ok(PollOutcome::Snapshot(completed_snapshot("j1"))));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        let terminal_count = Arc::new(AtomicUsize::new(0));
        let progress_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |job| {
                assert_eq!(job.status, JobStatus::Completed);
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
            let progress_count = progress_count.clone();
            monitor.on_progress(move |_, _| {
                progress_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;
        wait_for_phase(&monitor, SyncPhase::Completed).await;

        assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
        assert!(progress_count.load(Ordering::SeqCst) >= 1);
        assert!(store.load().is_none(), "terminal transition must clear the store");
        assert_eq!(monitor.current_snapshot().unwrap().status, JobStatus::Completed);
        assert_eq!(transport.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_fallback_completes_without_polling() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::NotSupported));
        transport.push_legacy(Ok(()));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        let terminal_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |_| {
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;

        assert_eq!(monitor.phase(), SyncPhase::Completed);
        assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
        assert!(store.load().is_none(), "legacy path must never populate the store");
        assert_eq!(transport.poll_count(), 0);
        let job = monitor.current_snapshot().unwrap();
        assert!(job.sub_tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_failure_marks_failed() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::NotSupported));
        transport.push_legacy(Err(TransportError::Network("no route".to_string())));

        let monitor = test_monitor(transport, Arc::new(MemoryJobStore::new()));
        monitor.begin().await;

        assert_eq!(monitor.phase(), SyncPhase::Failed);
        assert!(monitor.last_error().unwrap().contains("no route"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_assumed_completed() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        transport.push_poll(Ok(PollOutcome::NotFound));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        let terminal_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |job| {
                assert_eq!(job.status, JobStatus::Completed);
                assert!(job.sub_tasks.is_empty());
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;
        wait_for_phase(&monitor, SyncPhase::Completed).await;

        assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
        assert!(store.load().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_error_fails_fast_with_no_retry() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        transport.push_poll(Err(TransportError::Network(
            "connection reset".to_string(),
        )));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        monitor.begin().await;
        wait_for_phase(&monitor, SyncPhase::Failed).await;

        assert!(monitor.last_error().unwrap().contains("connection reset"));
        // The failed snapshot stays persisted; the next bootstrap discards
        // it as stale.
        assert_eq!(store.load().unwrap().status, JobStatus::Failed);

        // No retry loop: several poll periods later, still exactly one call.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_sets_failed_without_job() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Err(TransportError::Network("offline".to_string())));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport, store.clone());

        let terminal_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |_| {
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;

        assert_eq!(monitor.phase(), SyncPhase::Failed);
        assert!(monitor.last_error().unwrap().contains("offline"));
        assert!(monitor.current_snapshot().is_none());
        assert_eq!(terminal_count.load(Ordering::SeqCst), 0);
        assert!(store.load().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failed_snapshot_clears_store() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        let mut failed = SyncJob::started("j1");
        failed.status = JobStatus::Failed;
        failed.error = Some("source account revoked access".to_string());
        transport.push_poll(Ok(PollOutcome::Snapshot(failed)));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport, store.clone());

        let terminal_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |job| {
                assert_eq!(job.status, JobStatus::Failed);
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;
        wait_for_phase(&monitor, SyncPhase::Failed).await;

        assert_eq!(terminal_count.load(Ordering::SeqCst), 1);
        assert!(store.load().is_none(), "server-reported terminal clears the slot");
        assert!(monitor
            .last_error()
            .unwrap()
            .contains("source account revoked access"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_from_persisted_running_snapshot() {
        let store = Arc::new(MemoryJobStore::new());
        store.save(&running_snapshot(
            "j1",
            vec![
                task("acct-a", TaskStatus::Completed),
                task("acct-b", TaskStatus::Running),
            ],
        ));

        let transport = Arc::new(ScriptedTransport::default());
        let monitor = test_monitor(transport.clone(), store);

        // State is visible synchronously, before the poll loop has run.
        assert_eq!(monitor.phase(), SyncPhase::Running);
        assert_eq!(transport.poll_count(), 0);
        let progress = monitor.progress();
        assert_eq!(progress.percent, 50);
        assert_eq!(progress.active_task.unwrap().resource_id, "acct-b");

        // Exactly one immediate poll; the exhausted script then parks the
        // loop, so the count must not grow.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.poll_count(), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_terminal_blob_cleared_silently() {
        let store = Arc::new(MemoryJobStore::new());
        store.save(&completed_snapshot("j1"));

        let transport = Arc::new(ScriptedTransport::default());
        let monitor = test_monitor(transport.clone(), store.clone());

        assert_eq!(monitor.phase(), SyncPhase::Idle);
        assert!(monitor.current_snapshot().is_none());
        assert!(store.load().is_none());
        assert_eq!(transport.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_noop_on_idle() {
        let transport = Arc::new(ScriptedTransport::default());
        let monitor = test_monitor(transport, Arc::new(MemoryJobStore::new()));

        monitor.cancel();
        monitor.cancel();
        assert_eq!(monitor.phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_snapshot_and_store() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        transport.push_poll(Ok(PollOutcome::Snapshot(running_snapshot(
            "j1",
            vec![task("acct-1", TaskStatus::Running)],
        ))));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        monitor.begin().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.poll_count(), 1);

        monitor.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Tracking is frozen, not dismissed: snapshot and blob survive so a
        // later bootstrap can resume.
        assert_eq!(monitor.phase(), SyncPhase::Running);
        assert_eq!(monitor.current_snapshot().unwrap().id, "j1");
        assert_eq!(store.load().unwrap().id, "j1");
        assert_eq!(transport.poll_count(), 1);
    }

    struct GatedTransport {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl SyncTransport for GatedTransport {
        async fn start_job(&self) -> Result<StartOutcome, TransportError> {
            Ok(StartOutcome::Started {
                sync_id: "j1".to_string(),
            })
        }

        async fn poll_job(&self, sync_id: &str) -> Result<PollOutcome, TransportError> {
            self.entered.notify_one();
            self.release.notified().await;
            let mut job = SyncJob::started(sync_id);
            job.status = JobStatus::Completed;
            Ok(PollOutcome::Snapshot(job))
        }

        async fn legacy_start(&self) -> Result<(), TransportError> {
            unreachable!("legacy_start not scripted")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_inflight_poll_discards_result() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let transport = Arc::new(GatedTransport {
            entered: entered.clone(),
            release: release.clone(),
        });

        let store = Arc::new(MemoryJobStore::new());
        let config = SyncConfig {
            poll_interval: Duration::from_millis(100),
            ..SyncConfig::default()
        };
        let monitor = SyncMonitor::new(transport, store.clone(), config);

        let terminal_count = Arc::new(AtomicUsize::new(0));
        {
            let terminal_count = terminal_count.clone();
            monitor.on_terminal(move |_| {
                terminal_count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.begin().await;
        entered.notified().await;

        let before = monitor.current_snapshot();
        monitor.cancel();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The completed snapshot resolved after cancel and must not apply.
        assert_eq!(monitor.current_snapshot(), before);
        assert_eq!(monitor.phase(), SyncPhase::Running);
        assert_eq!(terminal_count.load(Ordering::SeqCst), 0);
        assert_eq!(store.load().unwrap().status, JobStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_replaces_prior_loop() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j1".to_string(),
        }));
        transport.push_start(Ok(StartOutcome::Started {
            sync_id: "j2".to_string(),
        }));
        transport.push_poll(Ok(PollOutcome::Snapshot(running_snapshot("j1", vec![]))));
        transport.push_poll(Ok(PollOutcome::Snapshot(running_snapshot("j2", vec![]))));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport.clone(), store.clone());

        monitor.begin().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.current_snapshot().unwrap().id, "j1");

        monitor.begin().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.current_snapshot().unwrap().id, "j2");
        assert_eq!(store.load().unwrap().id, "j2");
        assert_eq!(monitor.phase(), SyncPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_returns_terminal_monitor_to_idle() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_start(Ok(StartOutcome::NotSupported));
        transport.push_legacy(Ok(()));

        let store = Arc::new(MemoryJobStore::new());
        let monitor = test_monitor(transport, store.clone());

        monitor.begin().await;
        assert_eq!(monitor.phase(), SyncPhase::Completed);

        monitor.dismiss();
        assert_eq!(monitor.phase(), SyncPhase::Idle);
        assert!(monitor.current_snapshot().is_none());
        assert!(store.load().is_none());

        // Dismiss on an Idle monitor stays a no-op.
        monitor.dismiss();
        assert_eq!(monitor.phase(), SyncPhase::Idle);
    }
}
