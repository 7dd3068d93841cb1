//! Single-flight triggering of the downstream sync job.
//!
//! A trigger that finds the job busy is folded into one [`PendingTrigger`];
//! a background poller fires it once the job goes idle.

pub mod client;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::batch::{BatchSink, BatchSummary};
use crate::notifier::{Notifier, messages};

pub use client::{JobTrigger, SyncJobClient, TaoSyncClient, TriggerError};

/// Requests that arrived while the job was busy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTrigger {
    pub batch_count: u32,
    pub file_count: u64,
    pub first_queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TriggerOutcome {
    Triggered { jobs_started: usize },
    Queued { batch_count: u32, file_count: u64 },
}

/// What one poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    NothingPending,
    StillBusy,
    Triggered { batch_count: u32, file_count: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: bool,
    pub batch_count: u32,
    pub file_count: u64,
    pub last_trigger_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Option<PendingTrigger>,
    last_trigger_at: Option<DateTime<Utc>>,
}

enum Fired {
    Started(usize),
    AllRunning,
}

struct Poller {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct SyncTriggerQueue {
    client: Arc<dyn SyncJobClient>,
    notifier: Arc<dyn Notifier>,
    check_interval: Duration,
    state: Mutex<QueueState>,
    poller: Mutex<Option<Poller>>,
}

impl fmt::Debug for SyncTriggerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SyncTriggerQueue");
        debug.field("check_interval", &self.check_interval);
        match self.state.try_lock() {
            Ok(state) => debug.field("pending", &state.pending),
            Err(_) => debug.field("pending", &"<locked>"),
        };
        debug.finish_non_exhaustive()
    }
}

impl SyncTriggerQueue {
    pub fn new(
        client: Arc<dyn SyncJobClient>,
        notifier: Arc<dyn Notifier>,
        check_interval: Duration,
    ) -> Self {
        Self {
            client,
            notifier,
            check_interval,
            state: Mutex::new(QueueState::default()),
            poller: Mutex::new(None),
        }
    }

    /// Triggers the job now, or queues the request when the job is busy.
    ///
    /// `force` skips the busy pre-check. A job that still answers "running"
    /// is queued either way. Other failures go to the caller unqueued.
    pub async fn trigger_now(
        &self,
        file_count: u64,
        force: bool,
    ) -> Result<TriggerOutcome, TriggerError> {
        if !force && self.client.is_job_running().await? {
            return Ok(self.enqueue(file_count).await);
        }

        match self.fire().await? {
            Fired::Started(jobs_started) => {
                let mut state = self.state.lock().await;
                state.pending = None;
                state.last_trigger_at = Some(Utc::now());
                Ok(TriggerOutcome::Triggered { jobs_started })
            }
            Fired::AllRunning => Ok(self.enqueue(file_count).await),
        }
    }

    /// One poll cycle: fire the pending trigger if the job has gone idle.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(pending) = self.state.lock().await.pending.clone() else {
            return PollOutcome::NothingPending;
        };

        match self.client.is_job_running().await {
            Ok(true) => {
                debug!(batches = pending.batch_count, "sync job still busy");
                return PollOutcome::StillBusy;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(reason = %err, "could not query sync job status");
                return PollOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        }

        match self.fire().await {
            Ok(Fired::Started(_)) => {
                let fired = {
                    let mut state = self.state.lock().await;
                    state.last_trigger_at = Some(Utc::now());
                    state.pending.take().unwrap_or(pending)
                };
                info!(
                    batches = fired.batch_count,
                    files = fired.file_count,
                    "queued sync trigger fired"
                );
                let (title, body) = messages::queued_trigger_fired(fired.batch_count, fired.file_count);
                self.send(&title, &body).await;
                PollOutcome::Triggered {
                    batch_count: fired.batch_count,
                    file_count: fired.file_count,
                }
            }
            Ok(Fired::AllRunning) => PollOutcome::StillBusy,
            Err(err) => {
                warn!(reason = %err, "queued sync trigger failed; will retry");
                PollOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.pending.is_some(),
            batch_count: state.pending.as_ref().map_or(0, |p| p.batch_count),
            file_count: state.pending.as_ref().map_or(0, |p| p.file_count),
            last_trigger_at: state.last_trigger_at,
        }
    }

    /// Starts the background poller. Calling it twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(Arc::clone(self), stop_rx));
        *poller = Some(Poller { stop_tx, task });
    }

    /// Stops the poller and waits for an in-progress cycle to finish.
    pub async fn stop(&self) {
        let Some(poller) = self.poller.lock().await.take() else {
            return;
        };
        let _ = poller.stop_tx.send(true);
        if let Err(err) = poller.task.await {
            warn!("sync trigger poller ended abnormally: {err}");
        }
    }

    async fn enqueue(&self, file_count: u64) -> TriggerOutcome {
        let (batch_count, total_files) = {
            let mut state = self.state.lock().await;
            let pending = state.pending.get_or_insert_with(|| PendingTrigger {
                batch_count: 0,
                file_count: 0,
                first_queued_at: Utc::now(),
            });
            pending.batch_count += 1;
            pending.file_count += file_count;
            (pending.batch_count, pending.file_count)
        };
        info!(batches = batch_count, files = total_files, "sync job busy; trigger queued");
        TriggerOutcome::Queued {
            batch_count,
            file_count: total_files,
        }
    }

    async fn fire(&self) -> Result<Fired, TriggerError> {
        let job_ids = self.client.job_ids();
        if job_ids.is_empty() {
            return Err(TriggerError::NoJobs);
        }

        let mut started = 0;
        let mut running = 0;
        let mut last_err = None;
        for job_id in job_ids {
            match self.client.trigger(job_id).await {
                Ok(JobTrigger::Started) => started += 1,
                Ok(JobTrigger::Running) => running += 1,
                Err(err) => {
                    warn!(job_id, reason = %err, "sync job trigger failed");
                    last_err = Some(err);
                }
            }
        }

        if started > 0 {
            Ok(Fired::Started(started))
        } else if running > 0 {
            Ok(Fired::AllRunning)
        } else {
            Err(last_err.unwrap_or(TriggerError::NoJobs))
        }
    }

    async fn send(&self, title: &str, body: &str) {
        if let Err(err) = self.notifier.notify(title, body).await {
            warn!(reason = %err, "notification failed");
        }
    }
}

async fn poll_loop(queue: Arc<SyncTriggerQueue>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval(queue.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match queue.poll_once().await {
            PollOutcome::NothingPending | PollOutcome::StillBusy => {}
            PollOutcome::Triggered { .. } => {}
            PollOutcome::Failed { reason } => debug!(%reason, "poll cycle failed"),
        }
    }
    debug!("sync trigger poller stopped");
}

/// Batch sink that reports each batch and triggers the sync job for it.
pub struct TriggeringSink {
    queue: Option<Arc<SyncTriggerQueue>>,
    notifier: Arc<dyn Notifier>,
}

impl TriggeringSink {
    pub fn new(queue: Option<Arc<SyncTriggerQueue>>, notifier: Arc<dyn Notifier>) -> Self {
        Self { queue, notifier }
    }
}

impl fmt::Debug for TriggeringSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggeringSink")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchSink for TriggeringSink {
    async fn on_batch(&self, summary: BatchSummary) {
        let (title, body) = messages::batch_summary(&summary);
        if let Err(err) = self.notifier.notify(&title, &body).await {
            warn!(reason = %err, "batch notification failed");
        }

        let Some(queue) = &self.queue else {
            return;
        };
        let file_count = summary.file_count() as u64;
        let message = match queue.trigger_now(file_count, false).await {
            Ok(TriggerOutcome::Triggered { jobs_started }) => {
                Some(messages::triggered(file_count, jobs_started))
            }
            Ok(TriggerOutcome::Queued {
                batch_count,
                file_count,
            }) => Some(messages::trigger_queued(batch_count, file_count)),
            Err(err) => {
                error!(files = file_count, reason = %err, "sync job trigger failed");
                None
            }
        };
        if let Some((title, body)) = message
            && let Err(err) = self.notifier.notify(&title, &body).await
        {
            warn!(reason = %err, "trigger notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{LogNotifier, MockNotifier};
    use client::MockSyncJobClient;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Job that reports busy until released.
    struct FakeJob {
        busy: AtomicBool,
        triggers: AtomicUsize,
    }

    impl FakeJob {
        fn new(busy: bool) -> Arc<Self> {
            Arc::new(Self {
                busy: AtomicBool::new(busy),
                triggers: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SyncJobClient for FakeJob {
        fn job_ids(&self) -> Vec<i64> {
            vec![1]
        }

        async fn login(&self) -> Result<(), TriggerError> {
            Ok(())
        }

        async fn is_job_running(&self) -> Result<bool, TriggerError> {
            Ok(self.busy.load(Ordering::SeqCst))
        }

        async fn trigger(&self, _job_id: i64) -> Result<JobTrigger, TriggerError> {
            if self.busy.load(Ordering::SeqCst) {
                return Ok(JobTrigger::Running);
            }
            self.triggers.fetch_add(1, Ordering::SeqCst);
            Ok(JobTrigger::Started)
        }
    }

    fn queue(client: Arc<dyn SyncJobClient>) -> SyncTriggerQueue {
        SyncTriggerQueue::new(client, Arc::new(LogNotifier), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn busy_job_queues_then_poll_fires_once() {
        let job = FakeJob::new(true);
        let queue = queue(job.clone());

        let first = queue.trigger_now(3, false).await.unwrap();
        let second = queue.trigger_now(2, false).await.unwrap();
        assert_eq!(first, TriggerOutcome::Queued { batch_count: 1, file_count: 3 });
        assert_eq!(second, TriggerOutcome::Queued { batch_count: 2, file_count: 5 });
        assert_eq!(queue.poll_once().await, PollOutcome::StillBusy);

        job.busy.store(false, Ordering::SeqCst);
        assert_eq!(
            queue.poll_once().await,
            PollOutcome::Triggered { batch_count: 2, file_count: 5 }
        );
        assert_eq!(job.triggers.load(Ordering::SeqCst), 1);

        let status = queue.status().await;
        assert!(!status.pending);
        assert_eq!(status.file_count, 0);
        assert!(status.last_trigger_at.is_some());
        assert_eq!(queue.poll_once().await, PollOutcome::NothingPending);
    }

    #[tokio::test]
    async fn idle_job_triggers_immediately() {
        let job = FakeJob::new(false);
        let queue = queue(job.clone());
        assert_eq!(
            queue.trigger_now(1, false).await.unwrap(),
            TriggerOutcome::Triggered { jobs_started: 1 }
        );
        assert!(!queue.status().await.pending);
    }

    #[tokio::test]
    async fn forced_trigger_skips_busy_check() {
        let mut client = MockSyncJobClient::new();
        client.expect_is_job_running().never();
        client.expect_job_ids().return_const(vec![4_i64]);
        client
            .expect_trigger()
            .withf(|id| *id == 4)
            .times(1)
            .returning(|_| Ok(JobTrigger::Started));

        let queue = queue(Arc::new(client));
        assert_eq!(
            queue.trigger_now(9, true).await.unwrap(),
            TriggerOutcome::Triggered { jobs_started: 1 }
        );
    }

    #[tokio::test]
    async fn hard_failures_are_not_queued() {
        let mut client = MockSyncJobClient::new();
        client.expect_is_job_running().returning(|| Ok(false));
        client.expect_job_ids().return_const(vec![1_i64]);
        client
            .expect_trigger()
            .returning(|_| Err(TriggerError::LoginFailed("bad password".into())));

        let queue = queue(Arc::new(client));
        let err = queue.trigger_now(1, false).await.unwrap_err();
        assert!(matches!(err, TriggerError::LoginFailed(_)));
        assert!(!queue.status().await.pending);
    }

    #[tokio::test]
    async fn status_errors_propagate_from_trigger_now() {
        let mut client = MockSyncJobClient::new();
        client
            .expect_is_job_running()
            .returning(|| Err(TriggerError::UnexpectedResponse("down".into())));
        client.expect_trigger().never();

        let queue = queue(Arc::new(client));
        assert!(queue.trigger_now(1, false).await.is_err());
        assert!(!queue.status().await.pending);
    }

    #[tokio::test]
    async fn failed_poll_keeps_request_queued() {
        let mut client = MockSyncJobClient::new();
        let mut calls = 0;
        client.expect_is_job_running().returning(move || {
            calls += 1;
            Ok(calls == 1)
        });
        client.expect_job_ids().return_const(vec![1_i64]);
        client
            .expect_trigger()
            .times(1)
            .returning(|_| Err(TriggerError::Rejected { job_id: 1, message: "offline".into() }));

        let queue = queue(Arc::new(client));
        queue.trigger_now(4, false).await.unwrap();
        assert!(matches!(queue.poll_once().await, PollOutcome::Failed { .. }));
        assert_eq!(queue.status().await.file_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_fires_after_job_goes_idle() {
        let job = FakeJob::new(true);
        let queue = Arc::new(queue(job.clone()));
        queue.trigger_now(2, false).await.unwrap();
        queue.start().await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(queue.status().await.pending);

        job.busy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!queue.status().await.pending);
        assert_eq!(job.triggers.load(Ordering::SeqCst), 1);

        queue.stop().await;
    }

    #[tokio::test]
    async fn sink_notifies_batch_then_queue_state() {
        let job = FakeJob::new(true);
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|title, _| title.starts_with("Linked"))
            .times(1)
            .returning(|_, _| Ok(()));
        notifier
            .expect_notify()
            .withf(|title, _| title.starts_with("Sync job busy"))
            .times(1)
            .returning(|_, _| Ok(()));
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let queue = Arc::new(SyncTriggerQueue::new(
            job,
            Arc::clone(&notifier),
            Duration::from_secs(60),
        ));
        let sink = TriggeringSink::new(Some(Arc::clone(&queue)), notifier);
        let now = Utc::now();
        sink.on_batch(BatchSummary {
            started_at: now,
            last_event_at: now,
            entries: vec![],
        })
        .await;

        assert_eq!(queue.status().await.batch_count, 1);
    }
}
