//! Collapses bursts of successful materialisations into one summary.
//!
//! The aggregator is either idle or accumulating a [`BatchWindow`]. Every new
//! entry restarts the quiet timer; the window is emitted once the timer
//! elapses with no intervening entry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BatchSettings;

const BATCH_CHANNEL_CAPACITY: usize = 1024;

/// One successfully materialised file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub file_name: String,
    pub target_labels: Vec<String>,
}

/// A flushed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }
}

/// Receives each flushed batch.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn on_batch(&self, summary: BatchSummary);
}

#[derive(Debug)]
struct BatchWindow {
    started_at: DateTime<Utc>,
    last_event_at: DateTime<Utc>,
    entries: Vec<BatchEntry>,
}

impl BatchWindow {
    fn open(entry: BatchEntry) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            last_event_at: now,
            entries: vec![entry],
        }
    }

    fn extend(&mut self, entry: BatchEntry) {
        self.last_event_at = Utc::now();
        self.entries.push(entry);
    }

    fn into_summary(self) -> BatchSummary {
        BatchSummary {
            started_at: self.started_at,
            last_event_at: self.last_event_at,
            entries: self.entries,
        }
    }
}

/// Cloneable producer side of the aggregator.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    tx: mpsc::Sender<BatchEntry>,
}

impl BatchHandle {
    pub async fn record(&self, entry: BatchEntry) {
        if self.tx.send(entry).await.is_err() {
            warn!("batch aggregator has stopped; dropping entry");
        }
    }
}

/// Owns the aggregation task.
#[derive(Debug)]
pub struct BatchAggregator {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BatchAggregator {
    pub fn spawn(settings: BatchSettings, sink: Arc<dyn BatchSink>) -> (Self, BatchHandle) {
        let (tx, rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(aggregate_loop(settings.quiet_window, sink, rx, stop_rx));
        (Self { stop_tx, task }, BatchHandle { tx })
    }

    /// Flushes any open window and stops the task.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            warn!("batch aggregator task ended abnormally: {err}");
        }
    }
}

enum Step {
    Entry(BatchEntry),
    Quiet,
    Closed,
}

async fn aggregate_loop(
    quiet_window: Duration,
    sink: Arc<dyn BatchSink>,
    mut rx: mpsc::Receiver<BatchEntry>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut window: Option<BatchWindow> = None;

    loop {
        let step = tokio::select! {
            biased;
            _ = stop_rx.changed() => Step::Closed,
            step = next_step(&mut rx, window.is_some(), quiet_window) => step,
        };

        match step {
            Step::Entry(entry) => match window.as_mut() {
                Some(open) => {
                    open.extend(entry);
                    debug!(entries = open.entries.len(), "batch window extended");
                }
                None => {
                    debug!("batch window opened");
                    window = Some(BatchWindow::open(entry));
                }
            },
            Step::Quiet => flush(&sink, &mut window).await,
            Step::Closed => {
                while let Ok(entry) = rx.try_recv() {
                    match window.as_mut() {
                        Some(open) => open.extend(entry),
                        None => window = Some(BatchWindow::open(entry)),
                    }
                }
                flush(&sink, &mut window).await;
                break;
            }
        }
    }
}

async fn next_step(
    rx: &mut mpsc::Receiver<BatchEntry>,
    accumulating: bool,
    quiet_window: Duration,
) -> Step {
    let msg = if accumulating {
        match timeout(quiet_window, rx.recv()).await {
            Ok(msg) => msg,
            Err(_) => return Step::Quiet,
        }
    } else {
        rx.recv().await
    };
    match msg {
        Some(entry) => Step::Entry(entry),
        None => Step::Closed,
    }
}

async fn flush(sink: &Arc<dyn BatchSink>, window: &mut Option<BatchWindow>) {
    let Some(open) = window.take() else {
        return;
    };
    let summary = open.into_summary();
    info!(files = summary.file_count(), "batch window closed");
    sink.on_batch(summary).await;
}
