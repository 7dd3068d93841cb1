//! Recursive source-tree watching.
//!
//! A `notify` watcher per monitor forwards raw events into a bounded channel.
//! A per-monitor loop picks out created or moved-in files, waits for them to
//! settle, and hands them to [`LinkEngine::handle_file`]. Independent files are
//! processed concurrently; a path already settling is not queued twice.

mod filter;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle, JoinSet, spawn_blocking};
use tracing::{debug, error, info, warn};

use crate::config::WatchSettings;
use crate::engine::{EngineSet, LinkEngine};
use crate::error::{LinkError, Result};

pub use filter::candidate_path;

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

struct MonitorWatch {
    source: PathBuf,
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

/// Running watchers for every monitor in an [`EngineSet`].
pub struct ChangeWatcher {
    monitors: Vec<MonitorWatch>,
    stop_tx: watch::Sender<bool>,
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<_> = self.monitors.iter().map(|m| m.source.display().to_string()).collect();
        f.debug_struct("ChangeWatcher")
            .field("sources", &sources)
            .field("stopped", &*self.stop_tx.borrow())
            .finish()
    }
}

impl ChangeWatcher {
    /// Starts one watcher per engine.
    ///
    /// A source that cannot be watched is logged and skipped; it is an error
    /// only when no source could be watched at all.
    pub async fn start(engines: &EngineSet, settings: WatchSettings) -> Result<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut monitors = Vec::with_capacity(engines.engines().len());

        for engine in engines.engines() {
            let source = engine.source_root().to_path_buf();
            let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));

            let root = source.clone();
            let built = spawn_blocking(move || init_watcher(root, tx))
                .await
                .map_err(|e| LinkError::Internal(format!("watcher initialization panicked: {e}")))?;
            let watcher = match built {
                Ok(watcher) => watcher,
                Err(err) => {
                    error!(source = %source.display(), reason = %err, "could not watch source");
                    continue;
                }
            };

            let task = tokio::spawn(watch_loop(
                Arc::clone(engine),
                rx,
                stop_rx.clone(),
                settings.settle_delay,
            ));
            info!(source = %source.display(), "watching source");
            monitors.push(MonitorWatch {
                source,
                watcher: Some(watcher),
                task,
            });
        }

        if monitors.is_empty() && !engines.is_empty() {
            return Err(LinkError::Internal("no source directory could be watched".into()));
        }
        Ok(Self { monitors, stop_tx })
    }

    pub fn watched_sources(&self) -> Vec<PathBuf> {
        self.monitors.iter().map(|m| m.source.clone()).collect()
    }

    /// Stops accepting events and waits for files already settling to finish.
    pub async fn shutdown(mut self) {
        for monitor in &mut self.monitors {
            // Dropping the watcher closes the notify stream.
            monitor.watcher.take();
        }
        let _ = self.stop_tx.send(true);
        for monitor in self.monitors {
            if let Err(err) = monitor.task.await {
                warn!(source = %monitor.source.display(), "watch loop ended abnormally: {err}");
            }
        }
        info!("file watchers stopped");
    }
}

/// Hands a watcher callback message to the monitor loop. Returns false once
/// the loop is gone.
fn forward(tx: &mpsc::Sender<WatchMessage>, message: WatchMessage, root: &Path) -> bool {
    match tx.blocking_send(message) {
        Ok(()) => true,
        Err(mpsc::error::SendError(message)) => {
            warn!(root = %root.display(), ?message, "watch channel closed; dropping watcher message");
            false
        }
    }
}

fn init_watcher(root: PathBuf, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let label = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let message = match res {
                Ok(event) => WatchMessage::Event(event),
                Err(err) => WatchMessage::Error(err.to_string()),
            };
            forward(&tx, message, &label);
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

async fn watch_loop(
    engine: Arc<LinkEngine>,
    mut rx: mpsc::Receiver<WatchMessage>,
    mut stop_rx: watch::Receiver<bool>,
    settle_delay: Duration,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut settling: HashSet<PathBuf> = HashSet::new();
    let mut task_paths: HashMap<task::Id, PathBuf> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            Some(done) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                let id = match done {
                    Ok((id, ())) => id,
                    Err(err) => {
                        error!("file handler panicked: {err}");
                        err.id()
                    }
                };
                if let Some(path) = task_paths.remove(&id) {
                    settling.remove(&path);
                }
            }
            msg = rx.recv() => match msg {
                Some(WatchMessage::Event(event)) => {
                    let Some(path) = candidate_path(&event) else {
                        continue;
                    };
                    if !settling.insert(path.clone()) {
                        debug!(path = %path.display(), "already settling");
                        continue;
                    }
                    let handle = tasks.spawn(settle_and_handle(
                        Arc::clone(&engine),
                        path.clone(),
                        settle_delay,
                    ));
                    task_paths.insert(handle.id(), path);
                }
                Some(WatchMessage::Error(message)) => {
                    warn!(source = %engine.source_root().display(), reason = %message, "watcher error");
                }
                None => break,
            },
        }
    }

    if !tasks.is_empty() {
        info!(
            source = %engine.source_root().display(),
            pending = tasks.len(),
            "waiting for in-flight files"
        );
    }
    while let Some(done) = tasks.join_next().await {
        if let Err(err) = done {
            error!("file handler panicked: {err}");
        }
    }
}

async fn settle_and_handle(engine: Arc<LinkEngine>, path: PathBuf, settle_delay: Duration) {
    tokio::time::sleep(settle_delay).await;
    match engine.handle_file(&path).await {
        Ok(report) if report.skipped.is_none() => {
            debug!(
                source = %path.display(),
                linked = report.linked_labels().len(),
                failed = report.failures().len(),
                "file handled"
            );
        }
        Ok(_) => {}
        Err(err) => error!(source = %path.display(), reason = %err, "file handling failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::config::{MonitorDefinition, ObfuscationSettings, TargetDefinition};
    use crate::notifier::LogNotifier;
    use crate::records::InMemoryLinkRecordRepository;

    fn engines(src: &Path, dst: &Path) -> Result<EngineSet> {
        let monitors = vec![MonitorDefinition::new(src).with_target(TargetDefinition::new(dst))];
        Ok(EngineSet::from_monitors(
            &monitors,
            ObfuscationSettings::default(),
            Arc::new(InMemoryLinkRecordRepository::new()),
            Arc::new(LogNotifier),
            None,
        )?)
    }

    fn fast() -> WatchSettings {
        WatchSettings {
            settle_delay: Duration::from_millis(50),
            channel_capacity: 64,
        }
    }

    #[test]
    fn forwarding_reports_a_closed_loop() {
        let root = Path::new("/src");
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward(&tx, WatchMessage::Error("inotify overflow".into()), root));
        assert!(matches!(rx.try_recv(), Ok(WatchMessage::Error(msg)) if msg == "inotify overflow"));

        drop(rx);
        assert!(!forward(&tx, WatchMessage::Error("lost".into()), root));
        assert!(!forward(&tx, WatchMessage::Event(Event::default()), root));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn renamed_in_file_is_mirrored() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("Movies/Heat (1995)"))?;

        let set = engines(&src, &dst)?;
        let watcher = ChangeWatcher::start(&set, fast()).await?;
        assert_eq!(watcher.watched_sources(), vec![src.clone()]);

        let partial = src.join("Movies/Heat (1995)/Heat.mkv.part");
        fs::write(&partial, "video")?;
        fs::rename(&partial, src.join("Movies/Heat (1995)/Heat.mkv"))?;

        let expected = dst.join("Movies/Heat (1995)/Heat.mkv");
        let mut waited = Duration::ZERO;
        while !expected.exists() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
        assert!(expected.is_file(), "{} was not created", expected.display());
        assert!(!dst.join("Movies/Heat (1995)/Heat.mkv.part").exists());

        watcher.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn missing_sources_are_an_error() -> Result<()> {
        let dir = tempdir()?;
        let set = engines(&dir.path().join("absent"), &dir.path().join("dst"))?;
        let err = ChangeWatcher::start(&set, fast()).await.unwrap_err();
        assert!(matches!(err, LinkError::Internal(_)));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_waits_for_settling_files() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src)?;
        let file = src.join("clip.mkv");
        fs::write(&file, "x")?;

        let set = engines(&src, &dst)?;
        let engine = Arc::clone(&set.engines()[0]);
        let (tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(watch_loop(engine, rx, stop_rx, Duration::from_millis(100)));

        let event = Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(file.clone());
        tx.send(WatchMessage::Event(event.clone())).await?;
        tx.send(WatchMessage::Event(event)).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;

        stop_tx.send(true)?;
        task.await?;
        assert!(dst.join("clip.mkv").is_file());
        Ok(())
    }
}
