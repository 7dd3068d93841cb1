use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{DeletionReport, FileReport, LinkEngine, SyncSummary, TemplateSummary};
use crate::batch::BatchHandle;
use crate::config::{MonitorDefinition, ObfuscationSettings};
use crate::error::{LinkError, Result};
use crate::notifier::{Notifier, messages};
use crate::records::LinkRecordRepository;

/// All enabled monitors, routed by source path.
#[derive(Clone)]
pub struct EngineSet {
    engines: Vec<Arc<LinkEngine>>,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSet")
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}

impl EngineSet {
    pub fn from_monitors(
        monitors: &[MonitorDefinition],
        settings: ObfuscationSettings,
        records: Arc<dyn LinkRecordRepository>,
        notifier: Arc<dyn Notifier>,
        batches: Option<BatchHandle>,
    ) -> Result<Self> {
        let mut engines = Vec::new();
        for monitor in monitors {
            if !monitor.enabled {
                info!(source = %monitor.source.display(), "monitor disabled, skipping");
                continue;
            }
            let mut engine = LinkEngine::new(
                monitor.clone(),
                settings,
                Arc::clone(&records),
                Arc::clone(&notifier),
            )?;
            if let Some(handle) = &batches {
                engine = engine.with_batches(handle.clone());
            }
            engines.push(Arc::new(engine));
        }
        Ok(Self { engines, notifier })
    }

    pub fn engines(&self) -> &[Arc<LinkEngine>] {
        &self.engines
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Engine with the deepest source root containing `path`.
    pub fn for_source(&self, path: &Path) -> Option<&Arc<LinkEngine>> {
        self.engines
            .iter()
            .filter(|e| e.owns(path))
            .max_by_key(|e| e.source_root().components().count())
    }

    fn require(&self, path: &Path) -> Result<&Arc<LinkEngine>> {
        self.for_source(path).ok_or_else(|| {
            LinkError::InvalidPath(format!("{} is not under any monitored source", path.display()))
        })
    }

    pub async fn sync_all(&self) -> Result<SyncSummary> {
        let mut total = SyncSummary::default();
        for engine in &self.engines {
            match engine.sync_all().await {
                Ok(summary) => total.merge(summary),
                Err(err) => {
                    warn!(source = %engine.source_root().display(), reason = %err, "full sync failed")
                }
            }
        }
        let (title, body) =
            messages::full_sync(total.total_files, total.linked, total.skipped, total.failed);
        if let Err(err) = self.notifier.notify(&title, &body).await {
            warn!(reason = %err, "full sync notification failed");
        }
        Ok(total)
    }

    pub async fn retry(&self, source: &Path, target: Option<&str>) -> Result<FileReport> {
        self.require(source)?.retry(source, target).await
    }

    pub async fn resync(&self, source: &Path) -> Result<FileReport> {
        self.require(source)?.resync(source).await
    }

    pub async fn delete_record(&self, source: &Path) -> Result<DeletionReport> {
        self.require(source)?.delete_record(source).await
    }

    pub async fn link_templates_all(&self) -> Result<TemplateSummary> {
        let mut total = TemplateSummary::default();
        for engine in &self.engines {
            total.merge(engine.link_templates_all().await?);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::config::TargetDefinition;
    use crate::notifier::MockNotifier;
    use crate::records::InMemoryLinkRecordRepository;

    #[tokio::test]
    async fn routes_to_deepest_root_and_skips_disabled() -> Result<()> {
        let dir = tempdir()?;
        let outer = dir.path().join("media");
        let inner = outer.join("anime");
        let mut disabled = MonitorDefinition::new(dir.path().join("off"));
        disabled.enabled = false;

        let monitors = vec![
            MonitorDefinition::new(&outer).with_target(TargetDefinition::new(dir.path().join("x"))),
            MonitorDefinition::new(&inner).with_target(TargetDefinition::new(dir.path().join("y"))),
            disabled,
        ];
        let set = EngineSet::from_monitors(
            &monitors,
            ObfuscationSettings::default(),
            Arc::new(InMemoryLinkRecordRepository::new()),
            Arc::new(MockNotifier::new()),
            None,
        )?;

        assert_eq!(set.engines().len(), 2);
        let engine = set.for_source(&inner.join("show/e1.mkv")).unwrap();
        assert_eq!(engine.source_root(), inner.as_path());
        let engine = set.for_source(&outer.join("film.mkv")).unwrap();
        assert_eq!(engine.source_root(), outer.as_path());
        assert!(set.for_source(&dir.path().join("off/a.mkv")).is_none());

        let err = set.resync(&dir.path().join("off/a.mkv")).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidPath(_)));
        Ok(())
    }

    #[tokio::test]
    async fn sync_all_reports_totals_once() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("Movies"))?;
        fs::write(src.join("Movies/a.mkv"), "a")?;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|_, body| body.contains('1'))
            .times(1)
            .returning(|_, _| Ok(()));

        let monitors =
            vec![MonitorDefinition::new(&src).with_target(TargetDefinition::new(dir.path().join("dst")))];
        let set = EngineSet::from_monitors(
            &monitors,
            ObfuscationSettings::default(),
            Arc::new(InMemoryLinkRecordRepository::new()),
            Arc::new(notifier),
            None,
        )?;

        let summary = set.sync_all().await?;
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.linked, 1);
        Ok(())
    }
}
