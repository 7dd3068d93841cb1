//! Per-monitor orchestration of materialisation, records, templates and batching.
//!
//! The watcher, full sync, retry and resync all funnel through
//! [`LinkEngine::process`], so target naming and linking rules live in one
//! place.

mod locks;
mod set;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::batch::{BatchEntry, BatchHandle};
use crate::config::{MonitorDefinition, ObfuscationSettings, TargetDefinition};
use crate::error::{LinkError, Result};
use crate::materialize::{
    LinkMaterializer, MaterializeOutcome, TemplateReport, link_templates, show_directory,
};
use crate::media::{ExcludeSet, display_name, is_media_file, path_key, relative_within};
use crate::notifier::{Notifier, messages};
use crate::records::{LinkRecord, LinkRecordRepository, Page, TargetState};
use locks::KeyedLocks;

pub use set::EngineSet;

const RECORD_PAGE_SIZE: u64 = 500;

/// Why a path was not materialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    OutsideSource,
    Missing,
    Directory,
    NotMedia,
    Excluded(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideSource => f.write_str("outside the source root"),
            Self::Missing => f.write_str("missing or unreadable"),
            Self::Directory => f.write_str("not a regular file"),
            Self::NotMedia => f.write_str("not a media file"),
            Self::Excluded(pattern) => write!(f, "excluded by '{pattern}'"),
        }
    }
}

/// Which targets a processing pass touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Every target, overwriting existing links.
    All,
    /// Targets with no record, or whose recorded file is gone.
    Missing,
    /// Like `Missing`, plus targets whose recorded file size differs from the source.
    Stale,
    /// A single target id.
    Only(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub target_id: String,
    pub label: String,
    pub outcome: MaterializeOutcome,
}

/// Everything that happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub skipped: Option<SkipReason>,
    pub targets: Vec<TargetReport>,
}

impl FileReport {
    fn skipped(source: &Path, reason: SkipReason) -> Self {
        Self {
            source: source.to_path_buf(),
            skipped: Some(reason),
            targets: Vec::new(),
        }
    }

    pub fn linked_labels(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.outcome.is_success())
            .map(|t| t.label.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<(String, String)> {
        self.targets
            .iter()
            .filter_map(|t| match &t.outcome {
                MaterializeOutcome::Failed { error } => Some((t.label.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total_files: usize,
    pub linked: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn absorb(&mut self, report: &FileReport) {
        for target in &report.targets {
            match target.outcome {
                MaterializeOutcome::Materialized { .. } => self.linked += 1,
                MaterializeOutcome::Skipped { .. } => self.skipped += 1,
                MaterializeOutcome::Failed { .. } => self.failed += 1,
            }
        }
    }

    pub fn merge(&mut self, other: SyncSummary) {
        self.total_files += other.total_files;
        self.linked += other.linked;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub removed_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub show_dirs: usize,
    pub linked: usize,
    pub skipped: usize,
}

impl TemplateSummary {
    fn absorb(&mut self, report: &TemplateReport) {
        self.show_dirs += 1;
        self.linked += report.linked.len();
        self.skipped += report.skipped.len();
    }

    pub fn merge(&mut self, other: TemplateSummary) {
        self.show_dirs += other.show_dirs;
        self.linked += other.linked;
        self.skipped += other.skipped;
    }
}

/// Owns one monitor definition and everything needed to mirror it.
pub struct LinkEngine {
    monitor: MonitorDefinition,
    excludes: ExcludeSet,
    materializer: Arc<LinkMaterializer>,
    records: Arc<dyn LinkRecordRepository>,
    notifier: Arc<dyn Notifier>,
    batches: Option<BatchHandle>,
    seeded: Mutex<HashSet<(String, PathBuf)>>,
    locks: KeyedLocks,
}

impl fmt::Debug for LinkEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkEngine")
            .field("source", &self.monitor.source)
            .field("targets", &self.monitor.targets.len())
            .field("obfuscate", &self.monitor.obfuscate_enabled)
            .field("batching", &self.batches.is_some())
            .finish_non_exhaustive()
    }
}

impl LinkEngine {
    pub fn new(
        monitor: MonitorDefinition,
        settings: ObfuscationSettings,
        records: Arc<dyn LinkRecordRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let excludes = ExcludeSet::new(&monitor.exclude_patterns)?;
        let materializer = Arc::new(LinkMaterializer::for_monitor(&monitor, settings));
        Ok(Self {
            monitor,
            excludes,
            materializer,
            records,
            notifier,
            batches: None,
            seeded: Mutex::new(HashSet::new()),
            locks: KeyedLocks::default(),
        })
    }

    /// Report successful watcher-driven materialisations to a batch aggregator.
    pub fn with_batches(mut self, batches: BatchHandle) -> Self {
        self.batches = Some(batches);
        self
    }

    pub fn monitor(&self) -> &MonitorDefinition {
        &self.monitor
    }

    pub fn source_root(&self) -> &Path {
        &self.monitor.source
    }

    pub fn materializer(&self) -> &LinkMaterializer {
        &self.materializer
    }

    pub fn owns(&self, path: &Path) -> bool {
        relative_within(&self.monitor.source, path).is_some()
    }

    /// Decides whether `path` should be mirrored.
    pub async fn classify(&self, path: &Path) -> Option<SkipReason> {
        if !self.owns(path) {
            return Some(SkipReason::OutsideSource);
        }
        match tokio::fs::metadata(path).await {
            Err(_) => return Some(SkipReason::Missing),
            Ok(meta) if !meta.is_file() => return Some(SkipReason::Directory),
            Ok(_) => {}
        }
        if !is_media_file(path) {
            return Some(SkipReason::NotMedia);
        }
        self.excludes
            .matching(path)
            .map(|pattern| SkipReason::Excluded(pattern.to_string()))
    }

    /// Entry point for a settled filesystem event.
    pub async fn handle_file(&self, path: &Path) -> Result<FileReport> {
        if let Some(reason) = self.classify(path).await {
            match &reason {
                SkipReason::Missing => warn!(source = %path.display(), "file vanished before it could be linked"),
                SkipReason::Excluded(pattern) => {
                    info!(source = %path.display(), pattern = %pattern, "file excluded")
                }
                _ => debug!(source = %path.display(), %reason, "ignoring path"),
            }
            return Ok(FileReport::skipped(path, reason));
        }
        self.process(path, TargetPolicy::All, true).await
    }

    /// Re-runs materialisation for one target (by id or label) or all of them.
    pub async fn retry(&self, source: &Path, target: Option<&str>) -> Result<FileReport> {
        self.ensure_qualifies(source).await?;
        let policy = match target {
            Some(wanted) => TargetPolicy::Only(self.find_target(wanted)?.id()),
            None => TargetPolicy::All,
        };
        self.process(source, policy, false).await
    }

    /// Re-materialises targets whose recorded file is missing or differs in size.
    pub async fn resync(&self, source: &Path) -> Result<FileReport> {
        self.ensure_qualifies(source).await?;
        self.process(source, TargetPolicy::Stale, false).await
    }

    /// Walks the source tree and links every file not yet present on each target.
    pub async fn sync_all(&self) -> Result<SyncSummary> {
        let root = self.monitor.source.clone();
        let excludes = self.excludes.clone();
        let files = spawn_blocking(move || collect_media_files(&root, &excludes))
            .await
            .map_err(|e| LinkError::Internal(format!("source walk failed: {e}")))?;

        let mut summary = SyncSummary {
            total_files: files.len(),
            ..SyncSummary::default()
        };
        info!(source = %self.monitor.source.display(), files = files.len(), "full sync started");
        for file in files {
            match self.process(&file, TargetPolicy::Missing, false).await {
                Ok(report) => summary.absorb(&report),
                Err(err) => {
                    error!(source = %file.display(), reason = %err, "full sync failed for file");
                    summary.failed += 1;
                }
            }
        }
        info!(
            source = %self.monitor.source.display(),
            linked = summary.linked,
            skipped = summary.skipped,
            failed = summary.failed,
            "full sync finished"
        );
        Ok(summary)
    }

    /// Removes every recorded target file for `source`, then the record.
    ///
    /// The record is kept when a file cannot be removed so the deletion can be retried.
    pub async fn delete_record(&self, source: &Path) -> Result<DeletionReport> {
        let key = path_key(source);
        let _guard = self.locks.lock(&key).await;
        let record = self
            .records
            .get_by_source_path(&key)
            .await?
            .ok_or_else(|| LinkError::NotFound(format!("link record for {key}")))?;

        let mut report = DeletionReport::default();
        for (target_id, state) in &record.target_state {
            match tokio::fs::remove_file(&state.resolved_path).await {
                Ok(()) => {
                    info!(target = %target_id, path = %state.resolved_path.display(), "removed target file");
                    report.removed_files.push(state.resolved_path.clone());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %state.resolved_path.display(), "target file already gone");
                }
                Err(err) => {
                    error!(
                        target = %target_id,
                        path = %state.resolved_path.display(),
                        reason = %err,
                        "could not remove target file"
                    );
                    return Err(err.into());
                }
            }
        }

        self.records.delete(&key).await?;
        Ok(report)
    }

    /// Seeds the template directory into every show directory this monitor has records for.
    pub async fn link_templates_all(&self) -> Result<TemplateSummary> {
        let Some(template_dir) = self.monitor.template_dir().map(Path::to_path_buf) else {
            return Ok(TemplateSummary::default());
        };
        let roots: HashMap<String, PathBuf> = self
            .monitor
            .targets
            .iter()
            .map(|t| (t.id(), t.path.clone()))
            .collect();

        let mut show_dirs = BTreeSet::new();
        let mut page = Page::first(RECORD_PAGE_SIZE);
        loop {
            let records = self.records.list(page).await?;
            for record in &records {
                if !self.owns(Path::new(&record.source_path)) {
                    continue;
                }
                for (target_id, state) in &record.target_state {
                    if let Some(root) = roots.get(target_id)
                        && let Some(show) = show_directory(&state.resolved_path, root)
                    {
                        show_dirs.insert((target_id.clone(), show));
                    }
                }
            }
            if (records.len() as u64) < page.limit {
                break;
            }
            page = page.next();
        }

        let dirs: Vec<_> = show_dirs.into_iter().collect();
        let results = {
            let dirs = dirs.clone();
            spawn_blocking(move || {
                dirs.iter()
                    .map(|(_, show)| link_templates(&template_dir, show))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| LinkError::Internal(format!("template linking failed: {e}")))?
        };

        let mut summary = TemplateSummary::default();
        let mut seeded = self.seeded.lock().await;
        for ((target_id, show), result) in dirs.into_iter().zip(results) {
            match result {
                Ok(report) => {
                    summary.absorb(&report);
                    seeded.insert((target_id, show));
                }
                Err(err) => warn!(show = %show.display(), reason = %err, "template linking failed"),
            }
        }
        Ok(summary)
    }

    /// Materialises `source` on the targets selected by `policy` and updates its record.
    pub async fn process(
        &self,
        source: &Path,
        policy: TargetPolicy,
        report_to_batch: bool,
    ) -> Result<FileReport> {
        let key = path_key(source);
        let _guard = self.locks.lock(&key).await;
        let size = tokio::fs::metadata(source).await?.len();

        let mut record = match self.records.get_by_source_path(&key).await? {
            Some(record) => record,
            None => LinkRecord::new(key.clone(), display_name(source), size),
        };

        let mut targets = Vec::with_capacity(self.monitor.targets.len());
        let mut changed = false;
        for target in &self.monitor.targets {
            let target_id = target.id();
            let label = target.display_label();

            if let Some(reason) = skip_target(&policy, &record, &target_id, size).await {
                debug!(source = %source.display(), target = %label, %reason, "target skipped");
                targets.push(TargetReport {
                    target_id,
                    label,
                    outcome: MaterializeOutcome::Skipped { reason },
                });
                continue;
            }

            let outcome = self.materialize_on(source, target).await;
            match &outcome {
                MaterializeOutcome::Materialized { path, method } => {
                    info!(
                        source = %source.display(),
                        target = %label,
                        path = %path.display(),
                        method = ?method,
                        "file linked"
                    );
                    record.record_target(
                        target_id.clone(),
                        TargetState {
                            resolved_path: path.clone(),
                            method: *method,
                            materialized_at: Utc::now(),
                        },
                    );
                    changed = true;
                    self.seed_templates(&target_id, &target.path, path).await;
                }
                MaterializeOutcome::Failed { error } => {
                    error!(
                        source = %source.display(),
                        target = %label,
                        reason = %error,
                        "materialization failed"
                    );
                }
                MaterializeOutcome::Skipped { .. } => {}
            }
            targets.push(TargetReport {
                target_id,
                label,
                outcome,
            });
        }

        if changed {
            record.size_bytes = size;
            self.records.upsert(&record).await?;
        }

        let report = FileReport {
            source: source.to_path_buf(),
            skipped: None,
            targets,
        };
        self.report(&report, report_to_batch).await;
        Ok(report)
    }

    async fn report(&self, report: &FileReport, report_to_batch: bool) {
        let file_name = report
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let linked = report.linked_labels();
        if report_to_batch
            && !linked.is_empty()
            && let Some(batches) = &self.batches
        {
            batches
                .record(BatchEntry {
                    file_name: file_name.clone(),
                    target_labels: linked,
                })
                .await;
        }

        let failures = report.failures();
        if !failures.is_empty() {
            let (title, body) = messages::link_failed(&file_name, &failures);
            if let Err(err) = self.notifier.notify(&title, &body).await {
                warn!(reason = %err, "failure notification failed");
            }
        }
    }

    async fn materialize_on(&self, source: &Path, target: &TargetDefinition) -> MaterializeOutcome {
        let materializer = Arc::clone(&self.materializer);
        let source = source.to_path_buf();
        let source_root = self.monitor.source.clone();
        let target_root = target.path.clone();
        spawn_blocking(move || materializer.materialize(&source, &source_root, &target_root))
            .await
            .unwrap_or_else(|err| MaterializeOutcome::Failed {
                error: format!("materialization task failed: {err}"),
            })
    }

    async fn seed_templates(&self, target_id: &str, target_root: &Path, resolved: &Path) {
        let Some(template_dir) = self.monitor.template_dir().map(Path::to_path_buf) else {
            return;
        };
        let Some(show_dir) = show_directory(resolved, target_root) else {
            return;
        };
        let key = (target_id.to_string(), show_dir.clone());
        if !self.seeded.lock().await.insert(key.clone()) {
            return;
        }

        let dest = show_dir.clone();
        let result = spawn_blocking(move || link_templates(&template_dir, &dest))
            .await
            .map_err(|e| LinkError::Internal(e.to_string()))
            .and_then(|r| r);
        match result {
            Ok(report) if !report.linked.is_empty() => {
                info!(show = %show_dir.display(), files = report.linked.len(), "template files seeded");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(show = %show_dir.display(), reason = %err, "template seeding failed");
                self.seeded.lock().await.remove(&key);
            }
        }
    }

    async fn ensure_qualifies(&self, source: &Path) -> Result<()> {
        match self.classify(source).await {
            None => Ok(()),
            Some(SkipReason::Missing) => Err(LinkError::NotFound(source.display().to_string())),
            Some(reason) => Err(LinkError::InvalidPath(format!(
                "{}: {reason}",
                source.display()
            ))),
        }
    }

    fn find_target(&self, wanted: &str) -> Result<&TargetDefinition> {
        self.monitor
            .targets
            .iter()
            .find(|t| t.id() == wanted || t.label.as_deref() == Some(wanted))
            .ok_or_else(|| LinkError::NotFound(format!("target {wanted}")))
    }
}

async fn skip_target(
    policy: &TargetPolicy,
    record: &LinkRecord,
    target_id: &str,
    source_size: u64,
) -> Option<String> {
    let recorded_len = match record.state_for(target_id) {
        Some(state) => tokio::fs::metadata(&state.resolved_path)
            .await
            .ok()
            .map(|m| m.len()),
        None => None,
    };
    match policy {
        TargetPolicy::All => None,
        TargetPolicy::Only(id) if id != target_id => Some("not selected".to_string()),
        TargetPolicy::Only(_) => None,
        TargetPolicy::Missing => recorded_len.map(|_| "already materialized".to_string()),
        TargetPolicy::Stale => match recorded_len {
            Some(len) if len == source_size => Some("up to date".to_string()),
            _ => None,
        },
    }
}

fn collect_media_files(root: &Path, excludes: &ExcludeSet) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(reason = %err, "skipping unreadable entry during full sync");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_media_file(path) && excludes.matching(path).is_none())
        .collect()
}
