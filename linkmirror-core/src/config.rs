//! Runtime settings consumed by the core.
//!
//! Monitor and target definitions are deserialised straight from the
//! configuration file. Timing settings are plain [`Duration`]s; the
//! `linkmirror-config` crate is responsible for parsing their human-readable
//! form.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One destination tree a monitor mirrors into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTarget")]
pub struct TargetDefinition {
    pub path: PathBuf,
    pub label: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Plain(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default, alias = "name")]
        label: Option<String>,
    },
}

impl From<RawTarget> for TargetDefinition {
    fn from(raw: RawTarget) -> Self {
        match raw {
            RawTarget::Plain(path) => Self { path, label: None },
            RawTarget::Detailed { path, label } => Self {
                path,
                label: label.filter(|l| !l.trim().is_empty()),
            },
        }
    }
}

impl TargetDefinition {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Stable key used in [`crate::records::LinkRecord::target_state`].
    pub fn id(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Label used in logs and notifications; falls back to the path.
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.id())
    }
}

/// How materialised files are named on the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// Per-character obfuscation of the file stem, extension preserved.
    #[default]
    Obfuscated,
    /// `S01E02-1080p.mkv`, `1080p.mkv` or `movie.mkv` derived from the source name.
    EpisodeTag,
}

/// A watched source tree and the targets it mirrors into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorDefinition {
    #[serde(alias = "source_path")]
    pub source: PathBuf,
    #[serde(default, alias = "target_paths")]
    pub targets: Vec<TargetDefinition>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub obfuscate_enabled: bool,
    #[serde(default)]
    pub template_files_path: Option<PathBuf>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub file_naming: FileNaming,
    /// Original show directory name to the obfuscated name it must keep.
    #[serde(default)]
    pub name_overrides: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl MonitorDefinition {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            targets: Vec::new(),
            exclude_patterns: Vec::new(),
            obfuscate_enabled: false,
            template_files_path: None,
            enabled: true,
            file_naming: FileNaming::default(),
            name_overrides: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: TargetDefinition) -> Self {
        self.targets.push(target);
        self
    }

    /// Template directory, ignoring blank values.
    pub fn template_dir(&self) -> Option<&Path> {
        self.template_files_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Name obfuscation tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObfuscationSettings {
    /// Output budget for the char-split scheme.
    pub max_length: usize,
}

impl Default for ObfuscationSettings {
    fn default() -> Self {
        Self { max_length: 20 }
    }
}

/// Watcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Wait between a create/move event and reading the file.
    pub settle_delay: Duration,
    pub channel_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            channel_capacity: 1024,
        }
    }
}

/// Batch aggregation timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Quiet period that closes a batch window.
    pub quiet_window: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            quiet_window: Duration::from_secs(30),
        }
    }
}

/// Connection info for the downstream sync job.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncJobSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub job_ids: Vec<i64>,
    pub check_interval: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for SyncJobSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJobSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("job_ids", &self.job_ids)
            .field("check_interval", &self.check_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
