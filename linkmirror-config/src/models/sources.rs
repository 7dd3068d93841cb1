use std::path::PathBuf;
use std::time::Duration;

use linkmirror_core::MonitorDefinition;
use serde::Deserialize;

/// Raw configuration as written in a TOML or JSON file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub monitors: Vec<MonitorDefinition>,
    #[serde(default, alias = "taosync")]
    pub sync_job: Option<FileSyncJobConfig>,
    #[serde(default)]
    pub notification: FileNotificationConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub batch: FileBatchConfig,
    #[serde(default)]
    pub watch: FileWatchConfig,
    #[serde(default)]
    pub obfuscation: FileObfuscationConfig,
}

/// A duration written either as whole seconds or in humantime form (`"30s"`, `"1m"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Human(String),
}

impl DurationValue {
    pub fn parse(&self) -> Result<Duration, humantime::DurationError> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            Self::Human(text) => humantime::parse_duration(text.trim()),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileSyncJobConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub job_ids: Vec<i64>,
    /// Single-job form kept for older configuration files.
    pub job_id: Option<i64>,
    pub check_interval: Option<DurationValue>,
    pub request_timeout: Option<DurationValue>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileNotificationConfig {
    pub webhook_url: Option<String>,
    pub request_timeout: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileDatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileBatchConfig {
    pub quiet_window: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileWatchConfig {
    pub settle_delay: Option<DurationValue>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileObfuscationConfig {
    pub max_length: Option<usize>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub database_url: Option<String>,
    pub sync_job_password: Option<String>,
    pub notify_webhook_url: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("LINKMIRROR_CONFIG").map(PathBuf::from),
            config_json: non_empty_var("LINKMIRROR_CONFIG_JSON"),
            database_url: non_empty_var("DATABASE_URL"),
            sync_job_password: non_empty_var("SYNC_JOB_PASSWORD"),
            notify_webhook_url: non_empty_var("NOTIFY_WEBHOOK_URL"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
