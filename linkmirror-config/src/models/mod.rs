pub mod sources;

use std::path::PathBuf;
use std::time::Duration;

use linkmirror_core::{
    BatchSettings, MonitorDefinition, ObfuscationSettings, SyncJobSettings, WatchSettings,
};
use url::Url;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub monitors: Vec<MonitorDefinition>,
    pub sync_job: Option<SyncJobSettings>,
    pub notification: NotificationSettings,
    pub database: DatabaseSettings,
    pub batch: BatchSettings,
    pub watch: WatchSettings,
    pub obfuscation: ObfuscationSettings,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn enabled_monitors(&self) -> impl Iterator<Item = &MonitorDefinition> {
        self.monitors.iter().filter(|m| m.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub webhook_url: Option<Url>,
    pub request_timeout: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: Option<String>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = self.url.as_deref().map(redact_url);
        f.debug_struct("DatabaseSettings").field("url", &url).finish()
    }
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable>".to_string(),
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    InlineJson,
    Defaults,
}

#[derive(Debug, Clone)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self {
            source: ConfigSource::Defaults,
            env_file_loaded: false,
        }
    }
}
