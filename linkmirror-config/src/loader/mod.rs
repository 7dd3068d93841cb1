pub mod error;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use linkmirror_core::{
    BatchSettings, MonitorDefinition, ObfuscationSettings, SyncJobSettings, WatchSettings,
};
use once_cell::sync::Lazy;
use tracing::debug;
use url::Url;

use crate::models::sources::{DurationValue, EnvConfig, FileConfig, FileSyncJobConfig};
use crate::models::{Config, ConfigMetadata, ConfigSource, DatabaseSettings, NotificationSettings};
use crate::validation::{self, ConfigWarnings};
pub use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("linkmirror.toml"),
        PathBuf::from("config/linkmirror.toml"),
        PathBuf::from("linkmirror.json"),
    ]
});

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub skip_env_file: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.options.skip_env_file = true;
        self
    }

    /// Loads `.env`, reads the process environment and composes the configuration.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = if self.options.skip_env_file {
            false
        } else {
            let loaded = match &self.options.env_file {
                Some(path) => dotenvy::from_path(path).map(|_| ()),
                None => dotenvy::dotenv().map(|_| ()),
            };
            match loaded {
                Ok(()) => true,
                Err(dotenvy::Error::Io(_)) => false,
                Err(err) => return Err(err.into()),
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes the configuration from an explicit environment snapshot.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, source) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if source == ConfigSource::Defaults {
            warnings.push_with_hint(
                "No linkmirror.toml detected; running with defaults",
                "Set LINKMIRROR_CONFIG or create linkmirror.toml with at least one [[monitors]] entry",
            );
        }

        let config = compose_config(file_config, env, source)?;
        warnings.extend(validation::validate(&config)?);
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, ConfigSource), ConfigLoadError> {
        let explicit = self.options.config_path.as_ref().or(env.config_path.as_ref());
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            debug!(path = %path.display(), "reading explicit configuration file");
            return Ok((read_config_file(path)?, ConfigSource::File(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            debug!("reading inline JSON configuration");
            let file = serde_json::from_str(raw).map_err(|source| ConfigLoadError::ParseJson {
                origin: "LINKMIRROR_CONFIG_JSON".to_string(),
                source,
            })?;
            return Ok((file, ConfigSource::InlineJson));
        }

        match DEFAULT_CONFIG_LOCATIONS.iter().find(|candidate| candidate.exists()) {
            Some(path) => {
                debug!(path = %path.display(), "using default configuration location");
                Ok((read_config_file(path)?, ConfigSource::File(path.clone())))
            }
            None => Ok((FileConfig::default(), ConfigSource::Defaults)),
        }
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&contents).map_err(|source| ConfigLoadError::ParseJson {
            origin: path.display().to_string(),
            source,
        })
    } else {
        toml::from_str(&contents).map_err(|source| ConfigLoadError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    source: ConfigSource,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        monitors,
        sync_job,
        notification,
        database,
        batch,
        watch,
        obfuscation,
    } = file;

    let monitors = monitors
        .into_iter()
        .map(absolutize_monitor)
        .collect::<Result<Vec<_>, _>>()?;

    let sync_job = match sync_job {
        Some(job) if job.enabled => Some(compose_sync_job(job, env.sync_job_password.clone())?),
        Some(_) => {
            debug!("sync job section present but disabled");
            None
        }
        None => None,
    };

    let webhook_url = env
        .notify_webhook_url
        .or(notification.webhook_url)
        .filter(|url| !url.trim().is_empty())
        .map(|url| Url::parse(url.trim()))
        .transpose()
        .map_err(|source| ConfigLoadError::InvalidWebhookUrl { source })?;
    let notification = NotificationSettings {
        webhook_url,
        request_timeout: duration_or(
            "notification.request_timeout",
            notification.request_timeout,
            DEFAULT_REQUEST_TIMEOUT,
        )?,
    };

    let database = DatabaseSettings {
        url: env
            .database_url
            .or(database.url)
            .filter(|url| !url.trim().is_empty()),
    };

    let batch_defaults = BatchSettings::default();
    let batch = BatchSettings {
        quiet_window: duration_or(
            "batch.quiet_window",
            batch.quiet_window,
            batch_defaults.quiet_window,
        )?,
    };

    let watch_defaults = WatchSettings::default();
    let watch = WatchSettings {
        settle_delay: duration_or(
            "watch.settle_delay",
            watch.settle_delay,
            watch_defaults.settle_delay,
        )?,
        channel_capacity: watch
            .channel_capacity
            .unwrap_or(watch_defaults.channel_capacity),
    };

    let obfuscation = ObfuscationSettings {
        max_length: obfuscation
            .max_length
            .unwrap_or(ObfuscationSettings::default().max_length),
    };

    Ok(Config {
        monitors,
        sync_job,
        notification,
        database,
        batch,
        watch,
        obfuscation,
        metadata: ConfigMetadata {
            source,
            env_file_loaded: false,
        },
    })
}

fn compose_sync_job(
    job: FileSyncJobConfig,
    password_override: Option<String>,
) -> Result<SyncJobSettings, ConfigLoadError> {
    let mut job_ids = job.job_ids;
    if let Some(id) = job.job_id
        && !job_ids.contains(&id)
    {
        job_ids.push(id);
    }
    Ok(SyncJobSettings {
        url: job.url.trim().to_string(),
        username: job.username,
        password: password_override.unwrap_or(job.password),
        job_ids,
        check_interval: duration_or(
            "sync_job.check_interval",
            job.check_interval,
            DEFAULT_CHECK_INTERVAL,
        )?,
        request_timeout: duration_or(
            "sync_job.request_timeout",
            job.request_timeout,
            DEFAULT_REQUEST_TIMEOUT,
        )?,
    })
}

fn duration_or(
    field: &'static str,
    value: Option<DurationValue>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match value {
        None => Ok(default),
        Some(value) => value.parse().map_err(|source| ConfigLoadError::InvalidDuration {
            field,
            value: match &value {
                DurationValue::Seconds(secs) => secs.to_string(),
                DurationValue::Human(text) => text.clone(),
            },
            source,
        }),
    }
}

/// Watcher events carry absolute paths, so every configured path is made absolute up front.
fn absolutize_monitor(mut monitor: MonitorDefinition) -> Result<MonitorDefinition, ConfigLoadError> {
    monitor.source = absolute(&monitor.source)?;
    for target in &mut monitor.targets {
        target.path = absolute(&target.path)?;
    }
    if let Some(template) = monitor.template_files_path.take() {
        monitor.template_files_path = if template.as_os_str().is_empty() {
            None
        } else {
            Some(absolute(&template)?)
        };
    }
    Ok(monitor)
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigLoadError> {
    std::path::absolute(path).map_err(|source| ConfigLoadError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}
