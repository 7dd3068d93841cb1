use glob::Pattern;
use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("no enabled monitor has a source and at least one target")]
    NoMonitors,
    #[error("invalid exclude pattern '{pattern}' for {source_root}")]
    InvalidExcludePattern {
        source_root: String,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid sync job URL '{url}'")]
    InvalidSyncJobUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("sync job is enabled but no job ids are configured")]
    NoSyncJobIds,
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Hard checks that stop startup, plus soft warnings worth logging.
pub fn validate(config: &Config) -> Result<ConfigWarnings, ConfigValidationError> {
    let mut warnings = ConfigWarnings::default();

    if !config.enabled_monitors().any(|m| !m.targets.is_empty()) {
        return Err(ConfigValidationError::NoMonitors);
    }

    for monitor in config.enabled_monitors() {
        let source_root = monitor.source.display().to_string();
        for pattern in &monitor.exclude_patterns {
            Pattern::new(pattern).map_err(|source| ConfigValidationError::InvalidExcludePattern {
                source_root: source_root.clone(),
                pattern: pattern.clone(),
                source,
            })?;
        }

        if !monitor.source.is_dir() {
            warnings.push_with_hint(
                format!("source directory {source_root} does not exist"),
                "it will not be watched until it exists and linkmirror restarts",
            );
        }
        if monitor.targets.is_empty() {
            warnings.push(format!("monitor {source_root} has no targets"));
        }
        if let Some(template_dir) = monitor.template_dir()
            && !template_dir.is_dir()
        {
            warnings.push(format!(
                "template directory {} does not exist; show directories will not be seeded",
                template_dir.display()
            ));
        }
        for target in &monitor.targets {
            if target.path == monitor.source {
                warnings.push(format!("target {} is the same as its source", target.display_label()));
            } else if target.path.starts_with(&monitor.source) {
                warnings.push_with_hint(
                    format!("target {} lies inside source {source_root}", target.display_label()),
                    "linked files will be picked up by the watcher again",
                );
            }
        }
    }

    if let Some(job) = &config.sync_job {
        url::Url::parse(&job.url).map_err(|source| ConfigValidationError::InvalidSyncJobUrl {
            url: job.url.clone(),
            source,
        })?;
        if job.job_ids.is_empty() {
            return Err(ConfigValidationError::NoSyncJobIds);
        }
        if job.check_interval.is_zero() {
            return Err(ConfigValidationError::ZeroDuration {
                field: "sync_job.check_interval",
            });
        }
        if job.username.is_empty() {
            warnings.push("sync job username is empty");
        }
    }

    if config.batch.quiet_window.is_zero() {
        return Err(ConfigValidationError::ZeroDuration {
            field: "batch.quiet_window",
        });
    }

    Ok(warnings)
}
