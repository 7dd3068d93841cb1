//! Runtime wiring: records store, notifier, trigger queue, engines and watchers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use linkmirror_config::Config;
use linkmirror_core::{
    BatchAggregator, BatchHandle, ChangeWatcher, EngineSet, InMemoryLinkRecordRepository,
    LinkRecordRepository, LogNotifier, Notifier, PostgresLinkRecordRepository, SyncTriggerQueue,
    TaoSyncClient, TriggeringSink, WebhookNotifier,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// Long-lived services shared by every command.
pub struct Services {
    pub config: Config,
    pub records: Arc<dyn LinkRecordRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub queue: Option<Arc<SyncTriggerQueue>>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let records = connect_records(&config).await?;
        let notifier = build_notifier(&config)?;
        let queue = build_queue(&config, Arc::clone(&notifier))?;
        Ok(Self {
            config,
            records,
            notifier,
            queue,
        })
    }

    /// Services without a database; link records live in memory.
    pub fn in_memory(config: Config) -> anyhow::Result<Self> {
        let notifier = build_notifier(&config)?;
        let queue = build_queue(&config, Arc::clone(&notifier))?;
        Ok(Self {
            config,
            records: Arc::new(InMemoryLinkRecordRepository::new()),
            notifier,
            queue,
        })
    }

    pub fn engines(&self, batches: Option<BatchHandle>) -> anyhow::Result<EngineSet> {
        let engines = EngineSet::from_monitors(
            &self.config.monitors,
            self.config.obfuscation,
            Arc::clone(&self.records),
            Arc::clone(&self.notifier),
            batches,
        )
        .context("failed to build link engines")?;
        if engines.is_empty() {
            bail!("no enabled monitors configured");
        }
        Ok(engines)
    }

    pub fn queue(&self) -> anyhow::Result<&Arc<SyncTriggerQueue>> {
        self.queue
            .as_ref()
            .context("no sync job is configured ([sync_job] section)")
    }
}

async fn connect_records(config: &Config) -> anyhow::Result<Arc<dyn LinkRecordRepository>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("DATABASE_URL not configured; link records are kept in memory and lost on exit");
        return Ok(Arc::new(InMemoryLinkRecordRepository::new()));
    };
    let repo = connect_postgres(url).await?;
    repo.migrate().await.context("database migration failed")?;
    Ok(Arc::new(repo))
}

pub async fn connect_postgres(url: &str) -> anyhow::Result<PostgresLinkRecordRepository> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;
    info!("Successfully connected to PostgreSQL");
    Ok(PostgresLinkRecordRepository::new(pool))
}

fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notification.webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(url.clone(), config.notification.request_timeout)
                .context("failed to build webhook notifier")?;
            info!(host = url.host_str().unwrap_or_default(), "webhook notifications enabled");
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

fn build_queue(
    config: &Config,
    notifier: Arc<dyn Notifier>,
) -> anyhow::Result<Option<Arc<SyncTriggerQueue>>> {
    let Some(settings) = &config.sync_job else {
        info!("no sync job configured; batches are only reported");
        return Ok(None);
    };
    let client = TaoSyncClient::new(settings).context("failed to build sync job client")?;
    info!(url = %settings.url, jobs = ?settings.job_ids, "sync job trigger enabled");
    Ok(Some(Arc::new(SyncTriggerQueue::new(
        Arc::new(client),
        notifier,
        settings.check_interval,
    ))))
}

/// Watches until `shutdown` resolves, then stops watchers, flushes the open batch and stops the poller.
pub async fn run_until<F>(services: Services, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let sink = Arc::new(TriggeringSink::new(
        services.queue.clone(),
        Arc::clone(&services.notifier),
    ));
    let (aggregator, batches) = BatchAggregator::spawn(services.config.batch, sink);
    let engines = services.engines(Some(batches))?;

    if let Some(queue) = &services.queue {
        queue.start().await;
    }
    let watcher = ChangeWatcher::start(&engines, services.config.watch)
        .await
        .context("failed to start file watchers")?;
    info!(sources = watcher.watched_sources().len(), "linkmirror running");

    shutdown.await;
    info!("shutting down");

    watcher.shutdown().await;
    drop(engines);
    aggregator.shutdown().await;
    if let Some(queue) = &services.queue {
        queue.stop().await;
    }
    info!("shutdown complete");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Resolves a CLI path the same way configured paths are resolved.
pub fn absolute_source(path: &Path) -> anyhow::Result<std::path::PathBuf> {
    std::path::absolute(path).with_context(|| format!("cannot resolve {}", path.display()))
}
