use anyhow::Context;
use clap::Parser;
use linkmirror_config::{ConfigLoad, ConfigLoader, ConfigSource};
use linkmirror_server::app::{self, Services};
use linkmirror_server::cli::{Cli, Command, DbCommand};
use linkmirror_server::commands;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.take().unwrap_or(Command::Run) {
        Command::Obfuscate { names } => {
            // Works without a config file; falls back to default tuning.
            let settings = load_config(&cli)
                .map(|load| load.config.obfuscation)
                .unwrap_or_default();
            print_json(&commands::obfuscate(&names, settings))
        }
        Command::Db(DbCommand::Migrate) => run_db_migrate(&cli).await,
        Command::Run => {
            let services = connect(&cli).await?;
            app::run_until(services, app::shutdown_signal()).await
        }
        Command::SyncAll => {
            let services = connect(&cli).await?;
            print_json(&commands::sync_all(&services).await?)
        }
        Command::Retry { source, target } => {
            let services = connect(&cli).await?;
            print_json(&commands::retry(&services, &source, target.as_deref()).await?)
        }
        Command::Resync { source } => {
            let services = connect(&cli).await?;
            print_json(&commands::resync(&services, &source).await?)
        }
        Command::Delete { source } => {
            let services = connect(&cli).await?;
            print_json(&commands::delete(&services, &source).await?)
        }
        Command::Trigger { force } => {
            let services = connect(&cli).await?;
            print_json(&commands::trigger(&services, force).await?)
        }
        Command::LinkTemplates => {
            let services = connect(&cli).await?;
            print_json(&commands::link_templates(&services).await?)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    loader.load().context("failed to load configuration")
}

async fn connect(cli: &Cli) -> anyhow::Result<Services> {
    let load = load_config(cli)?;
    log_config(&load);
    Services::connect(load.config).await
}

fn log_config(load: &ConfigLoad) {
    let config = &load.config;
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match &config.metadata.source {
        ConfigSource::File(path) => info!(path = %path.display(), "configuration loaded"),
        ConfigSource::InlineJson => info!("configuration loaded from LINKMIRROR_CONFIG_JSON"),
        ConfigSource::Defaults => info!("no configuration file found; using defaults"),
    }
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    info!(
        monitors = config.enabled_monitors().count(),
        sync_job = config.sync_job.is_some(),
        database = config.database.url.is_some(),
        "runtime settings"
    );
}

async fn run_db_migrate(cli: &Cli) -> anyhow::Result<()> {
    let load = load_config(cli)?;
    log_config(&load);
    let url = load
        .config
        .database
        .url
        .context("DATABASE_URL must be set to run migrations")?;
    let repo = app::connect_postgres(&url).await?;
    repo.migrate()
        .await
        .context("failed to apply database migrations")?;
    info!("database migrations applied");
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
