//! One-shot maintenance commands. Each returns a JSON value for the binary to print.

use std::path::Path;

use anyhow::Context;
use linkmirror_core::{NameObfuscator, ObfuscationSettings};
use serde_json::{Value, json};
use tracing::info;

use crate::app::{Services, absolute_source};

pub async fn sync_all(services: &Services) -> anyhow::Result<Value> {
    let engines = services.engines(None)?;
    let summary = engines.sync_all().await.context("full sync failed")?;
    Ok(serde_json::to_value(summary)?)
}

pub async fn retry(
    services: &Services,
    source: &Path,
    target: Option<&str>,
) -> anyhow::Result<Value> {
    let source = absolute_source(source)?;
    let engines = services.engines(None)?;
    let report = engines
        .retry(&source, target)
        .await
        .with_context(|| format!("retry failed for {}", source.display()))?;
    Ok(serde_json::to_value(report)?)
}

pub async fn resync(services: &Services, source: &Path) -> anyhow::Result<Value> {
    let source = absolute_source(source)?;
    let engines = services.engines(None)?;
    let report = engines
        .resync(&source)
        .await
        .with_context(|| format!("resync failed for {}", source.display()))?;
    Ok(serde_json::to_value(report)?)
}

pub async fn delete(services: &Services, source: &Path) -> anyhow::Result<Value> {
    let source = absolute_source(source)?;
    let engines = services.engines(None)?;
    let report = engines
        .delete_record(&source)
        .await
        .with_context(|| format!("delete failed for {}", source.display()))?;
    Ok(serde_json::to_value(report)?)
}

pub async fn link_templates(services: &Services) -> anyhow::Result<Value> {
    let engines = services.engines(None)?;
    let summary = engines
        .link_templates_all()
        .await
        .context("template linking failed")?;
    Ok(serde_json::to_value(summary)?)
}

/// Fires the sync job once and reports the queue state afterwards.
pub async fn trigger(services: &Services, force: bool) -> anyhow::Result<Value> {
    let queue = services.queue()?;
    let outcome = queue
        .trigger_now(0, force)
        .await
        .context("sync job trigger failed")?;
    info!(?outcome, "manual trigger");
    let status = queue.status().await;
    Ok(json!({ "outcome": outcome, "queue": status }))
}

/// Shows both obfuscation schemes for each name. Needs no configuration.
pub fn obfuscate(names: &[String], settings: ObfuscationSettings) -> Value {
    let obfuscator = NameObfuscator::new(settings);
    let rows: Vec<Value> = names
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "obfuscated": obfuscator.obfuscate(name),
                "with_initial": obfuscator.obfuscate_with_initial(name),
                "legacy": obfuscator.legacy(name),
            })
        })
        .collect();
    Value::Array(rows)
}
