//! Plain-text notifications about batches, failures and triggers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::batch::BatchSummary;
use crate::error::{LinkError, Result};

/// Delivers a titled plain-text message somewhere a human will see it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "notification");
        Ok(())
    }
}

/// Form-encoded `title` / `desp` POST, as accepted by ServerChan-style push gateways.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LinkError::Notification(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url.clone())
            .form(&[("title", title), ("desp", body)])
            .send()
            .await
            .map_err(|e| LinkError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Notification(format!(
                "webhook responded with {status}"
            )));
        }
        Ok(())
    }
}

/// Message builders. Each returns `(title, body)`.
pub mod messages {
    use super::*;

    const MAX_LISTED_FILES: usize = 20;

    pub fn batch_summary(summary: &BatchSummary) -> (String, String) {
        let count = summary.file_count();
        let mut body = format!(
            "{count} file(s) linked between {} and {}.\n",
            summary.started_at.format("%Y-%m-%d %H:%M:%S"),
            summary.last_event_at.format("%H:%M:%S"),
        );
        for entry in summary.entries.iter().take(MAX_LISTED_FILES) {
            body.push_str(&format!(
                "\n- {} -> {}",
                entry.file_name,
                entry.target_labels.join(", ")
            ));
        }
        if count > MAX_LISTED_FILES {
            body.push_str(&format!("\n... and {} more", count - MAX_LISTED_FILES));
        }
        (format!("Linked {count} file(s)"), body)
    }

    pub fn link_failed(file_name: &str, failures: &[(String, String)]) -> (String, String) {
        let body = failures
            .iter()
            .map(|(target, reason)| format!("- {target}: {reason}"))
            .collect::<Vec<_>>()
            .join("\n");
        (format!("Link failed: {file_name}"), body)
    }

    pub fn full_sync(total: usize, linked: usize, skipped: usize, failed: usize) -> (String, String) {
        (
            "Full sync complete".to_string(),
            format!("Scanned {total} file(s): {linked} linked, {skipped} skipped, {failed} failed."),
        )
    }

    pub fn trigger_queued(batch_count: u32, file_count: u64) -> (String, String) {
        (
            "Sync job busy".to_string(),
            format!(
                "The sync job is running; {batch_count} batch(es) covering {file_count} file(s) are queued."
            ),
        )
    }

    pub fn queued_trigger_fired(batch_count: u32, file_count: u64) -> (String, String) {
        (
            "Queued sync started".to_string(),
            format!("Started the sync job for {batch_count} queued batch(es), {file_count} file(s)."),
        )
    }

    pub fn triggered(file_count: u64, jobs_started: usize) -> (String, String) {
        (
            "Sync started".to_string(),
            format!("Started {jobs_started} sync job(s) for {file_count} file(s)."),
        )
    }
}
