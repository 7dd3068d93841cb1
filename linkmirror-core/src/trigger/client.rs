//! HTTP client for the downstream sync job.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncJobSettings;

const OK_CODE: i64 = 200;
const BUSY_CODE: i64 = 500;
const RUNNING_STATUS: i64 = 1;
/// Substrings of a rejection message meaning "already running".
const BUSY_MARKERS: &[&str] = &["执行中", "running"];

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Job {job_id} rejected the trigger: {message}")]
    Rejected { job_id: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No sync jobs configured")]
    NoJobs,
}

/// Result of asking one job to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTrigger {
    Started,
    /// The job was already running; nothing was started.
    Running,
}

/// The external long-running sync job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncJobClient: Send + Sync {
    fn job_ids(&self) -> Vec<i64>;

    async fn login(&self) -> Result<(), TriggerError>;

    /// True when any configured job is currently running.
    async fn is_job_running(&self) -> Result<bool, TriggerError>;

    async fn trigger(&self, job_id: i64) -> Result<JobTrigger, TriggerError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct JobPage {
    #[serde(rename = "dataList", default)]
    data_list: Vec<JobRow>,
}

#[derive(Debug, Deserialize)]
struct JobRow {
    #[serde(default)]
    status: Option<i64>,
}

/// Cookie-session client for a TaoSync-compatible job server.
pub struct TaoSyncClient {
    base: Url,
    username: String,
    password: String,
    job_ids: Vec<i64>,
    http: reqwest::Client,
    logged_in: AtomicBool,
    login_lock: Mutex<()>,
}

impl std::fmt::Debug for TaoSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaoSyncClient")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .field("job_ids", &self.job_ids)
            .field("logged_in", &self.logged_in.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TaoSyncClient {
    pub fn new(settings: &SyncJobSettings) -> Result<Self, TriggerError> {
        let base = Url::parse(settings.url.trim_end_matches('/'))
            .map_err(|e| TriggerError::UnexpectedResponse(format!("invalid sync job URL: {e}")))?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            base,
            username: settings.username.clone(),
            password: settings.password.clone(),
            job_ids: settings.job_ids.clone(),
            http,
            logged_in: AtomicBool::new(false),
            login_lock: Mutex::new(()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    async fn ensure_login(&self) -> Result<(), TriggerError> {
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.login_lock.lock().await;
        if self.logged_in.load(Ordering::Acquire) {
            return Ok(());
        }
        self.login().await
    }

    /// Sends a request, logging in first and once more on an auth rejection.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Envelope<T>, TriggerError> {
        self.ensure_login().await?;
        let mut retried = false;
        loop {
            let mut request = self.http.request(method.clone(), self.endpoint(path));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!("sync job session expired, logging in again");
                self.logged_in.store(false, Ordering::Release);
                self.login().await?;
                retried = true;
                continue;
            }

            let text = response.text().await?;
            return serde_json::from_str(&text).map_err(|e| {
                TriggerError::UnexpectedResponse(format!("{status} from {path}: {e}: {text}"))
            });
        }
    }
}

#[async_trait]
impl SyncJobClient for TaoSyncClient {
    fn job_ids(&self) -> Vec<i64> {
        self.job_ids.clone()
    }

    async fn login(&self) -> Result<(), TriggerError> {
        let response = self
            .http
            .post(self.endpoint("/svr/noAuth/login"))
            .json(&json!({ "userName": self.username, "passwd": self.password }))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Option<Envelope<Value>> = serde_json::from_str(&text).ok();
        match envelope {
            Some(env) if status.is_success() && env.code == OK_CODE => {
                self.logged_in.store(true, Ordering::Release);
                info!("logged in to sync job server");
                Ok(())
            }
            Some(env) => Err(TriggerError::LoginFailed(
                env.msg.unwrap_or_else(|| format!("code {}", env.code)),
            )),
            None => Err(TriggerError::LoginFailed(format!("{status}: {text}"))),
        }
    }

    async fn is_job_running(&self) -> Result<bool, TriggerError> {
        for job_id in &self.job_ids {
            let envelope: Envelope<JobPage> = self
                .call(
                    Method::GET,
                    "/svr/job",
                    &[("id", job_id.to_string()), ("current", "1".to_string())],
                    None,
                )
                .await?;
            if envelope.code != OK_CODE {
                return Err(TriggerError::UnexpectedResponse(format!(
                    "job {job_id} status query returned code {}: {}",
                    envelope.code,
                    envelope.msg.unwrap_or_default()
                )));
            }
            let running = envelope
                .data
                .and_then(|page| page.data_list.into_iter().next())
                .and_then(|row| row.status)
                == Some(RUNNING_STATUS);
            if running {
                debug!(job_id, "sync job is running");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn trigger(&self, job_id: i64) -> Result<JobTrigger, TriggerError> {
        let body = json!({ "id": job_id, "pause": null });
        let envelope: Envelope<Value> = self.call(Method::PUT, "/svr/job", &[], Some(&body)).await?;
        interpret_trigger(job_id, envelope.code, envelope.msg)
    }
}

fn interpret_trigger(
    job_id: i64,
    code: i64,
    msg: Option<String>,
) -> Result<JobTrigger, TriggerError> {
    let message = msg.unwrap_or_default();
    if code == OK_CODE {
        info!(job_id, "sync job started");
        return Ok(JobTrigger::Started);
    }
    let lower = message.to_lowercase();
    if code == BUSY_CODE && BUSY_MARKERS.iter().any(|m| lower.contains(m)) {
        debug!(job_id, "sync job already running");
        return Ok(JobTrigger::Running);
    }
    warn!(job_id, code, message = %message, "sync job rejected trigger");
    Err(TriggerError::Rejected { job_id, message })
}
