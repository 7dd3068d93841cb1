use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use linkmirror_config::{Config, ConfigLoader, EnvConfig};
use linkmirror_core::ObfuscationSettings;
use linkmirror_server::app::{self, Services};
use linkmirror_server::commands;
use tempfile::{TempDir, tempdir};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("in/Movies/Heat (1995)"))?;
        fs::write(
            dir.path().join("in/Movies/Heat (1995)/Heat.1995.mkv"),
            b"not really a movie",
        )?;
        fs::write(dir.path().join("in/Movies/Heat (1995)/notes.txt"), b"x")?;
        Ok(Self { dir })
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    fn config(&self, extra: &str) -> Result<Config> {
        let body = format!(
            "[[monitors]]\nsource = \"{}\"\ntargets = [\"{}\", {{ path = \"{}\", label = \"cloud\" }}]\n{extra}",
            self.path("in").display(),
            self.path("local").display(),
            self.path("cloud").display(),
        );
        let file = self.path("linkmirror.toml");
        fs::write(&file, body)?;
        Ok(ConfigLoader::new()
            .with_config_path(&file)
            .load_with_env(EnvConfig::default())?
            .config)
    }
}

fn exists(path: &Path) -> bool {
    path.is_file()
}

fn materialized_labels(report: &serde_json::Value) -> Vec<String> {
    report["targets"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|t| t["outcome"]["status"] == "materialized")
        .filter_map(|t| t["label"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn sync_all_links_media_on_every_target() -> Result<()> {
    let ws = Workspace::new()?;
    let services = Services::in_memory(ws.config("")?)?;

    let summary = commands::sync_all(&services).await?;
    assert_eq!(summary["total_files"], 1);
    assert_eq!(summary["linked"], 2);
    assert_eq!(summary["failed"], 0);
    assert!(exists(&ws.path("local/Movies/Heat (1995)/Heat.1995.mkv")));
    assert!(exists(&ws.path("cloud/Movies/Heat (1995)/Heat.1995.mkv")));
    assert!(!ws.path("local/Movies/Heat (1995)/notes.txt").exists());

    let again = commands::sync_all(&services).await?;
    assert_eq!(again["linked"], 0);
    Ok(())
}

#[tokio::test]
async fn retry_then_delete_round_trip() -> Result<()> {
    let ws = Workspace::new()?;
    let services = Services::in_memory(ws.config("")?)?;
    let source = ws.path("in/Movies/Heat (1995)/Heat.1995.mkv");

    let report = commands::retry(&services, &source, Some("cloud")).await?;
    assert_eq!(materialized_labels(&report), vec!["cloud".to_string()]);
    assert!(exists(&ws.path("cloud/Movies/Heat (1995)/Heat.1995.mkv")));
    assert!(!ws.path("local/Movies").exists());

    let deleted = commands::delete(&services, &source).await?;
    assert_eq!(deleted["removed_files"].as_array().map(Vec::len), Some(1));
    assert!(!ws.path("cloud/Movies/Heat (1995)/Heat.1995.mkv").exists());
    assert!(exists(&source));
    Ok(())
}

#[tokio::test]
async fn resync_relinks_a_removed_target_file() -> Result<()> {
    let ws = Workspace::new()?;
    let services = Services::in_memory(ws.config("")?)?;
    let source = ws.path("in/Movies/Heat (1995)/Heat.1995.mkv");
    commands::sync_all(&services).await?;

    fs::remove_file(ws.path("local/Movies/Heat (1995)/Heat.1995.mkv"))?;
    let report = commands::resync(&services, &source).await?;
    assert_eq!(materialized_labels(&report), vec![ws.path("local").display().to_string()]);
    assert!(exists(&ws.path("local/Movies/Heat (1995)/Heat.1995.mkv")));
    Ok(())
}

#[tokio::test]
async fn trigger_needs_a_sync_job() -> Result<()> {
    let ws = Workspace::new()?;
    let services = Services::in_memory(ws.config("")?)?;
    let err = commands::trigger(&services, false).await.unwrap_err();
    assert!(err.to_string().contains("no sync job"), "{err}");
    Ok(())
}

#[tokio::test]
async fn disabled_monitors_leave_nothing_to_run() -> Result<()> {
    let ws = Workspace::new()?;
    let mut config = ws.config("")?;
    for monitor in &mut config.monitors {
        monitor.enabled = false;
    }
    let services = Services::in_memory(config)?;
    assert!(services.engines(None).is_err());
    Ok(())
}

#[test]
fn obfuscate_reports_each_scheme() {
    let rows = commands::obfuscate(
        &["Heat (1995)".to_string(), "三体".to_string()],
        ObfuscationSettings::default(),
    );
    let rows = rows.as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["obfuscated"]["algorithm"], "literal");
    assert_eq!(rows[0]["obfuscated"]["obfuscated"], "Heat (1995)");
    assert_ne!(rows[1]["obfuscated"]["obfuscated"], "三体");
    assert!(
        rows[1]["with_initial"]["obfuscated"]
            .as_str()
            .is_some_and(|name| name.starts_with("S "))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_until_shuts_down_cleanly() -> Result<()> {
    let ws = Workspace::new()?;
    let config = ws.config("[watch]\nsettle_delay = \"50ms\"\n[batch]\nquiet_window = \"100ms\"\n")?;
    let services = Services::in_memory(config)?;

    let shutdown = tokio::time::sleep(Duration::from_millis(200));
    tokio::time::timeout(Duration::from_secs(10), app::run_until(services, shutdown)).await??;
    Ok(())
}
