//! # linkmirror core
//!
//! Mirrors source media trees into one or more target trees with hardlinks,
//! optionally obfuscating directory and file names on the way, and tells a
//! downstream sync job once a burst of new files has settled.
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL-backed link records (SQLx)
//! - `fs-watch`: recursive source watching via `notify`
//!
//! ## Architecture
//!
//! - [`obfuscate`]: deterministic per-character name mangling
//! - [`materialize`]: target path resolution and hardlink/copy placement
//! - [`engine`]: per-monitor orchestration shared by the watcher, full sync and retries
//! - [`watch`]: filesystem events to settled files
//! - [`batch`]: sliding-window aggregation of linked files
//! - [`trigger`]: single-flight triggering of the downstream sync job
//! - [`records`]: persisted per-source link state
//! - [`notifier`]: plain-text notifications
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use linkmirror_core::{
//!     EngineSet, InMemoryLinkRecordRepository, LogNotifier, MonitorDefinition,
//!     ObfuscationSettings, TargetDefinition,
//! };
//!
//! async fn mirror_once() -> linkmirror_core::Result<()> {
//!     let monitor = MonitorDefinition::new("/media/incoming")
//!         .with_target(TargetDefinition::new("/mnt/cloud").with_label("cloud"));
//!     let engines = EngineSet::from_monitors(
//!         &[monitor],
//!         ObfuscationSettings::default(),
//!         Arc::new(InMemoryLinkRecordRepository::new()),
//!         Arc::new(LogNotifier),
//!         None,
//!     )?;
//!     let summary = engines.sync_all().await?;
//!     println!("linked {} files", summary.linked);
//!     Ok(())
//! }
//! ```

// TODO: Document the public types of each module
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Batch window aggregation
pub mod batch;
/// Monitor definitions and runtime settings
pub mod config;
/// Per-monitor link engine
pub mod engine;
/// Error types
pub mod error;
/// Target path resolution and link placement
pub mod materialize;
/// Media file classification and path helpers
pub mod media;
/// Notification delivery
pub mod notifier;
/// Name obfuscation
pub mod obfuscate;
/// Link record persistence
pub mod records;
/// Downstream sync job triggering
pub mod trigger;
/// Source tree watching
#[cfg(feature = "fs-watch")]
#[cfg_attr(docsrs, doc(cfg(feature = "fs-watch")))]
pub mod watch;

pub use batch::{BatchAggregator, BatchEntry, BatchHandle, BatchSink, BatchSummary};
pub use config::{
    BatchSettings, FileNaming, MonitorDefinition, ObfuscationSettings, SyncJobSettings,
    TargetDefinition, WatchSettings,
};
pub use engine::{
    DeletionReport, EngineSet, FileReport, LinkEngine, SkipReason, SyncSummary, TargetPolicy,
    TargetReport, TemplateSummary,
};
pub use error::{LinkError, Result};
pub use materialize::{LinkMaterializer, LinkMethod, MaterializeOutcome};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use obfuscate::{Algorithm, NameObfuscator, ObfuscationDecision};
#[cfg(feature = "database")]
pub use records::PostgresLinkRecordRepository;
pub use records::{InMemoryLinkRecordRepository, LinkRecord, LinkRecordRepository, TargetState};
pub use trigger::{
    QueueStatus, SyncJobClient, SyncTriggerQueue, TaoSyncClient, TriggerError, TriggerOutcome,
    TriggeringSink,
};
#[cfg(feature = "fs-watch")]
pub use watch::ChangeWatcher;
