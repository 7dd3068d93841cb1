//! Persisted per-source-file materialisation state.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::materialize::LinkMethod;

pub use memory::InMemoryLinkRecordRepository;
#[cfg(feature = "database")]
pub use postgres::PostgresLinkRecordRepository;

/// Where a source file landed on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub resolved_path: PathBuf,
    pub method: LinkMethod,
    pub materialized_at: DateTime<Utc>,
}

/// One row per source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source_path: String,
    pub display_name: String,
    pub size_bytes: u64,
    /// Keyed by target id; absent means not yet materialised there.
    pub target_state: BTreeMap<String, TargetState>,
    pub updated_at: DateTime<Utc>,
}

impl LinkRecord {
    pub fn new(source_path: impl Into<String>, display_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            source_path: source_path.into(),
            display_name: display_name.into(),
            size_bytes,
            target_state: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn state_for(&self, target_id: &str) -> Option<&TargetState> {
        self.target_state.get(target_id)
    }

    /// Records (or replaces) the state for `target_id`.
    pub fn record_target(&mut self, target_id: impl Into<String>, state: TargetState) {
        self.updated_at = state.materialized_at.max(self.updated_at);
        self.target_state.insert(target_id.into(), state);
    }
}

/// Page request for whole-store scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Repository for [`LinkRecord`]s, keyed by source path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRecordRepository: Send + Sync {
    async fn get_by_source_path(&self, source_path: &str) -> Result<Option<LinkRecord>>;

    /// Inserts or replaces the row for `record.source_path`.
    async fn upsert(&self, record: &LinkRecord) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, source_path: &str) -> Result<bool>;

    /// Records ordered by source path.
    async fn list(&self, page: Page) -> Result<Vec<LinkRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn recording_a_target_replaces_previous_state() {
        let mut record = LinkRecord::new("/src/a.mkv", "a", 10);
        let first = TargetState {
            resolved_path: PathBuf::from("/dst/a.mkv"),
            method: LinkMethod::Hardlink,
            materialized_at: Utc::now(),
        };
        let second = TargetState {
            materialized_at: first.materialized_at + Duration::seconds(5),
            method: LinkMethod::Copy,
            ..first.clone()
        };

        record.record_target("/dst", first);
        record.record_target("/dst", second.clone());

        assert_eq!(record.target_state.len(), 1);
        assert_eq!(record.state_for("/dst"), Some(&second));
        assert_eq!(record.updated_at, second.materialized_at);
    }

    #[test]
    fn pages_advance_by_limit() {
        let page = Page::first(50).next().next();
        assert_eq!(page, Page { offset: 100, limit: 50 });
    }
}
