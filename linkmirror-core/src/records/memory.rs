use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LinkRecord, LinkRecordRepository, Page};
use crate::error::Result;

/// Process-local record store. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryLinkRecordRepository {
    rows: RwLock<BTreeMap<String, LinkRecord>>,
}

impl InMemoryLinkRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl fmt::Debug for InMemoryLinkRecordRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryLinkRecordRepository");
        match self.rows.try_read() {
            Ok(rows) => debug.field("rows", &rows.len()),
            Err(_) => debug.field("rows", &"<locked>"),
        };
        debug.finish()
    }
}

#[async_trait]
impl LinkRecordRepository for InMemoryLinkRecordRepository {
    async fn get_by_source_path(&self, source_path: &str) -> Result<Option<LinkRecord>> {
        Ok(self.rows.read().await.get(source_path).cloned())
    }

    async fn upsert(&self, record: &LinkRecord) -> Result<()> {
        self.rows
            .write()
            .await
            .insert(record.source_path.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, source_path: &str) -> Result<bool> {
        Ok(self.rows.write().await.remove(source_path).is_some())
    }

    async fn list(&self, page: Page) -> Result<Vec<LinkRecord>> {
        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(self
            .rows
            .read()
            .await
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
