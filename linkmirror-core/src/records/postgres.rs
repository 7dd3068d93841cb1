use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{LinkRecord, LinkRecordRepository, Page, TargetState};
use crate::error::{LinkError, Result};

/// Embedded schema for the record table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone, Debug)]
pub struct PostgresLinkRecordRepository {
    pool: PgPool,
}

impl PostgresLinkRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(self.pool()).await?;
        Ok(())
    }
}

fn encode_target_state(state: &BTreeMap<String, TargetState>) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

/// A row whose `target_state` no longer matches [`TargetState`] is a
/// serialization error, not a database one.
fn decode_target_state(value: Value) -> Result<BTreeMap<String, TargetState>> {
    Ok(serde_json::from_value(value)?)
}

fn record_from_row(row: &PgRow) -> Result<LinkRecord> {
    let size: i64 = row.try_get("size_bytes")?;
    let target_state = decode_target_state(row.try_get("target_state")?)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(LinkRecord {
        source_path: row.try_get("source_path")?,
        display_name: row.try_get("display_name")?,
        size_bytes: u64::try_from(size).unwrap_or_default(),
        target_state,
        updated_at,
    })
}

#[async_trait]
impl LinkRecordRepository for PostgresLinkRecordRepository {
    async fn get_by_source_path(&self, source_path: &str) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(
            r#"
            SELECT source_path, display_name, size_bytes, target_state, updated_at
            FROM link_records
            WHERE source_path = $1
            "#,
        )
        .bind(source_path)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| LinkError::Internal(format!("Failed to load link record: {}", e)))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &LinkRecord) -> Result<()> {
        let size = i64::try_from(record.size_bytes).unwrap_or(i64::MAX);
        let target_state = encode_target_state(&record.target_state)?;
        sqlx::query(
            r#"
            INSERT INTO link_records (
                source_path, display_name, size_bytes, target_state, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_path) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                size_bytes = EXCLUDED.size_bytes,
                target_state = EXCLUDED.target_state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.source_path)
        .bind(&record.display_name)
        .bind(size)
        .bind(target_state)
        .bind(record.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| LinkError::Internal(format!("Failed to upsert link record: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, source_path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM link_records WHERE source_path = $1")
            .bind(source_path)
            .execute(self.pool())
            .await
            .map_err(|e| LinkError::Internal(format!("Failed to delete link record: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, page: Page) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT source_path, display_name, size_bytes, target_state, updated_at
            FROM link_records
            ORDER BY source_path ASC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(i64::try_from(page.offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await
        .map_err(|e| LinkError::Internal(format!("Failed to list link records: {}", e)))?;

        rows.iter().map(record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use anyhow::Result;
    use serde_json::json;

    use crate::materialize::LinkMethod;

    #[test]
    fn target_state_column_decodes_stored_json() -> Result<()> {
        let state = decode_target_state(json!({
            "cloud": {
                "resolved_path": "/dst/Movies/Heat (1995)/Heat.mkv",
                "method": "copy",
                "materialized_at": "2024-05-01T08:00:00Z"
            }
        }))?;
        assert_eq!(state["cloud"].resolved_path, PathBuf::from("/dst/Movies/Heat (1995)/Heat.mkv"));
        assert_eq!(state["cloud"].method, LinkMethod::Copy);
        assert_eq!(encode_target_state(&state)?["cloud"]["method"], "copy");
        Ok(())
    }

    #[test]
    fn malformed_target_state_is_a_serialization_error() {
        let err = decode_target_state(json!({ "cloud": { "method": "symlink" } })).unwrap_err();
        assert!(matches!(err, LinkError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
