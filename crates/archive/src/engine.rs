//! Cold-storage operations (spec.md §4.6): move old executions out of the
//! hot `executions` table into gzip-compressed blobs, and let callers read
//! through both tiers without caring which one a given record lives in.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use db::models::{ArchiveMetadataRow, ExecutionRow};
use db::DbPool;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;
use uuid::Uuid;

use crate::error::ArchiveError;
use crate::models::{ArchiveBlob, ArchiveFilter};
use crate::object_store::ObjectStore;

const BATCH_SIZE: i64 = 1000;

pub struct ArchiveEngine {
    pool: DbPool,
    store: Arc<dyn ObjectStore>,
}

impl ArchiveEngine {
    pub fn new(pool: DbPool, store: Arc<dyn ObjectStore>) -> Self {
        Self { pool, store }
    }

    /// Move every terminal execution created before `before` into cold
    /// storage, one blob per calendar date, in batches of 1000. Returns the
    /// number of executions archived.
    pub async fn archive_executions(&self, before: DateTime<Utc>) -> Result<usize, ArchiveError> {
        let mut archived = 0usize;
        loop {
            let batch = db::repository::archive::select_archivable_batch(&self.pool, before, BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }

            let mut by_date: std::collections::BTreeMap<NaiveDate, Vec<ExecutionRow>> = std::collections::BTreeMap::new();
            for row in batch {
                by_date.entry(row.created_at.date_naive()).or_default().push(row);
            }

            for (date, rows) in by_date {
                let blob = ArchiveBlob::new(Uuid::new_v4(), date, rows);
                let ids: Vec<Uuid> = blob.executions.iter().map(|row| row.id).collect();
                let count = blob.count as i64;
                let key = blob.storage_key();

                let bytes = compress(&blob)?;
                self.store.put(&key, bytes).await?;

                db::repository::archive::insert_metadata(
                    &self.pool,
                    &ArchiveMetadataRow {
                        id: blob.id,
                        bucket_date: date,
                        execution_count: count,
                        storage_key: key,
                        created_at: Utc::now(),
                    },
                )
                .await?;

                let removed = db::repository::archive::delete_archived(&self.pool, &ids).await?;
                archived += removed as usize;
                info!(date = %date, removed, "archived execution batch");
            }
        }
        Ok(archived)
    }

    /// Fetch a single archived execution by id, scanning blob metadata
    /// newest-first. Cold reads are expected to be rare and are not cached.
    pub async fn retrieve(&self, execution_id: Uuid) -> Result<ExecutionRow, ArchiveError> {
        for metadata in db::repository::archive::list_metadata(&self.pool).await? {
            let blob = self.load_blob(&metadata).await?;
            if let Some(row) = blob.executions.into_iter().find(|row| row.id == execution_id) {
                return Ok(row);
            }
        }
        Err(ArchiveError::NotFound(execution_id))
    }

    /// Query cold storage only, applying `filter` across every blob. Not
    /// cheap — callers that also want hot rows should use
    /// `get_unified_executions` instead of combining the two themselves.
    pub async fn query_archived(&self, filter: &ArchiveFilter) -> Result<Vec<ExecutionRow>, ArchiveError> {
        let mut matched = Vec::new();
        for metadata in db::repository::archive::list_metadata(&self.pool).await? {
            let blob = self.load_blob(&metadata).await?;
            matched.extend(filter.apply(blob.executions));
        }
        Ok(matched)
    }

    /// Merge hot-table rows with matching cold-storage rows, newest first.
    pub async fn get_unified_executions(&self, filter: &db::repository::executions::ExecutionFilter) -> Result<Vec<ExecutionRow>, ArchiveError> {
        let mut rows = db::repository::executions::list_executions(&self.pool, filter).await?;

        let archive_filter = ArchiveFilter {
            workflow_id: filter.workflow_id,
            status: filter.status.clone(),
            since: filter.since,
            until: filter.until,
        };
        rows.extend(self.query_archived(&archive_filter).await?);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    /// Copy an archived execution back into the hot `executions` table.
    /// Does not remove it from cold storage — the blob it came from may
    /// still hold other executions that weren't asked for.
    pub async fn restore_to_hot_storage(&self, execution_id: Uuid) -> Result<ExecutionRow, ArchiveError> {
        let row = self.retrieve(execution_id).await?;
        db::repository::archive::reinsert(&self.pool, &row).await?;
        Ok(row)
    }

    /// Permanently delete archive blobs (and their metadata) older than
    /// `before`. There is no further tier after this one.
    pub async fn cleanup_old_archives(&self, before: NaiveDate) -> Result<usize, ArchiveError> {
        let stale = db::repository::archive::metadata_older_than(&self.pool, before).await?;
        let mut removed = 0usize;
        for metadata in stale {
            self.store.delete(&metadata.storage_key).await?;
            db::repository::archive::delete_metadata(&self.pool, metadata.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn load_blob(&self, metadata: &ArchiveMetadataRow) -> Result<ArchiveBlob, ArchiveError> {
        let bytes = self.store.get(&metadata.storage_key).await?;
        decompress(&bytes)
    }
}

fn compress(blob: &ArchiveBlob) -> Result<Vec<u8>, ArchiveError> {
    let json = serde_json::to_vec(blob)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json).map_err(|e| ArchiveError::Storage(e.to_string()))?;
    encoder.finish().map_err(|e| ArchiveError::Storage(e.to_string()))
}

fn decompress(bytes: &[u8]) -> Result<ArchiveBlob, ArchiveError> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json).map_err(|e| ArchiveError::Storage(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trips_through_compression() {
        let blob = ArchiveBlob::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), Vec::new());
        let compressed = compress(&blob).unwrap();
        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored.id, blob.id);
        assert_eq!(restored.date, blob.date);
    }
}
