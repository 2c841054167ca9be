//! Archive metadata persistence (spec.md §4.6). The gzip blobs themselves
//! live in object storage via the `archive` crate's `ObjectStore`; this
//! table only tracks what was archived and where.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::{ArchiveMetadataRow, ExecutionRow}, DbError};

pub async fn insert_metadata(pool: &PgPool, row: &ArchiveMetadataRow) -> Result<(), DbError> {
    sqlx::query(
        r#"INSERT INTO archive_metadata (id, bucket_date, execution_count, storage_key, created_at)
           VALUES ($1,$2,$3,$4,$5)"#,
    )
    .bind(row.id)
    .bind(row.bucket_date)
    .bind(row.execution_count)
    .bind(&row.storage_key)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_metadata(pool: &PgPool) -> Result<Vec<ArchiveMetadataRow>, DbError> {
    let rows: Vec<ArchiveMetadataRow> = sqlx::query_as(
        "SELECT id, bucket_date, execution_count, storage_key, created_at FROM archive_metadata ORDER BY bucket_date DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn metadata_older_than(pool: &PgPool, before: NaiveDate) -> Result<Vec<ArchiveMetadataRow>, DbError> {
    let rows: Vec<ArchiveMetadataRow> = sqlx::query_as(
        "SELECT id, bucket_date, execution_count, storage_key, created_at FROM archive_metadata WHERE bucket_date < $1",
    )
    .bind(before)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_metadata(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM archive_metadata WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Select the next batch of executions eligible for archival, ordered by
/// id so batches are stable across repeated calls (spec.md §4.6: batches
/// of 1000).
pub async fn select_archivable_batch(
    pool: &PgPool,
    before: DateTime<Utc>,
    batch_size: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(
        r#"SELECT id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
                  execution_time_ms, input, output, error, error_code, retry_count, retry_of,
                  creator_id, idempotency_key, created_at
           FROM executions
           WHERE created_at < $1 AND status IN ('completed','failed','cancelled','timeout')
           ORDER BY id ASC
           LIMIT $2"#,
    )
    .bind(before)
    .bind(batch_size)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete the archived executions and everything that references them
/// (`node_executions`, `state_transitions`, `execution_metrics`) in one
/// transaction, child tables first, so the `executions` delete never trips
/// the foreign keys those tables hold (spec.md §4.6: "deletes the archived
/// rows (and their node-executions) transactionally").
pub async fn delete_archived(pool: &PgPool, ids: &[Uuid]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM execution_metrics WHERE execution_id = ANY($1)")
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM state_transitions WHERE execution_id = ANY($1)")
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM node_executions WHERE execution_id = ANY($1)")
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM executions WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}

pub async fn reinsert(pool: &PgPool, row: &ExecutionRow) -> Result<(), DbError> {
    super::executions::create_execution(pool, row).await.map(|_| ())
}
