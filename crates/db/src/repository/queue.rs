//! Durable mirror of the in-memory priority queue, plus the dead-letter
//! store (spec.md §4.2, §6 "Durable queue keys").
//!
//! The priority queue itself lives in-process (see the `queue` crate); this
//! module only persists enough to rebuild it after a restart: one row per
//! in-flight item (`queue:item:{id}`, TTL 24h) and a periodic snapshot per
//! tier (`queue:high` / `queue:normal` / `queue:low`), refreshed every 5s.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::{DeadLetterRow, QueueItemRow, QueueSnapshotRow}, DbError};

pub fn item_key(id: Uuid) -> String {
    format!("queue:item:{id}")
}

pub fn tier_key(priority: &str) -> String {
    format!("queue:{priority}")
}

pub async fn upsert_item(pool: &PgPool, row: &QueueItemRow) -> Result<(), DbError> {
    sqlx::query(
        r#"INSERT INTO queue_items (item_key, priority, payload, enqueued_at, expires_at)
           VALUES ($1,$2,$3,$4,$5)
           ON CONFLICT (item_key) DO UPDATE SET
             priority = EXCLUDED.priority, payload = EXCLUDED.payload,
             expires_at = EXCLUDED.expires_at"#,
    )
    .bind(&row.item_key)
    .bind(&row.priority)
    .bind(&row.payload)
    .bind(row.enqueued_at)
    .bind(row.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_item(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM queue_items WHERE item_key = $1")
        .bind(item_key(id))
        .execute(pool)
        .await?;
    Ok(())
}

/// Evict mirrored items past their 24h TTL; called by the 5s snapshot tick.
pub async fn evict_expired_items(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM queue_items WHERE expires_at < $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Overwrite one tier's snapshot (`queue:high|normal|low`), taken every 5s.
pub async fn write_snapshot(pool: &PgPool, priority: &str, items: serde_json::Value) -> Result<(), DbError> {
    sqlx::query(
        r#"INSERT INTO queue_snapshots (tier_key, items, taken_at)
           VALUES ($1,$2,$3)
           ON CONFLICT (tier_key) DO UPDATE SET items = EXCLUDED.items, taken_at = EXCLUDED.taken_at"#,
    )
    .bind(tier_key(priority))
    .bind(items)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Restore order on startup: high, then normal, then low.
pub async fn read_snapshots(pool: &PgPool) -> Result<Vec<QueueSnapshotRow>, DbError> {
    let rows: Vec<QueueSnapshotRow> = sqlx::query_as(
        r#"SELECT tier_key, items, taken_at FROM queue_snapshots
           WHERE tier_key IN ('queue:high', 'queue:normal', 'queue:low')
           ORDER BY CASE tier_key
             WHEN 'queue:high' THEN 0 WHEN 'queue:normal' THEN 1 ELSE 2 END"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// dead-letter queue
// ---------------------------------------------------------------------------

pub async fn dead_letter(pool: &PgPool, row: &DeadLetterRow) -> Result<(), DbError> {
    sqlx::query(
        r#"INSERT INTO dead_letters (id, request, error, retry_count, max_retries, created_at)
           VALUES ($1,$2,$3,$4,$5,$6)"#,
    )
    .bind(row.id)
    .bind(&row.request)
    .bind(&row.error)
    .bind(row.retry_count)
    .bind(row.max_retries)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_dead_letters(pool: &PgPool) -> Result<Vec<DeadLetterRow>, DbError> {
    let rows: Vec<DeadLetterRow> = sqlx::query_as(
        "SELECT id, request, error, retry_count, max_retries, created_at FROM dead_letters ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete dead letters older than the 7-day retention window.
pub async fn purge_dead_letters_before(pool: &PgPool, before: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM dead_letters WHERE created_at < $1")
        .bind(before)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
