//! Trigger persistence (spec.md §4.7). `kind` is stored as JSONB so the
//! polymorphic `TriggerKind` enum round-trips without a table per variant.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::TriggerRow, DbError};

pub async fn create(pool: &PgPool, row: &TriggerRow) -> Result<TriggerRow, DbError> {
    let inserted: TriggerRow = sqlx::query_as(
        r#"INSERT INTO triggers (id, workflow_id, kind, status, last_fired_at, fire_count, error_count, created_at)
           VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
           RETURNING id, workflow_id, kind, status, last_fired_at, fire_count, error_count, created_at"#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.kind)
    .bind(&row.status)
    .bind(row.last_fired_at)
    .bind(row.fire_count)
    .bind(row.error_count)
    .bind(row.created_at)
    .fetch_one(pool)
    .await?;
    Ok(inserted)
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<TriggerRow>, DbError> {
    let rows: Vec<TriggerRow> = sqlx::query_as(
        "SELECT id, workflow_id, kind, status, last_fired_at, fire_count, error_count, created_at FROM triggers WHERE status = 'active'",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_webhook(pool: &PgPool, path: &str, method: &str) -> Result<Vec<TriggerRow>, DbError> {
    let rows: Vec<TriggerRow> = sqlx::query_as(
        r#"SELECT id, workflow_id, kind, status, last_fired_at, fire_count, error_count, created_at
           FROM triggers
           WHERE status = 'active' AND kind->>'type' = 'webhook'
             AND kind->>'path' = $1 AND kind->>'method' = $2"#,
    )
    .bind(path)
    .bind(method)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn record_fire(pool: &PgPool, id: Uuid, fired_at: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query("UPDATE triggers SET last_fired_at = $1, fire_count = fire_count + 1 WHERE id = $2")
        .bind(fired_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_error(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE triggers SET error_count = error_count + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: &str) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE triggers SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
