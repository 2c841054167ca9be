//! Workflow CRUD, with optimistic-concurrency versioning.
//!
//! Every mutating call here runs against the runtime-checked `sqlx::query`/
//! `query_as` API rather than the compile-time `query!`/`query_as!` macros —
//! those macros need a live database (or a checked-in `.sqlx` offline cache)
//! to verify column types against at build time, and this workspace has
//! neither.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, models::WorkflowVersionRow, DbError};

/// Insert a new workflow definition and its first version snapshot, in one
/// transaction.
pub async fn create_workflow(
    pool: &PgPool,
    owner_id: Uuid,
    team_id: Option<Uuid>,
    name: &str,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let row: WorkflowRow = sqlx::query_as(
        r#"
        INSERT INTO workflows
            (id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at)
        VALUES ($1, $2, $3, $4, 1, false, $5, $6, $6, NULL)
        RETURNING id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(team_id)
    .bind(name)
    .bind(&definition)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO workflow_versions (workflow_id, version, snapshot, created_at)
           VALUES ($1, 1, $2, $3)"#,
    )
    .bind(id)
    .bind(&definition)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row: Option<WorkflowRow> = sqlx::query_as(
        r#"SELECT id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at
           FROM workflows WHERE id = $1 AND deleted_at IS NULL"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

pub async fn list_workflows(pool: &PgPool, owner_id: Option<Uuid>) -> Result<Vec<WorkflowRow>, DbError> {
    let rows: Vec<WorkflowRow> = match owner_id {
        Some(owner) => {
            sqlx::query_as(
                r#"SELECT id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at
                   FROM workflows WHERE owner_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC"#,
            )
            .bind(owner)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"SELECT id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at
                   FROM workflows WHERE deleted_at IS NULL ORDER BY created_at DESC"#,
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Update a workflow's definition, bumping its version and appending an
/// immutable version snapshot. Rejects the update with
/// `DbError::VersionMismatch` if `expected_version` no longer matches the
/// stored version (spec.md §7 `VERSION_MISMATCH`).
pub async fn update_workflow(
    pool: &PgPool,
    id: Uuid,
    expected_version: i64,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let row: Option<WorkflowRow> = sqlx::query_as(
        r#"
        UPDATE workflows
        SET definition = $1, version = version + 1, updated_at = $2
        WHERE id = $3 AND version = $4 AND deleted_at IS NULL
        RETURNING id, owner_id, team_id, name, version, is_active, definition, created_at, updated_at, deleted_at
        "#,
    )
    .bind(&definition)
    .bind(now)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        // Either the workflow doesn't exist, or `expected_version` is stale.
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM workflows WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(if exists == 0 { DbError::NotFound } else { DbError::VersionMismatch });
    };

    sqlx::query(
        r#"INSERT INTO workflow_versions (workflow_id, version, snapshot, created_at)
           VALUES ($1, $2, $3, $4)"#,
    )
    .bind(id)
    .bind(&definition)
    .bind(row.version)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE workflows SET is_active = $1, updated_at = $2 WHERE id = $3 AND deleted_at IS NULL")
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Soft-delete: sets `deleted_at` rather than removing the row, so
/// historical executions keep a valid foreign key.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE workflows SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub async fn list_versions(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<WorkflowVersionRow>, DbError> {
    let rows: Vec<WorkflowVersionRow> = sqlx::query_as(
        r#"SELECT workflow_id, version, snapshot, created_at FROM workflow_versions
           WHERE workflow_id = $1 ORDER BY version DESC"#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
