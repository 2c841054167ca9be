//! Execution, node-execution, and state-transition repository functions.
//!
//! State mutation follows the single-transaction row-lock pattern: lock the
//! execution row with `SELECT ... FOR UPDATE`, update its status, and
//! append the `StateTransition` audit row, all inside one transaction, so a
//! concurrent reader never observes a status change without its matching
//! transition record.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{ExecutionRow, NodeExecutionRow, StateTransitionRow},
    DbError,
};

pub async fn create_execution(pool: &PgPool, row: &ExecutionRow) -> Result<ExecutionRow, DbError> {
    let inserted: ExecutionRow = sqlx::query_as(
        r#"
        INSERT INTO executions
            (id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
             execution_time_ms, input, output, error, error_code, retry_count, retry_of,
             creator_id, idempotency_key, created_at)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
        RETURNING id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
                  execution_time_ms, input, output, error, error_code, retry_count, retry_of,
                  creator_id, idempotency_key, created_at
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.status)
    .bind(&row.mode)
    .bind(&row.trigger_type)
    .bind(&row.priority)
    .bind(row.started_at)
    .bind(row.finished_at)
    .bind(row.execution_time_ms)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.error)
    .bind(&row.error_code)
    .bind(row.retry_count)
    .bind(row.retry_of)
    .bind(row.creator_id)
    .bind(&row.idempotency_key)
    .bind(row.created_at)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Look up an execution by its idempotency key, for request-collapsing on
/// resubmission (spec.md §4.3).
pub async fn find_by_idempotency_key(pool: &PgPool, key: &str) -> Result<Option<ExecutionRow>, DbError> {
    let row: Option<ExecutionRow> = sqlx::query_as(
        r#"SELECT id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
                  execution_time_ms, input, output, error, error_code, retry_count, retry_of,
                  creator_id, idempotency_key, created_at
           FROM executions WHERE idempotency_key = $1
           ORDER BY created_at DESC LIMIT 1"#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Record the very first transition for a freshly created execution
/// (`""` -> `to_status`, spec.md §4.3 step 1). Separate from
/// [`transition_status`] because there is no prior row-locked status to
/// read yet — the execution row was just inserted by [`create_execution`].
pub async fn insert_initial_transition(pool: &PgPool, execution_id: Uuid, to_status: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"INSERT INTO state_transitions (id, execution_id, from_state, to_state, timestamp, metadata)
           VALUES ($1, $2, '', $3, $4, '{}'::jsonb)"#,
    )
    .bind(Uuid::new_v4())
    .bind(execution_id)
    .bind(to_status)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// `pending` -> `running` (spec.md §4.3 step 2): row-locks the execution,
/// stamps `started_at`, and appends the transition, all in one transaction.
pub async fn start_execution(pool: &PgPool, execution_id: Uuid, started_at: DateTime<Utc>) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let current: (String,) = sqlx::query_as("SELECT status FROM executions WHERE id = $1 FOR UPDATE")
        .bind(execution_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    sqlx::query("UPDATE executions SET status = 'running', started_at = $1 WHERE id = $2")
        .bind(started_at)
        .bind(execution_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"INSERT INTO state_transitions (id, execution_id, from_state, to_state, timestamp, metadata)
           VALUES ($1, $2, $3, 'running', $4, '{}'::jsonb)"#,
    )
    .bind(Uuid::new_v4())
    .bind(execution_id)
    .bind(current.0)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Persist the final output payload once an execution reaches a terminal
/// state. Separate from [`transition_status`] because the output is only
/// known after the last node in the graph has resolved.
pub async fn set_output(pool: &PgPool, execution_id: Uuid, output: &serde_json::Value) -> Result<(), DbError> {
    sqlx::query("UPDATE executions SET output = $1 WHERE id = $2")
        .bind(output)
        .bind(execution_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Transition an execution to `to_status` and append a `StateTransition`
/// row, holding a row lock for the duration of the update (spec.md §4.5).
pub async fn transition_status(
    pool: &PgPool,
    execution_id: Uuid,
    to_status: &str,
    finished_at: Option<DateTime<Utc>>,
    execution_time_ms: Option<i64>,
    error: Option<&str>,
    error_code: Option<&str>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let current: (String,) = sqlx::query_as("SELECT status FROM executions WHERE id = $1 FOR UPDATE")
        .bind(execution_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    sqlx::query(
        r#"UPDATE executions
           SET status = $1, finished_at = COALESCE($2, finished_at),
               execution_time_ms = COALESCE($3, execution_time_ms),
               error = COALESCE($4, error), error_code = COALESCE($5, error_code)
           WHERE id = $6"#,
    )
    .bind(to_status)
    .bind(finished_at)
    .bind(execution_time_ms)
    .bind(error)
    .bind(error_code)
    .bind(execution_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO state_transitions (id, execution_id, from_state, to_state, timestamp, metadata)
           VALUES ($1, $2, $3, $4, $5, '{}'::jsonb)"#,
    )
    .bind(Uuid::new_v4())
    .bind(execution_id)
    .bind(current.0)
    .bind(to_status)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct ExecutionFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<String>,
    pub creator_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_executions(pool: &PgPool, filter: &ExecutionFilter) -> Result<Vec<ExecutionRow>, DbError> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(
        r#"SELECT id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
                  execution_time_ms, input, output, error, error_code, retry_count, retry_of,
                  creator_id, idempotency_key, created_at
           FROM executions
           WHERE ($1::uuid IS NULL OR workflow_id = $1)
             AND ($2::text IS NULL OR status = $2)
             AND ($3::uuid IS NULL OR creator_id = $3)
             AND ($4::timestamptz IS NULL OR created_at >= $4)
             AND ($5::timestamptz IS NULL OR created_at <= $5)
           ORDER BY created_at DESC
           LIMIT $6 OFFSET $7"#,
    )
    .bind(filter.workflow_id)
    .bind(&filter.status)
    .bind(filter.creator_id)
    .bind(filter.since)
    .bind(filter.until)
    .bind(filter.limit.max(1))
    .bind(filter.offset.max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<ExecutionRow, DbError> {
    let row: Option<ExecutionRow> = sqlx::query_as(
        r#"SELECT id, workflow_id, status, mode, trigger_type, priority, started_at, finished_at,
                  execution_time_ms, input, output, error, error_code, retry_count, retry_of,
                  creator_id, idempotency_key, created_at
           FROM executions WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

pub async fn insert_node_execution(pool: &PgPool, row: &NodeExecutionRow) -> Result<NodeExecutionRow, DbError> {
    let inserted: NodeExecutionRow = sqlx::query_as(
        r#"
        INSERT INTO node_executions
            (id, execution_id, node_id, status, started_at, finished_at, execution_time_ms,
             input, output, error, retry_count, metadata)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        RETURNING id, execution_id, node_id, status, started_at, finished_at, execution_time_ms,
                  input, output, error, retry_count, metadata
        "#,
    )
    .bind(row.id)
    .bind(row.execution_id)
    .bind(&row.node_id)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.finished_at)
    .bind(row.execution_time_ms)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.error)
    .bind(row.retry_count)
    .bind(&row.metadata)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

pub async fn list_node_executions(pool: &PgPool, execution_id: Uuid) -> Result<Vec<NodeExecutionRow>, DbError> {
    let rows: Vec<NodeExecutionRow> = sqlx::query_as(
        r#"SELECT id, execution_id, node_id, status, started_at, finished_at, execution_time_ms,
                  input, output, error, retry_count, metadata
           FROM node_executions WHERE execution_id = $1 ORDER BY started_at ASC NULLS LAST"#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The merged audit trail for one execution: state transitions interleaved
/// with node-execution start/finish events, ordered by absolute timestamp
/// (spec.md §4.5 "timeline merge").
pub async fn timeline(pool: &PgPool, execution_id: Uuid) -> Result<Vec<crate::models::TimelineEvent>, DbError> {
    use crate::models::TimelineEvent;

    let transitions: Vec<StateTransitionRow> = sqlx::query_as(
        r#"SELECT id, execution_id, from_state, to_state, timestamp, metadata
           FROM state_transitions WHERE execution_id = $1 ORDER BY timestamp ASC"#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    let node_executions = list_node_executions(pool, execution_id).await?;

    let mut events: Vec<TimelineEvent> = Vec::with_capacity(transitions.len() + node_executions.len() * 2);
    for t in transitions {
        events.push(TimelineEvent::Transition {
            timestamp: t.timestamp,
            from_state: t.from_state,
            to_state: t.to_state,
        });
    }
    for ne in node_executions {
        if let Some(started_at) = ne.started_at {
            events.push(TimelineEvent::NodeStarted { timestamp: started_at, node_id: ne.node_id.clone() });
        }
        if let Some(finished_at) = ne.finished_at {
            events.push(TimelineEvent::NodeFinished {
                timestamp: finished_at,
                node_id: ne.node_id,
                status: ne.status,
            });
        }
    }

    events.sort_by_key(|e| e.timestamp());
    Ok(events)
}
