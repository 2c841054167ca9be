//! Time-series metric recording and rollup (spec.md §4.5).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ExecutionMetricRow, DbError};

/// Batch-insert a set of metrics in one round trip. Used for both
/// `record_metric` (a single point) and `record_node_metrics` (the
/// memory/cpu/execution_time/throughput quadruple emitted per node).
pub async fn record_metrics(pool: &PgPool, rows: &[ExecutionMetricRow]) -> Result<(), DbError> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            r#"INSERT INTO execution_metrics (id, execution_id, node_id, name, value, unit, timestamp)
               VALUES ($1,$2,$3,$4,$5,$6,$7)"#,
        )
        .bind(row.id)
        .bind(row.execution_id)
        .bind(&row.node_id)
        .bind(&row.name)
        .bind(row.value)
        .bind(&row.unit)
        .bind(row.timestamp)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn metrics_for_execution(pool: &PgPool, execution_id: Uuid) -> Result<Vec<ExecutionMetricRow>, DbError> {
    let rows: Vec<ExecutionMetricRow> = sqlx::query_as(
        r#"SELECT id, execution_id, node_id, name, value, unit, timestamp
           FROM execution_metrics WHERE execution_id = $1 ORDER BY timestamp ASC"#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// A time bucket granularity for an ad-hoc metric time-series query
/// (spec.md §4.5: "group by a time bucket (minute/hour/day) ... expose
/// count plus mean value").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricInterval {
    Minute,
    Hour,
    Day,
}

impl MetricInterval {
    fn date_trunc_unit(self) -> &'static str {
        match self {
            MetricInterval::Minute => "minute",
            MetricInterval::Hour => "hour",
            MetricInterval::Day => "day",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MetricSeriesPoint {
    pub bucket: DateTime<Utc>,
    pub count: i64,
    pub mean_value: f64,
}

/// Aggregated time-series for one metric name, bucketed by the requested
/// interval. Used by read-model consumers that chart latency/throughput
/// over a window without waiting for the nightly rollup.
pub async fn metric_series(
    pool: &PgPool,
    name: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    interval: MetricInterval,
) -> Result<Vec<MetricSeriesPoint>, DbError> {
    let query = format!(
        r#"SELECT date_trunc('{unit}', timestamp) AS bucket, count(*)::bigint AS count, avg(value) AS mean_value
           FROM execution_metrics
           WHERE name = $1 AND timestamp >= $2 AND timestamp <= $3
           GROUP BY bucket
           ORDER BY bucket ASC"#,
        unit = interval.date_trunc_unit(),
    );
    let rows: Vec<MetricSeriesPoint> = sqlx::query_as(&query)
        .bind(name)
        .bind(since)
        .bind(until)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Roll every metric older than `before` into a daily `(min, mean, max)`
/// summary per metric name, then delete the raw points. Runs as one
/// transaction per day bucket so a crash mid-rollup never loses raw data
/// without having produced its summary.
pub async fn rollup_metrics_before(pool: &PgPool, before: DateTime<Utc>) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;

    let buckets: Vec<(String, chrono::NaiveDate, i64, f64, f64, f64)> = sqlx::query_as(
        r#"SELECT name, timestamp::date AS bucket_date, count(*)::bigint, min(value), avg(value), max(value)
           FROM execution_metrics WHERE timestamp < $1
           GROUP BY name, timestamp::date"#,
    )
    .bind(before)
    .fetch_all(&mut *tx)
    .await?;

    for (name, bucket_date, count, min_value, mean_value, max_value) in &buckets {
        sqlx::query(
            r#"INSERT INTO metric_rollups (id, name, bucket_date, count, min_value, mean_value, max_value)
               VALUES ($1,$2,$3,$4,$5,$6,$7)
               ON CONFLICT (name, bucket_date) DO UPDATE SET
                 count = EXCLUDED.count, min_value = EXCLUDED.min_value,
                 mean_value = EXCLUDED.mean_value, max_value = EXCLUDED.max_value"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(bucket_date)
        .bind(count)
        .bind(min_value)
        .bind(mean_value)
        .bind(max_value)
        .execute(&mut *tx)
        .await?;
    }

    let deleted = sqlx::query("DELETE FROM execution_metrics WHERE timestamp < $1")
        .bind(before)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted)
}
