//! `database` node — parameterized queries only; no value is ever spliced
//! into the SQL text. Table and column identifiers come from the node's
//! own configuration (not the execution input), so they are quoted and
//! interpolated directly; every *value* goes through a bound parameter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::{Column, Row};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct DatabaseParams {
    operation: String,
    table: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Value>,
    #[serde(default)]
    filter: Map<String, Value>,
}

pub struct DatabaseNode {
    pool: db::DbPool,
}

impl DatabaseNode {
    pub fn new(pool: db::DbPool) -> Self {
        Self { pool }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[async_trait]
impl ExecutableNode for DatabaseNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: DatabaseParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid database parameters: {e}")))?;

        let table = quote_ident(&params.table);

        let result = match params.operation.as_str() {
            "select" => {
                let where_clause = build_where(&params.filter);
                let sql = format!("SELECT * FROM {table} {where_clause}");
                let mut query = sqlx::query(&sql);
                for value in params.filter.values() {
                    query = bind_json(query, value);
                }
                let rows = query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| NodeError::Retryable(format!("select failed: {e}")))?;
                json!({ "rows": rows.iter().map(row_to_map).collect::<Vec<_>>() })
            }
            "insert" => {
                let cols: Vec<String> = params.columns.iter().map(|c| quote_ident(c)).collect();
                let placeholders: Vec<String> =
                    (1..=params.values.len()).map(|i| format!("${i}")).collect();
                let sql = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    cols.join(", "),
                    placeholders.join(", ")
                );
                let mut query = sqlx::query(&sql);
                for value in &params.values {
                    query = bind_json(query, value);
                }
                let affected = query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| NodeError::Retryable(format!("insert failed: {e}")))?
                    .rows_affected();
                json!({ "affected_rows": affected })
            }
            "update" => {
                let set_clause: Vec<String> = params
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
                    .collect();
                let where_clause = build_where_offset(&params.filter, params.columns.len());
                let sql = format!("UPDATE {table} SET {} {where_clause}", set_clause.join(", "));
                let mut query = sqlx::query(&sql);
                for value in &params.values {
                    query = bind_json(query, value);
                }
                for value in params.filter.values() {
                    query = bind_json(query, value);
                }
                let affected = query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| NodeError::Retryable(format!("update failed: {e}")))?
                    .rows_affected();
                json!({ "affected_rows": affected })
            }
            "delete" => {
                let where_clause = build_where(&params.filter);
                let sql = format!("DELETE FROM {table} {where_clause}");
                let mut query = sqlx::query(&sql);
                for value in params.filter.values() {
                    query = bind_json(query, value);
                }
                let affected = query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| NodeError::Retryable(format!("delete failed: {e}")))?
                    .rows_affected();
                json!({ "affected_rows": affected })
            }
            "upsert" => {
                return Err(NodeError::Fatal(
                    "upsert requires a conflict target configured per-table; not yet wired".into(),
                ));
            }
            other => return Err(NodeError::Fatal(format!("unsupported database operation '{other}'"))),
        };

        Ok(result)
    }
}

fn build_where(filter: &Map<String, Value>) -> String {
    build_where_offset(filter, 0)
}

fn build_where_offset(filter: &Map<String, Value>, offset: usize) -> String {
    if filter.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = filter
        .keys()
        .enumerate()
        .map(|(i, k)| format!("{} = ${}", quote_ident(k), offset + i + 1))
        .collect();
    format!("WHERE {}", clauses.join(" AND "))
}

fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap()),
        Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_map(row: &sqlx::postgres::PgRow) -> Value {
    let mut map = Map::new();
    for column in row.columns() {
        let name = column.name();
        let value: Value = row
            .try_get::<Option<String>, _>(name)
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .or_else(|_| row.try_get::<Option<i64>, _>(name).map(|v| v.map(|n| json!(n)).unwrap_or(Value::Null)))
            .or_else(|_| row.try_get::<Option<f64>, _>(name).map(|v| v.map(|n| json!(n)).unwrap_or(Value::Null)))
            .or_else(|_| row.try_get::<Option<bool>, _>(name).map(|v| v.map(|b| json!(b)).unwrap_or(Value::Null)))
            .unwrap_or(Value::Null);
        map.insert(name.to_string(), value);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_double_quotes() {
        assert_eq!(quote_ident("weird\"table"), "\"weird\"\"table\"");
    }

    #[test]
    fn where_clause_empty_filter_is_blank() {
        assert_eq!(build_where(&Map::new()), "");
    }

    #[test]
    fn where_clause_numbers_placeholders_from_offset() {
        let mut filter = Map::new();
        filter.insert("id".into(), json!(1));
        assert_eq!(build_where_offset(&filter, 2), "WHERE \"id\" = $3");
    }
}
