//! `datetime` node — `now`, `format`, `parse`, `add`, `diff`, IANA
//! timezone-aware.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct DatetimeParams {
    operation: String,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    other: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

pub struct DatetimeNode;

fn resolve_tz(name: &str) -> Result<Tz, String> {
    Tz::from_str(name).map_err(|_| format!("unknown timezone '{name}'"))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("unparsable timestamp '{raw}': {e}"))
}

#[async_trait]
impl ExecutableNode for DatetimeNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: DatetimeParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid datetime parameters: {e}")))?;
        let tz = resolve_tz(&params.timezone).map_err(NodeError::Fatal)?;

        let result = match params.operation.as_str() {
            "now" => json!(Utc::now().with_timezone(&tz).to_rfc3339()),
            "format" => {
                let raw = params.value.ok_or_else(|| NodeError::Fatal("format requires 'value'".into()))?;
                let instant = parse_instant(&raw).map_err(NodeError::Fatal)?;
                let fmt = params.format.as_deref().unwrap_or("%Y-%m-%d %H:%M:%S");
                json!(instant.with_timezone(&tz).format(fmt).to_string())
            }
            "parse" => {
                let raw = params.value.ok_or_else(|| NodeError::Fatal("parse requires 'value'".into()))?;
                let instant = parse_instant(&raw).map_err(NodeError::Fatal)?;
                json!(instant.to_rfc3339())
            }
            "add" => {
                let raw = params.value.ok_or_else(|| NodeError::Fatal("add requires 'value'".into()))?;
                let instant = parse_instant(&raw).map_err(NodeError::Fatal)?;
                let amount = params.amount.unwrap_or(0);
                let unit = params.unit.as_deref().unwrap_or("s");
                let delta = duration_for(unit, amount).map_err(NodeError::Fatal)?;
                json!((instant + delta).to_rfc3339())
            }
            "diff" => {
                let raw = params.value.ok_or_else(|| NodeError::Fatal("diff requires 'value'".into()))?;
                let other_raw = params.other.ok_or_else(|| NodeError::Fatal("diff requires 'other'".into()))?;
                let a = parse_instant(&raw).map_err(NodeError::Fatal)?;
                let b = parse_instant(&other_raw).map_err(NodeError::Fatal)?;
                json!((a - b).num_milliseconds())
            }
            other => return Err(NodeError::Fatal(format!("unsupported datetime operation '{other}'"))),
        };

        Ok(json!({ "result": result }))
    }
}

fn duration_for(unit: &str, amount: i64) -> Result<chrono::Duration, String> {
    match unit {
        "ms" => Ok(chrono::Duration::milliseconds(amount)),
        "s" => Ok(chrono::Duration::seconds(amount)),
        "m" => Ok(chrono::Duration::minutes(amount)),
        "h" => Ok(chrono::Duration::hours(amount)),
        "d" => Ok(chrono::Duration::days(amount)),
        other => Err(format!("unsupported duration unit '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use std::collections::HashMap;

    fn ctx(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "d1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn add_shifts_by_requested_unit() {
        let params = json!({
            "operation": "add",
            "value": "2024-01-01T00:00:00Z",
            "amount": 1,
            "unit": "d"
        });
        let out = DatetimeNode.execute(Value::Null, &ctx(params)).await.unwrap();
        assert_eq!(out["result"], json!("2024-01-02T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn diff_returns_milliseconds_between_instants() {
        let params = json!({
            "operation": "diff",
            "value": "2024-01-01T00:00:01Z",
            "other": "2024-01-01T00:00:00Z"
        });
        let out = DatetimeNode.execute(Value::Null, &ctx(params)).await.unwrap();
        assert_eq!(out["result"], json!(1000));
    }
}
