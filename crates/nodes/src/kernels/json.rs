//! `json` node — `parse`, `stringify`, `get`, `set`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::expr::{get_path, set_path};
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct JsonParams {
    operation: String,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    pretty: bool,
}

pub struct JsonNode;

#[async_trait]
impl ExecutableNode for JsonNode {
    async fn execute(&self, upstream: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: JsonParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid json parameters: {e}")))?;

        let result = match params.operation.as_str() {
            "parse" => {
                let raw = params.input.ok_or_else(|| NodeError::Fatal("parse requires 'input'".to_string()))?;
                serde_json::from_str::<Value>(&raw)
                    .map_err(|e| NodeError::Fatal(format!("invalid json: {e}")))?
            }
            "stringify" => {
                let rendered = if params.pretty {
                    serde_json::to_string_pretty(&upstream)
                } else {
                    serde_json::to_string(&upstream)
                }
                .map_err(|e| NodeError::Fatal(format!("failed to stringify: {e}")))?;
                Value::String(rendered)
            }
            "get" => {
                let path = params.path.ok_or_else(|| NodeError::Fatal("get requires 'path'".to_string()))?;
                get_path(&upstream, &path).cloned().unwrap_or(Value::Null)
            }
            "set" => {
                let path = params.path.ok_or_else(|| NodeError::Fatal("set requires 'path'".to_string()))?;
                let mut cloned = upstream.clone();
                set_path(&mut cloned, &path, params.value);
                cloned
            }
            other => return Err(NodeError::Fatal(format!("unsupported json operation '{other}'"))),
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "j1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn get_reads_nested_field() {
        let upstream = json!({"user": {"name": "ada"}});
        let out = JsonNode.execute(upstream, &ctx(json!({"operation": "get", "path": "user.name"}))).await.unwrap();
        assert_eq!(out, json!("ada"));
    }

    #[tokio::test]
    async fn set_constructs_missing_intermediates() {
        let upstream = json!({});
        let params = json!({"operation": "set", "path": "a.b", "value": 5});
        let out = JsonNode.execute(upstream, &ctx(params)).await.unwrap();
        assert_eq!(out, json!({"a": {"b": 5}}));
    }

    #[tokio::test]
    async fn parse_rejects_invalid_json() {
        let params = json!({"operation": "parse", "input": "{not json"});
        let err = JsonNode.execute(Value::Null, &ctx(params)).await.unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }
}
