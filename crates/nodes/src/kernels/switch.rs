//! `switch` node — stringifies a field and emits the matching case's branch.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct Case {
    value: String,
    branch: String,
}

#[derive(Debug, Deserialize)]
struct SwitchParams {
    field: String,
    #[serde(default)]
    cases: Vec<Case>,
    #[serde(default = "default_branch")]
    default: String,
}

fn default_branch() -> String {
    "default".to_string()
}

pub struct SwitchNode;

#[async_trait]
impl ExecutableNode for SwitchNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: SwitchParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid switch parameters: {e}")))?;

        let stringified = get_path(&input, &params.field)
            .map(value_to_string)
            .unwrap_or_default();

        let branch = params
            .cases
            .iter()
            .find(|c| c.value == stringified)
            .map(|c| c.branch.clone())
            .unwrap_or(params.default);

        Ok(json!({ "branch": branch, "matched_value": stringified }))
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use std::collections::HashMap;

    fn ctx(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "s1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn matches_configured_case() {
        let params = json!({
            "field": "status",
            "cases": [{"value": "ok", "branch": "success"}, {"value": "bad", "branch": "failure"}]
        });
        let out = SwitchNode.execute(json!({"status": "bad"}), &ctx(params)).await.unwrap();
        assert_eq!(out["branch"], json!("failure"));
    }

    #[tokio::test]
    async fn falls_back_to_default_branch() {
        let params = json!({"field": "status", "cases": []});
        let out = SwitchNode.execute(json!({"status": "anything"}), &ctx(params)).await.unwrap();
        assert_eq!(out["branch"], json!("default"));
    }
}
