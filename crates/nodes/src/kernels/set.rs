//! `set` node — shallow-merges configured literal values into the input.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetParams {
    #[serde(default)]
    values: serde_json::Map<String, Value>,
    #[serde(default = "default_keep_existing")]
    keep_existing: bool,
}

fn default_keep_existing() -> bool {
    true
}

pub struct SetNode;

#[async_trait]
impl ExecutableNode for SetNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: SetParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid set parameters: {e}")))?;

        let mut base = if params.keep_existing {
            input.as_object().cloned().unwrap_or_default()
        } else {
            serde_json::Map::new()
        };

        for (key, value) in params.values {
            base.insert(key, value);
        }

        Ok(Value::Object(base))
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
    async fn keeps_existing_fields_by_default() {
        let input = json!({"a": 1});
        let out = SetNode.execute(input, &ctx(json!({"values": {"b": 2}}))).await.unwrap();
        assert_eq!(out, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn drops_existing_fields_when_disabled() {
        let input = json!({"a": 1});
        let params = json!({"values": {"b": 2}, "keep_existing": false});
        let out = SetNode.execute(input, &ctx(params)).await.unwrap();
        assert_eq!(out, json!({"b": 2}));
    }
}
