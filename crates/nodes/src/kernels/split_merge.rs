//! `split` fans an array into indexed sub-items; `merge` recombines
//! multiple upstream branches.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct SplitParams {
    field: String,
}

pub struct SplitNode;

#[async_trait]
impl ExecutableNode for SplitNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: SplitParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid split parameters: {e}")))?;

        let items = get_path(&input, &params.field)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let indexed: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| json!({ "index": index, "item": item }))
            .collect();

        Ok(json!({ "items": indexed }))
    }
}

#[derive(Debug, Deserialize)]
struct MergeParams {
    #[serde(default = "default_mode")]
    mode: String,
}

fn default_mode() -> String {
    "append".to_string()
}

pub struct MergeNode;

#[async_trait]
impl ExecutableNode for MergeNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: MergeParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid merge parameters: {e}")))?;

        // The orchestrator gathers every incoming branch's output into an
        // array under `branches` before invoking merge (it waits for all
        // incoming edges per spec.md §4.3).
        let branches = input
            .get("branches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let merged = match params.mode.as_str() {
            "combine" => {
                let mut map = serde_json::Map::new();
                for branch in &branches {
                    if let Some(obj) = branch.as_object() {
                        for (k, v) in obj {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                }
                Value::Object(map)
            }
            "wait" => Value::Array(branches.clone()),
            _ => {
                // append: flatten array-typed branches, pass through others as-is.
                let mut flat = Vec::new();
                for branch in &branches {
                    match branch.as_array() {
                        Some(arr) => flat.extend(arr.iter().cloned()),
                        None => flat.push(branch.clone()),
                    }
                }
                Value::Array(flat)
            }
        };

        Ok(json!({ "mode": params.mode, "merged": merged }))
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
            node_id: "m1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn split_indexes_array_items() {
        let out = SplitNode
            .execute(json!({"values": ["a", "b"]}), &ctx(json!({"field": "values"})))
            .await
            .unwrap();
        assert_eq!(out["items"][0]["index"], json!(0));
        assert_eq!(out["items"][1]["item"], json!("b"));
    }

    #[tokio::test]
    async fn merge_append_flattens_array_branches() {
        let input = json!({"branches": [[1, 2], [3]]});
        let out = MergeNode.execute(input, &ctx(json!({"mode": "append"}))).await.unwrap();
        assert_eq!(out["merged"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn merge_combine_last_writer_wins() {
        let input = json!({"branches": [{"a": 1}, {"a": 2, "b": 3}]});
        let out = MergeNode.execute(input, &ctx(json!({"mode": "combine"}))).await.unwrap();
        assert_eq!(out["merged"], json!({"a": 2, "b": 3}));
    }
}
