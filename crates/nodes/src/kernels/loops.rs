//! `loop`, `foreach`, `while` — the three iteration kernels. Each respects
//! cancellation at every iteration boundary and never runs past its cap.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct LoopParams {
    #[serde(default = "default_iterations")]
    iterations: u32,
}

fn default_iterations() -> u32 {
    10
}

pub struct LoopNode;

#[async_trait]
impl ExecutableNode for LoopNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: LoopParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid loop parameters: {e}")))?;

        let mut iterations_run = 0u32;
        for _ in 0..params.iterations {
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            if ctx.is_expired() {
                return Err(NodeError::Timeout);
            }
            iterations_run += 1;
        }
        Ok(json!({ "iterations_run": iterations_run, "input": input }))
    }
}

#[derive(Debug, Deserialize)]
struct ForeachParams {
    field: String,
    #[serde(default)]
    batch_size: Option<usize>,
}

pub struct ForeachNode;

#[async_trait]
impl ExecutableNode for ForeachNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: ForeachParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid foreach parameters: {e}")))?;

        let items: Vec<Value> = get_path(&input, &params.field)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let batches: Vec<Vec<Value>> = match params.batch_size {
            Some(size) if size > 0 => items.chunks(size).map(|c| c.to_vec()).collect(),
            _ => items.iter().cloned().map(|v| vec![v]).collect(),
        };

        for _ in &batches {
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            if ctx.is_expired() {
                return Err(NodeError::Timeout);
            }
        }

        Ok(json!({ "item_count": items.len(), "batches": batches }))
    }
}

#[derive(Debug, Deserialize)]
struct WhileParams {
    field: String,
    #[serde(default = "default_max_iterations")]
    max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    100
}

pub struct WhileNode;

#[async_trait]
impl ExecutableNode for WhileNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: WhileParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid while parameters: {e}")))?;

        let mut iterations = 0u32;
        loop {
            if iterations >= params.max_iterations {
                break;
            }
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            if ctx.is_expired() {
                return Err(NodeError::Timeout);
            }
            let condition_true = get_path(&input, &params.field)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !condition_true {
                break;
            }
            iterations += 1;
        }

        Ok(json!({ "iterations": iterations, "capped": iterations >= params.max_iterations }))
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
            node_id: "n1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn foreach_splits_into_expected_batch_count() {
        let params = json!({"field": "items", "batch_size": 2});
        let input = json!({"items": [1, 2, 3, 4, 5]});
        let out = ForeachNode.execute(input, &ctx(params)).await.unwrap();
        assert_eq!(out["batches"].as_array().unwrap().len(), 3);
        assert_eq!(out["item_count"], json!(5));
    }

    #[tokio::test]
    async fn while_never_exceeds_max_iterations() {
        let params = json!({"field": "always_true", "max_iterations": 5});
        let input = json!({"always_true": true});
        let out = WhileNode.execute(input, &ctx(params)).await.unwrap();
        assert_eq!(out["iterations"], json!(5));
        assert_eq!(out["capped"], json!(true));
    }

    #[tokio::test]
    async fn loop_runs_default_ten_iterations() {
        let out = LoopNode.execute(Value::Null, &ctx(json!({}))).await.unwrap();
        assert_eq!(out["iterations_run"], json!(10));
    }
}
