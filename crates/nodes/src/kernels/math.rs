//! `math` node — arithmetic plus `mod`, `pow`, `sqrt`, `abs`, `ceil`,
//! `floor`, `round`, `min`, `max`, `random`.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct MathParams {
    operation: String,
    #[serde(default)]
    a: f64,
    #[serde(default)]
    b: f64,
}

pub struct MathNode;

#[async_trait]
impl ExecutableNode for MathNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: MathParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid math parameters: {e}")))?;

        let result = match params.operation.as_str() {
            "+" | "add" => params.a + params.b,
            "-" | "subtract" => params.a - params.b,
            "*" | "multiply" => params.a * params.b,
            "/" | "divide" => {
                if params.b == 0.0 {
                    return Err(NodeError::Fatal("division by zero".to_string()));
                }
                params.a / params.b
            }
            "mod" => {
                if params.b == 0.0 {
                    return Err(NodeError::Fatal("division by zero".to_string()));
                }
                params.a % params.b
            }
            "pow" => params.a.powf(params.b),
            "sqrt" => params.a.sqrt(),
            "abs" => params.a.abs(),
            "ceil" => params.a.ceil(),
            "floor" => params.a.floor(),
            "round" => params.a.round(),
            "min" => params.a.min(params.b),
            "max" => params.a.max(params.b),
            "random" => {
                let (low, high) = (params.a.min(params.b), params.a.max(params.b));
                rand::thread_rng().gen_range(low..=high)
            }
            other => return Err(NodeError::Fatal(format!("unsupported math operation '{other}'"))),
        };

        Ok(json!({ "result": result }))
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
    async fn division_by_zero_fails() {
        let err = MathNode
            .execute(Value::Null, &ctx(json!({"operation": "/", "a": 1, "b": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }

    #[tokio::test]
    async fn random_stays_within_inclusive_range() {
        let out = MathNode
            .execute(Value::Null, &ctx(json!({"operation": "random", "a": 1, "b": 5})))
            .await
            .unwrap();
        let value = out["result"].as_f64().unwrap();
        assert!((1.0..=5.0).contains(&value));
    }
}
