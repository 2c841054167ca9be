//! `wait` node — sleeps for a configured duration, returning immediately
//! on cancellation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct WaitParams {
    duration: u64,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "s".to_string()
}

pub struct WaitNode;

impl WaitParams {
    fn as_duration(&self) -> Result<std::time::Duration, String> {
        let millis = match self.unit.as_str() {
            "ms" => self.duration,
            "s" => self.duration.saturating_mul(1_000),
            "m" => self.duration.saturating_mul(60_000),
            "h" => self.duration.saturating_mul(3_600_000),
            other => return Err(format!("unsupported wait unit '{other}'")),
        };
        Ok(std::time::Duration::from_millis(millis))
    }
}

#[async_trait]
impl ExecutableNode for WaitNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: WaitParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid wait parameters: {e}")))?;
        let sleep_for = params.as_duration().map_err(NodeError::Fatal)?;

        let cancellation = ctx.cancellation.clone();
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => Ok(json!({ "waited_ms": sleep_for.as_millis() })),
            _ = poll_cancellation(cancellation) => Err(NodeError::Cancelled),
        }
    }
}

async fn poll_cancellation(token: crate::traits::CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
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
            node_id: "w1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn waits_for_configured_duration() {
        let out = WaitNode.execute(Value::Null, &ctx(json!({"duration": 5, "unit": "ms"}))).await.unwrap();
        assert_eq!(out["waited_ms"], json!(5));
    }

    #[tokio::test]
    async fn returns_cancelled_when_token_fires() {
        let context = ctx(json!({"duration": 5, "unit": "s"}));
        let token = context.cancellation.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            token.cancel();
        });
        let result = WaitNode.execute(Value::Null, &context).await;
        handle.await.unwrap();
        assert!(matches!(result, Err(NodeError::Cancelled)));
    }
}
