//! `function` node — `{{name}}` template substitution against the
//! variable context carried on `input`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::{render_template, Resolver};
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct FunctionParams {
    template: String,
}

struct InputResolver<'a>(&'a Value);

impl Resolver for InputResolver<'_> {
    fn resolve(&self, reference: &str) -> Option<Value> {
        crate::expr::get_path(self.0, reference).cloned()
    }
}

pub struct FunctionNode;

#[async_trait]
impl ExecutableNode for FunctionNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: FunctionParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid function parameters: {e}")))?;

        let resolver = InputResolver(&input);
        let rendered = render_template(&params.template, &resolver);
        Ok(json!({ "rendered": rendered }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use std::collections::HashMap;

    #[tokio::test]
    async fn renders_template_against_input() {
        let ctx = ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "f1".into(),
            parameters: json!({"template": "hello {{name}}"}),
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        };
        let out = FunctionNode.execute(json!({"name": "ada"}), &ctx).await.unwrap();
        assert_eq!(out["rendered"], json!("hello ada"));
    }
}
