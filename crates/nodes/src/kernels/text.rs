//! `text` node — `uppercase`, `lowercase`, `trim`, `split`, `join`,
//! `replace`, `substring`, `length`, `contains`, `regex`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct TextParams {
    operation: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    delimiter: String,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    start: usize,
    #[serde(default)]
    end: Option<usize>,
    #[serde(default)]
    needle: String,
    #[serde(default)]
    pattern: String,
}

pub struct TextNode;

#[async_trait]
impl ExecutableNode for TextNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: TextParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid text parameters: {e}")))?;

        let result = match params.operation.as_str() {
            "uppercase" => json!(params.input.to_uppercase()),
            "lowercase" => json!(params.input.to_lowercase()),
            "trim" => json!(params.input.trim()),
            "split" => json!(params
                .input
                .split(params.delimiter.as_str())
                .collect::<Vec<_>>()),
            "join" => json!(params.items.join(&params.delimiter)),
            "replace" => json!(params.input.replace(&params.from, &params.to)),
            "substring" => {
                let chars: Vec<char> = params.input.chars().collect();
                let end = params.end.unwrap_or(chars.len()).min(chars.len());
                let start = params.start.min(end);
                json!(chars[start..end].iter().collect::<String>())
            }
            "length" => json!(params.input.chars().count()),
            "contains" => json!(params.input.contains(&params.needle)),
            "regex" => {
                let re = regex::Regex::new(&params.pattern)
                    .map_err(|e| NodeError::Fatal(format!("invalid regex: {e}")))?;
                let matches: Vec<&str> = re.find_iter(&params.input).map(|m| m.as_str()).collect();
                json!({ "matches": matches, "count": matches.len() })
            }
            other => return Err(NodeError::Fatal(format!("unsupported text operation '{other}'"))),
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
            node_id: "t1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn replace_affects_all_occurrences() {
        let params = json!({"operation": "replace", "input": "a-b-a", "from": "a", "to": "x"});
        let out = TextNode.execute(Value::Null, &ctx(params)).await.unwrap();
        assert_eq!(out["result"], json!("x-b-x"));
    }

    #[tokio::test]
    async fn regex_reports_matches_and_count() {
        let params = json!({"operation": "regex", "input": "a1 b22 c333", "pattern": "\\d+"});
        let out = TextNode.execute(Value::Null, &ctx(params)).await.unwrap();
        assert_eq!(out["result"]["count"], json!(3));
        assert_eq!(out["result"]["matches"], json!(["1", "22", "333"]));
    }
}
