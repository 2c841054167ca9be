//! `aggregate` node — `sum`, `avg`, `min`, `max`, `concat`, `unique`, `group`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct AggregateParams {
    field: String,
    operation: String,
    #[serde(default = "default_separator")]
    separator: String,
    #[serde(default)]
    group_by: Option<String>,
}

fn default_separator() -> String {
    ",".to_string()
}

pub struct AggregateNode;

#[async_trait]
impl ExecutableNode for AggregateNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let params: AggregateParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid aggregate parameters: {e}")))?;

        let items: Vec<Value> = get_path(&input, &params.field)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let numbers: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();

        let result = match params.operation.as_str() {
            "sum" => numbers.iter().sum::<f64>().into(),
            "avg" => {
                if numbers.is_empty() {
                    Value::Null
                } else {
                    json!(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            "min" => numbers
                .iter()
                .cloned()
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "max" => numbers
                .iter()
                .cloned()
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "concat" => {
                let strings: Vec<String> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect();
                json!(strings.join(&params.separator))
            }
            "unique" => {
                let mut seen = std::collections::HashSet::new();
                let unique: Vec<Value> = items
                    .into_iter()
                    .filter(|v| seen.insert(v.to_string()))
                    .collect();
                Value::Array(unique)
            }
            "group" => {
                let group_field = params.group_by.as_deref().unwrap_or(&params.field);
                let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
                for item in items {
                    let key = get_path(&item, group_field)
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .unwrap_or_else(|| "null".to_string());
                    groups.entry(key).or_default().push(item);
                }
                json!(groups)
            }
            other => return Err(NodeError::Fatal(format!("unsupported aggregate operation '{other}'"))),
        };

        Ok(json!({ "operation": params.operation, "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;

    fn ctx(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "a1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn sum_ignores_non_numeric_entries() {
        let input = json!({"values": [1, "x", 2, 3]});
        let out = AggregateNode
            .execute(input, &ctx(json!({"field": "values", "operation": "sum"})))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(6.0));
    }

    #[tokio::test]
    async fn avg_over_empty_input_yields_no_value() {
        let input = json!({"values": []});
        let out = AggregateNode
            .execute(input, &ctx(json!({"field": "values", "operation": "avg"})))
            .await
            .unwrap();
        assert_eq!(out["result"], Value::Null);
    }

    #[tokio::test]
    async fn concat_joins_with_separator() {
        let input = json!({"values": ["a", "b", "c"]});
        let out = AggregateNode
            .execute(input, &ctx(json!({"field": "values", "operation": "concat", "separator": "-"})))
            .await
            .unwrap();
        assert_eq!(out["result"], json!("a-b-c"));
    }
}
