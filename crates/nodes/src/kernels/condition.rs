//! `condition` node — evaluates one or many predicates against the input.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::expr::get_path;
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct Predicate {
    field: String,
    operator: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionParams {
    #[serde(default)]
    conditions: Vec<Predicate>,
    #[serde(default = "default_combine")]
    combine_mode: String,
}

fn default_combine() -> String {
    "and".to_string()
}

pub struct ConditionNode;

impl ConditionNode {
    fn evaluate_one(field_value: Option<&Value>, operator: &str, expected: &Value) -> bool {
        match operator {
            "isNull" => field_value.is_none() || field_value == Some(&Value::Null),
            "isNotNull" => field_value.is_some() && field_value != Some(&Value::Null),
            "isEmpty" => is_empty(field_value),
            "isNotEmpty" => !is_empty(field_value),
            "isTrue" => field_value.and_then(Value::as_bool).unwrap_or(false),
            "isFalse" => !field_value.and_then(Value::as_bool).unwrap_or(true),
            "equals" => field_value == Some(expected),
            "notEquals" => field_value != Some(expected),
            "contains" => contains(field_value, expected),
            "notContains" => !contains(field_value, expected),
            "startsWith" => as_str_pair(field_value, expected)
                .map(|(a, b)| a.starts_with(b))
                .unwrap_or(false),
            "endsWith" => as_str_pair(field_value, expected)
                .map(|(a, b)| a.ends_with(b))
                .unwrap_or(false),
            "greaterThan" => compare(field_value, expected).map(|o| o.is_gt()).unwrap_or(false),
            "lessThan" => compare(field_value, expected).map(|o| o.is_lt()).unwrap_or(false),
            "greaterThanOrEqual" => compare(field_value, expected).map(|o| o.is_ge()).unwrap_or(false),
            "lessThanOrEqual" => compare(field_value, expected).map(|o| o.is_le()).unwrap_or(false),
            "regex" => as_str_pair(field_value, expected)
                .and_then(|(a, pattern)| regex::Regex::new(pattern).ok().map(|re| re.is_match(a)))
                .unwrap_or(false),
            "in" => expected.as_array().map(|arr| arr.iter().any(|v| Some(v) == field_value)).unwrap_or(false),
            "notIn" => !expected.as_array().map(|arr| arr.iter().any(|v| Some(v) == field_value)).unwrap_or(false),
            _ => false,
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        _ => false,
    }
}

fn contains(field_value: Option<&Value>, expected: &Value) -> bool {
    match field_value {
        Some(Value::String(s)) => expected.as_str().map(|e| s.contains(e)).unwrap_or(false),
        Some(Value::Array(a)) => a.contains(expected),
        _ => false,
    }
}

fn as_str_pair<'a>(a: Option<&'a Value>, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a?.as_str()?, b.as_str()?))
}

fn compare(a: Option<&Value>, b: &Value) -> Option<std::cmp::Ordering> {
    let a = a?.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

#[async_trait]
impl ExecutableNode for ConditionNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: ConditionParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid condition parameters: {e}")))?;

        let mut results = Vec::with_capacity(params.conditions.len());
        let mut combined = params.combine_mode == "and";

        for predicate in &params.conditions {
            let field_value = get_path(&input, &predicate.field);
            let outcome = ConditionNode::evaluate_one(field_value, &predicate.operator, &predicate.value);
            results.push(outcome);

            match params.combine_mode.as_str() {
                "or" => {
                    if outcome {
                        combined = true;
                        break;
                    }
                }
                _ => {
                    if !outcome {
                        combined = false;
                        break;
                    }
                }
            }
        }

        if params.conditions.is_empty() {
            combined = false;
        }

        let branch = if combined { "true" } else { "false" };
        Ok(json!({ "result": combined, "branch": branch, "conditions": results }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use std::collections::HashMap;

    fn ctx_with_params(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "c1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn and_short_circuits_on_first_false() {
        let params = json!({
            "combine_mode": "and",
            "conditions": [
                {"field": "n", "operator": "greaterThan", "value": 10},
                {"field": "missing", "operator": "equals", "value": 1}
            ]
        });
        let ctx = ctx_with_params(params);
        let out = ConditionNode.execute(json!({"n": 3}), &ctx).await.unwrap();
        assert_eq!(out["result"], json!(false));
        assert_eq!(out["branch"], json!("false"));
    }

    #[tokio::test]
    async fn or_matches_on_first_true() {
        let params = json!({
            "combine_mode": "or",
            "conditions": [
                {"field": "n", "operator": "greaterThan", "value": 10}
            ]
        });
        let ctx = ctx_with_params(params);
        let out = ConditionNode.execute(json!({"n": 42}), &ctx).await.unwrap();
        assert_eq!(out["branch"], json!("true"));
    }
}
