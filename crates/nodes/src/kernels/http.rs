//! `http_request` node — outbound HTTP with template interpolation and a
//! deadline clamped to the node's remaining budget.
//!
//! Retries on 429/502/503/504 are surfaced as [`NodeError::Retryable`] and
//! handled by the orchestrator's generic backoff (spec.md §4.3), not
//! repeated here — a node kernel performs one attempt per invocation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::expr::{render_template, Resolver};
use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

const RETRYABLE_STATUSES: &[u16] = &[429, 502, 503, 504];

#[derive(Debug, Deserialize)]
struct HttpParams {
    method: String,
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    query: HashMap<String, String>,
    #[serde(default)]
    body: Value,
}

struct InputResolver<'a>(&'a Value);

impl Resolver for InputResolver<'_> {
    fn resolve(&self, reference: &str) -> Option<Value> {
        crate::expr::get_path(self.0, reference).cloned()
    }
}

pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ExecutableNode for HttpRequestNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: HttpParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid http_request parameters: {e}")))?;

        let resolver = InputResolver(&input);
        let url = render_template(&params.url, &resolver);

        let method = reqwest::Method::from_str(&params.method)
            .map_err(|_| NodeError::Fatal(format!("unsupported HTTP method '{}'", params.method)))?;

        let remaining = ctx.time_remaining();
        if remaining.num_milliseconds() <= 0 {
            return Err(NodeError::Timeout);
        }
        let timeout = std::time::Duration::from_millis(remaining.num_milliseconds() as u64);

        let mut request = self.client.request(method, &url).timeout(timeout);
        for (key, value) in &params.query {
            request = request.query(&[(key, value)]);
        }
        for (key, value) in &params.headers {
            request = request.header(key, value);
        }
        if !params.body.is_null() {
            request = request.json(&params.body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Retryable(format!("http request timed out: {e}"))
            } else {
                NodeError::Retryable(format!("http request failed: {e}"))
            }
        })?;

        let status = response.status();
        if RETRYABLE_STATUSES.contains(&status.as_u16()) {
            return Err(NodeError::Retryable(format!("upstream returned {status}")));
        }
        if !status.is_success() {
            return Err(NodeError::Fatal(format!("upstream returned {status}")));
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(json!({ "status": status.as_u16(), "body": body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec_list() {
        assert_eq!(RETRYABLE_STATUSES, &[429, 502, 503, 504]);
    }

    #[test]
    fn template_interpolates_url_from_input() {
        let input = json!({"id": "42"});
        let resolver = InputResolver(&input);
        let url = render_template("https://api.example.com/users/{{id}}", &resolver);
        assert_eq!(url, "https://api.example.com/users/42");
    }
}
