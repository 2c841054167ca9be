//! `email` and `slack` — at-least-once notification delivery. Failures
//! bubble up as [`NodeError::Retryable`] and are subject to the node's
//! retry policy like any other outbound call.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct EmailParams {
    to: String,
    subject: String,
    #[serde(default)]
    body: String,
}

/// Abstraction over the outbound transport so the kernel is testable
/// without a real SMTP/Slack endpoint.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, channel: &str, target: &str, payload: &Value) -> Result<(), String>;
}

/// Logs the message instead of delivering it — the default transport until
/// a concrete provider is wired in via configuration.
pub struct LoggingTransport;

#[async_trait]
impl MessageTransport for LoggingTransport {
    async fn send(&self, channel: &str, target: &str, payload: &Value) -> Result<(), String> {
        tracing::info!(channel, target, ?payload, "dispatching message");
        Ok(())
    }
}

pub struct MessagingNode {
    channel: &'static str,
    transport: Box<dyn MessageTransport>,
}

impl MessagingNode {
    pub fn email(transport: Box<dyn MessageTransport>) -> Self {
        Self { channel: "email", transport }
    }

    pub fn slack(transport: Box<dyn MessageTransport>) -> Self {
        Self { channel: "slack", transport }
    }
}

#[async_trait]
impl ExecutableNode for MessagingNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        let (target, payload) = match self.channel {
            "email" => {
                let params: EmailParams = serde_json::from_value(ctx.parameters.clone())
                    .map_err(|e| NodeError::Fatal(format!("invalid email parameters: {e}")))?;
                let target = params.to.clone();
                (target, json!({ "subject": params.subject, "body": params.body }))
            }
            _ => {
                let channel = ctx
                    .parameters
                    .get("channel")
                    .and_then(Value::as_str)
                    .ok_or_else(|| NodeError::Fatal("slack node requires 'channel'".to_string()))?
                    .to_string();
                let text = ctx.parameters.get("text").cloned().unwrap_or(Value::Null);
                (channel, json!({ "text": text }))
            }
        };

        self.transport
            .send(self.channel, &target, &payload)
            .await
            .map_err(NodeError::Retryable)?;

        Ok(json!({ "sent": true, "channel": self.channel, "target": target }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CancellationToken;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport(Arc<AtomicUsize>);

    #[async_trait]
    impl MessageTransport for CountingTransport {
        async fn send(&self, _channel: &str, _target: &str, _payload: &Value) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ctx(params: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: uuid::Uuid::new_v4(),
            execution_id: uuid::Uuid::new_v4(),
            node_id: "e1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn email_dispatches_exactly_once_on_success() {
        let count = Arc::new(AtomicUsize::new(0));
        let node = MessagingNode::email(Box::new(CountingTransport(count.clone())));
        let params = json!({"to": "a@b.com", "subject": "hi", "body": "there"});
        let out = node.execute(Value::Null, &ctx(params)).await.unwrap();
        assert_eq!(out["sent"], json!(true));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
