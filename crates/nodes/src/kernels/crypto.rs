//! `crypto` node — `hash`, `hmac`, `base64Encode`/`base64Decode`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256, Sha512};

use crate::traits::{ExecutionContext, ExecutableNode};
use crate::NodeError;

#[derive(Debug, Deserialize)]
struct CryptoParams {
    operation: String,
    #[serde(default)]
    input: String,
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(default)]
    key: Option<String>,
}

fn default_algorithm() -> String {
    "sha256".to_string()
}

pub struct CryptoNode;

fn hex_hash(algorithm: &str, data: &[u8]) -> Result<String, String> {
    match algorithm {
        "md5" => Ok(hex::encode(Md5::digest(data))),
        "sha1" => Ok(hex::encode(sha1::Sha1::digest(data))),
        "sha256" => Ok(hex::encode(Sha256::digest(data))),
        "sha512" => Ok(hex::encode(Sha512::digest(data))),
        other => Err(format!("unsupported hash algorithm '{other}'")),
    }
}

fn hex_hmac(algorithm: &str, key: &[u8], data: &[u8]) -> Result<String, String> {
    match algorithm {
        "sha256" => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| e.to_string())?;
            mac.update(data);
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        "sha512" => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(|e| e.to_string())?;
            mac.update(data);
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        "md5" => {
            let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(|e| e.to_string())?;
            mac.update(data);
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        other => Err(format!("unsupported hmac algorithm '{other}'")),
    }
}

#[async_trait]
impl ExecutableNode for CryptoNode {
    async fn execute(&self, _input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let params: CryptoParams = serde_json::from_value(ctx.parameters.clone())
            .map_err(|e| NodeError::Fatal(format!("invalid crypto parameters: {e}")))?;

        let result = match params.operation.as_str() {
            "hash" => hex_hash(&params.algorithm, params.input.as_bytes()).map_err(NodeError::Fatal)?,
            "hmac" => {
                let key = params
                    .key
                    .ok_or_else(|| NodeError::Fatal("hmac requires 'key'".to_string()))?;
                hex_hmac(&params.algorithm, key.as_bytes(), params.input.as_bytes()).map_err(NodeError::Fatal)?
            }
            "base64Encode" => BASE64.encode(params.input.as_bytes()),
            "base64Decode" => {
                let bytes = BASE64
                    .decode(params.input.as_bytes())
                    .map_err(|e| NodeError::Fatal(format!("invalid base64 input: {e}")))?;
                String::from_utf8(bytes).map_err(|e| NodeError::Fatal(format!("decoded bytes are not utf-8: {e}")))?
            }
            other => return Err(NodeError::Fatal(format!("unsupported crypto operation '{other}'"))),
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
            node_id: "cr1".into(),
            parameters: params,
            input: Value::Null,
            secrets: HashMap::new(),
            node_outputs: HashMap::new(),
            deadline: Utc::now() + chrono::Duration::seconds(30),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn hash_defaults_to_sha256() {
        let out = CryptoNode
            .execute(Value::Null, &ctx(json!({"operation": "hash", "input": "abc"})))
            .await
            .unwrap();
        assert_eq!(
            out["result"],
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[tokio::test]
    async fn base64_round_trips() {
        let encoded = CryptoNode
            .execute(Value::Null, &ctx(json!({"operation": "base64Encode", "input": "hello"})))
            .await
            .unwrap();
        let encoded_str = encoded["result"].as_str().unwrap().to_string();
        let decoded = CryptoNode
            .execute(Value::Null, &ctx(json!({"operation": "base64Decode", "input": encoded_str})))
            .await
            .unwrap();
        assert_eq!(decoded["result"], json!("hello"));
    }
}
