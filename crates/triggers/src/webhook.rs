//! Synchronous webhook ingress (spec.md §4.7): matches an inbound request
//! against active webhook triggers by `(path, method)`, verifies the
//! optional HMAC secret, and submits directly to the queue.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use engine::models::{ExecutionRequest, Priority, TriggerKind};
use hmac::{Hmac, Mac};
use queue::{PriorityQueue, QueuedItem};
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

use crate::convert::row_to_trigger;
use crate::error::TriggerError;

type HmacSha256 = Hmac<Sha256>;

/// The signature header carries a base64-encoded HMAC-SHA256 digest of the
/// raw request body, keyed by the trigger's `hmac_secret`.
fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Matches inbound webhooks against every active `(path, method)` trigger
/// and enqueues one `ExecutionRequest` per match. Returns the ids of the
/// requests that were submitted.
pub async fn ingest(
    pool: &db::DbPool,
    queue: &Arc<PriorityQueue>,
    path: &str,
    method: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<Vec<Uuid>, TriggerError> {
    let rows = db::repository::triggers::find_webhook(pool, path, method).await?;
    if rows.is_empty() {
        return Err(TriggerError::NotFound);
    }

    let input_data = serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));
    let mut submitted = Vec::new();

    for row in rows {
        let trigger = match row_to_trigger(&row) {
            Ok(trigger) => trigger,
            Err(err) => {
                warn!(trigger_id = %row.id, %err, "failed to decode webhook trigger, skipping");
                continue;
            }
        };

        let TriggerKind::Webhook { hmac_secret, .. } = &trigger.kind else { continue };

        if let Some(secret) = hmac_secret {
            let signature_valid = signature.map(|sig| verify_signature(secret, body, sig)).unwrap_or(false);
            if !signature_valid {
                db::repository::triggers::record_error(pool, trigger.id).await?;
                return Err(TriggerError::InvalidSignature);
            }
        }

        let request = ExecutionRequest::new(trigger.workflow_id, Priority::Normal, input_data.clone());
        queue.enqueue(QueuedItem::new(request.clone())).await?;
        db::repository::triggers::record_fire(pool, trigger.id, chrono::Utc::now()).await?;
        submitted.push(request.id);
    }

    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_through_hmac_and_base64() {
        let secret = "shh";
        let body = b"{\"n\":1}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = BASE64.encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, body, &digest));
        assert!(!verify_signature(secret, body, "bm90dGhlcmlnaHRzaWc="));
    }
}
