use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::AppState;

/// Matches `(path, method)` against active webhook triggers, verifies the
/// optional HMAC signature, and admits one `ExecutionRequest` per match
/// (spec.md §4.7) — the same queue path a schedule trigger or the `execute`
/// API handler uses, so a webhook never bypasses admission control.
pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok());

    match triggers::webhook::ingest(&state.pool, &state.queue, &path, "POST", &body[..], signature).await {
        Ok(submitted) => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "submitted": submitted })),
        )),
        Err(triggers::TriggerError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(triggers::TriggerError::InvalidSignature) => Err(StatusCode::UNAUTHORIZED),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
