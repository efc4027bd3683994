use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

/// Provider status notifications. No session auth on this route; the payload
/// authenticates itself through the per-gateway HMAC signature, which is
/// checked over the raw bytes before anything is parsed.
pub async fn callback(
    State(state): State<AppState>,
    Path(gateway_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    let tx = state
        .orchestrator
        .ingest_webhook(gateway_id, &body, signature)
        .await?;

    Ok(Json(json!({
        "transaction_id": tx.id,
        "status": tx.status,
    })))
}
