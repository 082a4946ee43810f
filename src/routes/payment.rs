use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use super::extract::AuthUser;
use crate::{
    error::AppResult,
    service::payment::PaymentError,
    state::AppState,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe webhook endpoint. The raw body is needed for signature verification.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(PaymentError::InvalidWebhookSignature)?;

    let outcome = state.services.subscriptions.handle_webhook(&body, signature).await?;
    Ok(Json(json!({ "success": true, "received": true, "outcome": outcome })))
}

pub async fn history(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let payments = state.services.subscriptions.payment_history(&user.id).await?;
    Ok(Json(json!({ "success": true, "payments": payments })))
}
