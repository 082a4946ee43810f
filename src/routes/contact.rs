use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::ApiJson;
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    utils::validate_email,
};

const MAX_MESSAGE_LEN: usize = 5000;

#[derive(Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    message: String,
}

pub async fn contact(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ContactRequest>,
) -> AppResult<Json<Value>> {
    let name = request.name.trim();
    let email = request.email.trim();
    let message = request.message.trim();

    if name.is_empty() || message.is_empty() {
        return Err(AppError::Validation("Name and message are required".to_string()));
    }
    if !validate_email(email) {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation("Message is too long".to_string()));
    }

    state.services.email.send_contact_request(name, email, message).await?;
    Ok(Json(json!({ "success": true, "message": "Thanks, we will get back to you soon" })))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.storage.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            error!("Health check database ping failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "success": true,
        "status": "ok",
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
