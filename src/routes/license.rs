use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::extract::{ApiJson, AuthUser};
use crate::{
    error::{AppError, AppResult},
    service::subscription::grants_access,
    state::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    licensee_number: String,
}

/// Called by the desktop software. A license is valid while the subscription it
/// was issued for grants access and the licensing service confirms it.
pub async fn validate(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ValidateRequest>,
) -> AppResult<Json<Value>> {
    let licensee_number = request.licensee_number.trim();
    if licensee_number.is_empty() {
        return Err(AppError::Validation("licenseeNumber is required".to_string()));
    }

    let Some((user_id, entry)) = state.services.subscriptions.find_by_licensee(licensee_number).await? else {
        debug!("Unknown licensee {}", licensee_number);
        return Ok(Json(json!({ "success": true, "valid": false })));
    };

    if !grants_access(&entry, Utc::now()) {
        info!("License {} of user {} has lapsed", licensee_number, user_id);
        return Ok(Json(json!({
            "success": true,
            "valid": false,
            "productId": entry.product_id,
            "tier": entry.tier,
        })));
    }

    let product = state
        .services
        .products
        .get(&entry.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", entry.product_id)))?;
    let valid = state.services.licenses.validate(licensee_number, &product).await?;

    Ok(Json(json!({
        "success": true,
        "valid": valid,
        "productId": entry.product_id,
        "tier": entry.tier,
        "expiresAt": entry.expires_at,
    })))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let now = Utc::now();
    let licenses: Vec<Value> = state
        .services
        .subscriptions
        .list(&user.id)
        .await?
        .into_iter()
        .filter(|view| view.entry.license_number.is_some())
        .map(|view| {
            json!({
                "productId": view.entry.product_id,
                "productName": view.entry.product_name,
                "licenseeNumber": view.entry.licensee_number,
                "licenseNumber": view.entry.license_number,
                "active": grants_access(&view.entry, now),
            })
        })
        .collect();

    Ok(Json(json!({ "success": true, "licenses": licenses })))
}
