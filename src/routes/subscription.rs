use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::extract::{ApiJson, AuthUser};
use crate::{
    error::AppResult,
    service::subscription::{CreateSubscriptionRequest, UpgradeRequest},
    state::AppState,
};

pub async fn list_products(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let products = state.services.products.list().await?;
    Ok(Json(json!({ "success": true, "products": products })))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let subscriptions = state.services.subscriptions.list(&user.id).await?;
    Ok(Json(json!({ "success": true, "subscriptions": subscriptions })))
}

pub async fn access(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let access = state.services.subscriptions.access(&user.id).await?;
    Ok(Json(json!({ "success": true, "access": access })))
}

pub async fn trial_eligibility(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> AppResult<Json<Value>> {
    let eligibility = state
        .services
        .subscriptions
        .trial_eligibility(&user.id, &product_id)
        .await?;
    Ok(Json(json!({ "success": true, "eligibility": eligibility })))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<CreateSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let subscription = state.services.subscriptions.create(&user.id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "subscription": subscription })),
    ))
}

pub async fn upgrade(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<UpgradeRequest>,
) -> AppResult<Json<Value>> {
    let subscription = state.services.subscriptions.upgrade(&user.id, request).await?;
    Ok(Json(json!({ "success": true, "subscription": subscription })))
}

pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> AppResult<Json<Value>> {
    let subscription = state.services.subscriptions.cancel(&user.id, &product_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Subscription will not renew",
        "subscription": subscription,
    })))
}

pub async fn reactivate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> AppResult<Json<Value>> {
    let subscription = state.services.subscriptions.reactivate(&user.id, &product_id).await?;
    Ok(Json(json!({ "success": true, "subscription": subscription })))
}
