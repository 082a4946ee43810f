use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use super::extract::AuthUser;
use crate::{
    error::{AppError, AppResult},
    service::product::Tier,
    state::AppState,
};

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_basic_access(
    State(state): State<AppState>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    require_tier(state, user, Tier::Basic, request, next).await
}

pub async fn require_premium_access(
    State(state): State<AppState>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    require_tier(state, user, Tier::Premium, request, next).await
}

/// Rejects callers below `tier` and hands the computed access summary to the handler.
async fn require_tier(
    state: AppState,
    user: AuthUser,
    tier: Tier,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let access = state.services.subscriptions.access(&user.id).await?;
    if !access.allows(tier) {
        debug!("User {} denied {} content", user.id, tier);
        return Err(AppError::Forbidden(format!("An active {} subscription is required", tier)));
    }

    request.extensions_mut().insert(access);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Guards endpoints called by the desktop software with the shared client key.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> AppResult<Response> {
    let expected = state.config.licensing.client_api_key.as_bytes();
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();

    if provided.is_empty() || !bool::from(provided.ct_eq(expected)) {
        warn!("Rejected license request with missing or invalid API key");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}
