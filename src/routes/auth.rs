use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::extract::{ApiJson, AuthUser};
use crate::{
    error::AppResult,
    service::auth::{Credentials, PublicUser, RegisterRequest, User},
    state::AppState,
};

#[derive(Serialize)]
pub struct SessionResponse {
    success: bool,
    token: String,
    user: PublicUser,
}

impl SessionResponse {
    fn new(user: &User, token: String) -> Self {
        Self {
            success: true,
            token,
            user: PublicUser::from(user),
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<Json<SessionResponse>> {
    let (user, token) = state.services.auth.register(request).await?;
    Ok(Json(SessionResponse::new(&user, token)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> AppResult<Json<SessionResponse>> {
    let (user, token) = state.services.auth.login(credentials).await?;
    info!("User {} logged in", user.id);
    Ok(Json(SessionResponse::new(&user, token)))
}

pub async fn google(State(state): State<AppState>) -> AppResult<Redirect> {
    let url = state.services.auth.google_authorization_url().await?;
    Ok(Redirect::temporary(&url))
}

#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Always lands the browser back on the frontend, with either a token or an error code.
pub async fn google_callback(State(state): State<AppState>, Query(callback): Query<OAuthCallback>) -> Redirect {
    let frontend = state.config.server.frontend_url.trim_end_matches('/');

    let (Some(code), Some(nonce)) = (callback.code, callback.state) else {
        warn!("Google callback without code: {:?}", callback.error);
        return Redirect::temporary(&format!("{}/login?error=oauth_denied", frontend));
    };

    match state.services.auth.google_callback(&code, &nonce).await {
        Ok((user, token)) => {
            info!("User {} signed in with Google", user.id);
            Redirect::temporary(&format!("{}/auth/callback?token={}", frontend, token))
        }
        Err(e) => {
            warn!("Google sign-in failed: {}", e);
            Redirect::temporary(&format!("{}/login?error=oauth_failed", frontend))
        }
    }
}

#[derive(Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    token: String,
}

pub async fn verify_email(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> AppResult<Json<Value>> {
    state.services.auth.verify_email(&query.token).await?;
    Ok(Json(json!({ "success": true, "message": "Email verified" })))
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    email: String,
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    state.services.auth.forgot_password(&request.email).await?;
    Ok(Json(json!({
        "success": true,
        "message": "If an account exists for this email, a reset link has been sent",
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    new_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    state
        .services
        .auth
        .reset_password(&request.token, &request.new_password)
        .await?;
    Ok(Json(json!({ "success": true, "message": "Password updated" })))
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    let user = state.services.auth.get_user(&user.id).await?;
    Ok(Json(json!({ "success": true, "user": PublicUser::from(&user) })))
}
