use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{error::AppResult, service::subscription::AccessSummary, state::AppState};

pub async fn courses(
    State(state): State<AppState>,
    Extension(access): Extension<AccessSummary>,
) -> AppResult<Json<Value>> {
    let courses = state.services.content.courses(&access).await?;
    Ok(Json(json!({ "success": true, "courses": courses })))
}

pub async fn course(
    State(state): State<AppState>,
    Extension(access): Extension<AccessSummary>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let course = state.services.content.course(&id, &access).await?;
    Ok(Json(json!({ "success": true, "course": course })))
}

pub async fn downloads(
    State(state): State<AppState>,
    Extension(access): Extension<AccessSummary>,
) -> AppResult<Json<Value>> {
    let downloads = state.services.content.downloads(&access).await?;
    Ok(Json(json!({ "success": true, "downloads": downloads })))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(access): Extension<AccessSummary>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (download, content) = state.services.content.open_download(&id, &access).await?;

    let mut response = content.body.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(length) = content.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    let disposition = format!("attachment; filename=\"{}\"", download.file_name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

pub async fn rooms(
    State(state): State<AppState>,
    Extension(access): Extension<AccessSummary>,
) -> AppResult<Json<Value>> {
    let rooms = state.services.content.rooms(&access).await?;
    Ok(Json(json!({ "success": true, "rooms": rooms })))
}
