use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use relay_domain::chat::ChatSummary;
use serde_json::Value;

use super::applications::{PageQuery, ViewQuery, parse_view};
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) async fn create(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<ChatSummary>), ApiError> {
    let summary = state.chats.create(&token).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state.chats.list(&token, query.params()).await?;
    Ok(Json(page))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path((token, number)): Path<(String, i64)>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Value>, ApiError> {
    let view = parse_view(&query.view)?;
    let chat = state.chats.get(&token, number, view).await?;
    Ok(Json(chat))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path((token, number)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    state.chats.delete(&token, number).await?;
    Ok(StatusCode::NO_CONTENT)
}
