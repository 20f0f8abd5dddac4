use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use relay_domain::message::{MessageSort, MessageSummary};
use relay_domain::pagination::PageParams;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct MessagePayload {
    #[validate(length(min = 1))]
    body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(alias = "sortBy")]
    sort_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchParams {
    query: Option<String>,
    page: Option<u64>,
    limit: Option<u64>,
    partial: Option<bool>,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Path((token, number)): Path<(String, i64)>,
    Json(payload): Json<MessagePayload>,
) -> Result<(StatusCode, Json<MessageSummary>), ApiError> {
    validation::validate(&payload)?;
    let summary = state.messages.create(&token, number, &payload.body).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Path((token, number)): Path<(String, i64)>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let sort = match query.sort_by.as_deref() {
        None => MessageSort::default(),
        Some(raw) => MessageSort::parse(raw)
            .ok_or_else(|| ApiError::Validation("sort_by must be number or created_at".into()))?,
    };
    let params = PageParams::new(query.page, query.limit);
    let page = state.messages.list(&token, number, params, sort).await?;
    Ok(Json(page))
}

pub(crate) async fn search(
    State(state): State<AppState>,
    Path((token, number)): Path<(String, i64)>,
    Query(query): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let text = query
        .query
        .as_deref()
        .ok_or_else(|| ApiError::Validation("query is required".into()))?;
    let params = PageParams::new(query.page, query.limit);
    let results = state
        .messages
        .search(&token, number, text, query.partial.unwrap_or(false), params)
        .await?;
    Ok(Json(results))
}
