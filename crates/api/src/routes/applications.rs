use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use relay_domain::application::ApplicationSummary;
use relay_domain::pagination::PageParams;
use relay_domain::view::View;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ApplicationPayload {
    #[validate(length(min = 3, max = 50))]
    name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViewQuery {
    pub(crate) view: Option<String>,
}

pub(crate) fn parse_view(query: &Option<String>) -> Result<View, ApiError> {
    match query.as_deref() {
        None => Ok(View::default()),
        Some(raw) => View::parse(raw)
            .ok_or_else(|| ApiError::Validation("view must be summary or full".into())),
    }
}

impl PageQuery {
    pub(crate) fn params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ApplicationPayload>,
) -> Result<(StatusCode, Json<ApplicationSummary>), ApiError> {
    validation::validate(&payload)?;
    let summary = state.applications.create(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state.applications.list(query.params()).await?;
    Ok(Json(page))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Value>, ApiError> {
    let view = parse_view(&query.view)?;
    let application = state.applications.get_by_token(&token, view).await?;
    Ok(Json(application))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ApplicationPayload>,
) -> Result<Json<ApplicationSummary>, ApiError> {
    validation::validate(&payload)?;
    let summary = state
        .applications
        .update_by_token(&token, &payload.name)
        .await?;
    Ok(Json(summary))
}

pub(crate) async fn remove(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.applications.delete_by_token(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
