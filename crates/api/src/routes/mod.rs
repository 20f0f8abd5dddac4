mod applications;
mod chats;
mod messages;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::Serialize;

use crate::middleware as app_middleware;
use crate::observability;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/applications",
            post(applications::create).get(applications::list),
        )
        .route(
            "/applications/:token",
            get(applications::get)
                .put(applications::update)
                .delete(applications::remove),
        )
        .route(
            "/applications/:token/chats",
            post(chats::create).get(chats::list),
        )
        .route(
            "/applications/:token/chats/:number",
            get(chats::get).delete(chats::remove),
        )
        .route(
            "/applications/:token/chats/:number/messages",
            post(messages::create).get(messages::list),
        )
        .route(
            "/applications/:token/chats/:number/messages/search",
            get(messages::search),
        )
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> impl IntoResponse {
    match observability::render_metrics() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
