use axum::{
    http::{HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::AppState;
use crate::config::Config;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

pub mod ai;
pub mod analytics;
pub mod auth;
pub mod friends;
pub mod moderation;
pub mod movie_nights;
pub mod movies;
pub mod notifications;
pub mod social;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins; no configured origins allows any
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/movies", movies::router())
        .nest(
            "/social",
            social::router()
                .merge(friends::router())
                .merge(movie_nights::router()),
        )
        .merge(notifications::router())
        .nest("/ai", ai::router())
        .nest("/analytics", analytics::router())
        .nest("/moderation", moderation::router())
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
