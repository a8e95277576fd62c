use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::api::{AppState, JsonBody};
use crate::error::AppResult;
use crate::middleware::Caller;
use crate::models::analytics::{AnalyticsEvent, EventListQuery};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::analytics;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest/", post(ingest))
        .route("/events/", get(events))
}

/// Accepts events from users or from the automation workflow
async fn ingest(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<(StatusCode, Json<AnalyticsEvent>)> {
    let event = analytics::ingest(&state.db, &caller, &body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn events(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<EventListQuery>,
) -> AppResult<Json<Paginated<AnalyticsEvent>>> {
    let page = PageParams { page: query.page };
    let events = analytics::list(
        &state.db,
        user.id,
        query.imdb_id.as_deref(),
        page,
        state.page_size(),
    )
    .await?;
    Ok(Json(events))
}
