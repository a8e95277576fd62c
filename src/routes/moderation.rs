use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::Value;

use crate::api::{AppState, JsonBody};
use crate::error::AppResult;
use crate::middleware::{Caller, StaffUser};
use crate::models::moderation::{ModerationItem, QueueListQuery, UpdateModerationRequest};
use crate::models::{PageParams, Paginated};
use crate::services::moderation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest/", post(ingest))
        .route("/queue/", get(queue))
        .route("/queue/:id/", patch(update))
}

async fn ingest(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<(StatusCode, Json<ModerationItem>)> {
    let item = moderation::ingest(&state.db, &caller, &body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn queue(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<QueueListQuery>,
) -> AppResult<Json<Paginated<ModerationItem>>> {
    let page = PageParams { page: query.page };
    let items = moderation::list(&state.db, query.status.as_deref(), page, state.page_size())
        .await?;
    Ok(Json(items))
}

async fn update(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UpdateModerationRequest>,
) -> AppResult<Json<ModerationItem>> {
    Ok(Json(moderation::update(&state.db, staff.id, id, req).await?))
}
