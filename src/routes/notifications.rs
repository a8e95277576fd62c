use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::{AppState, JsonBody, ValidatedJson};
use crate::error::AppResult;
use crate::middleware::LlmUser;
use crate::models::notification::{
    BulkCreateRequest, BulkCreated, BulkPushRequest, BulkPushResult,
    GenerateNotificationRequest, GeneratedNotification, Notification,
};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::notifications;

/// Mounted with `merge` so the list route keeps its trailing slash
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/", get(list))
        .route("/notifications/generate/", post(generate))
        .route("/notifications/bulk-create/", post(bulk_create))
        .route("/notifications/bulk-push/", post(bulk_push))
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<Notification>>> {
    let notifications =
        notifications::list(&state.db, user.id, page, state.page_size()).await?;
    Ok(Json(notifications))
}

async fn generate(
    State(state): State<AppState>,
    LlmUser(user): LlmUser,
    JsonBody(req): JsonBody<GenerateNotificationRequest>,
) -> AppResult<(StatusCode, Json<GeneratedNotification>)> {
    let generated = notifications::generate(&state, &user, req).await?;
    Ok((StatusCode::CREATED, Json(generated)))
}

async fn bulk_create(
    State(state): State<AppState>,
    _user: LlmUser,
    ValidatedJson(req): ValidatedJson<BulkCreateRequest>,
) -> AppResult<(StatusCode, Json<BulkCreated>)> {
    let created = notifications::bulk_create(&state, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn bulk_push(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<BulkPushRequest>,
) -> AppResult<Json<BulkPushResult>> {
    Ok(Json(notifications::bulk_push(&state, user.id, req.items).await?))
}
