use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};

use crate::api::{AppState, JsonBody};
use crate::error::AppResult;
use crate::models::friend::{
    CreateFriendRequest, FriendRequestResponse, FriendshipResponse, UpdateFriendRequest,
};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::friends;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friend-requests/", get(list_requests).post(send_request))
        .route("/friend-requests/:id/", patch(respond))
        .route("/friends/", get(list_friends))
        .route("/friends/:user_id/", delete(unfriend))
}

async fn list_requests(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<FriendRequestResponse>>> {
    let requests = friends::list_requests(&state.db, user.id, page, state.page_size()).await?;
    Ok(Json(requests))
}

async fn send_request(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreateFriendRequest>,
) -> AppResult<(StatusCode, Json<FriendRequestResponse>)> {
    let request = friends::send_request(&state.db, user.id, req.to_user_id).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn respond(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UpdateFriendRequest>,
) -> AppResult<Json<FriendRequestResponse>> {
    let request = friends::respond(&state.db, user.id, id, req.action.as_deref()).await?;
    Ok(Json(request))
}

async fn list_friends(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<FriendshipResponse>>> {
    let friendships = friends::list_friends(&state.db, user.id, page, state.page_size()).await?;
    Ok(Json(friendships))
}

async fn unfriend(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    friends::unfriend(&state.db, user.id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
