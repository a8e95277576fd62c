use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::{AppState, JsonBody, ValidatedJson};
use crate::error::AppResult;
use crate::models::user::{
    LoginRequest, RefreshRequest, RegisterRequest, TokenPair, UpdateProfileRequest,
    UserSearchQuery, VerifyRequest,
};
use crate::models::{AuthUser, PageParams, Paginated, UserProfile};
use crate::services::users;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/token/refresh/", post(refresh))
        .route("/token/verify/", post(verify))
        .route("/logout/", post(logout))
        .route("/me/", get(me).patch(update_me))
        .route("/users/search/", get(search))
}

async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let profile = users::register(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    Ok(Json(users::login(&state, req).await?))
}

async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    Ok(Json(users::refresh(&state, req.refresh.as_deref()).await?))
}

async fn verify(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<VerifyRequest>,
) -> AppResult<Json<Value>> {
    users::verify(&state, &req.token).await?;
    Ok(Json(json!({})))
}

/// Blacklists the presented refresh token
async fn logout(
    State(state): State<AppState>,
    _user: AuthUser,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    users::logout(&state, req.refresh.as_deref()).await?;
    Ok((StatusCode::RESET_CONTENT, Json(json!({ "detail": "Logged out." }))))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(users::get_profile(&state.db, user.id).await?))
}

async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(users::update_profile(&state.db, user.id, req).await?))
}

async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserSearchQuery>,
) -> AppResult<Json<Paginated<UserProfile>>> {
    let page = PageParams { page: query.page };
    let results = users::search(
        &state.db,
        user.id,
        query.q.as_deref(),
        page,
        state.page_size(),
    )
    .await?;
    Ok(Json(results))
}
