use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::Value;

use crate::api::{AppState, JsonBody, ValidatedJson};
use crate::error::AppResult;
use crate::middleware::LlmUser;
use crate::models::friend::SuggestionsReceived;
use crate::models::social::{
    CreateReviewRequest, CreateShareRequest, FavoriteResponse, GeneratePostRequest, LikeToggled,
    MovieRef, ReviewListQuery, ReviewResponse, SentimentAnalysisResponse, ShareResponse,
    SocialPosts, SocialStats, UsersByGenreQuery, UsersByGenreResponse,
};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::social;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/favorites/", get(list_favorites).post(add_favorite))
        .route("/favorites/:imdb_id/", delete(remove_favorite))
        .route("/likes/toggle/", post(toggle_like))
        .route("/shares/", post(create_share))
        .route("/reviews/", get(list_reviews).post(create_review))
        .route("/stats/:imdb_id/", get(stats))
        .route("/sentiment-analysis/:review_id/", get(sentiment_analysis))
        .route("/generate-post/", post(generate_post))
        .route("/users-by-genre/", get(users_by_genre))
        .route("/friend-suggestions/", post(friend_suggestions))
}

// ============================================================================
// Favorites, likes, shares
// ============================================================================

async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<FavoriteResponse>>> {
    let favorites = social::list_favorites(&state.db, user.id, page, state.page_size()).await?;
    Ok(Json(favorites))
}

async fn add_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<MovieRef>,
) -> AppResult<(StatusCode, Json<FavoriteResponse>)> {
    let favorite = social::add_favorite(&state, user.id, &req.imdb_id).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(imdb_id): Path<String>,
) -> AppResult<StatusCode> {
    social::remove_favorite(&state.db, user.id, &imdb_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<MovieRef>,
) -> AppResult<Json<LikeToggled>> {
    Ok(Json(social::toggle_like(&state, user.id, &req.imdb_id).await?))
}

async fn create_share(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateShareRequest>,
) -> AppResult<(StatusCode, Json<ShareResponse>)> {
    let share = social::create_share(&state, user.id, req).await?;
    Ok((StatusCode::CREATED, Json(share)))
}

// ============================================================================
// Reviews and stats
// ============================================================================

async fn list_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ReviewListQuery>,
) -> AppResult<Json<Paginated<ReviewResponse>>> {
    let page = PageParams { page: query.page };
    let reviews = social::list_reviews(
        &state.db,
        query.imdb_id.as_deref(),
        page,
        state.page_size(),
    )
    .await?;
    Ok(Json(reviews))
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let review = social::create_review(&state, user.id, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn stats(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(imdb_id): Path<String>,
) -> AppResult<Json<SocialStats>> {
    Ok(Json(social::stats(&state.db, &imdb_id).await?))
}

// ============================================================================
// LLM-backed endpoints
// ============================================================================

async fn sentiment_analysis(
    State(state): State<AppState>,
    LlmUser(user): LlmUser,
    Path(review_id): Path<i64>,
) -> AppResult<Json<SentimentAnalysisResponse>> {
    Ok(Json(social::analyze_review(&state, user.id, review_id).await?))
}

async fn generate_post(
    State(state): State<AppState>,
    LlmUser(user): LlmUser,
    ValidatedJson(req): ValidatedJson<GeneratePostRequest>,
) -> AppResult<Json<SocialPosts>> {
    Ok(Json(social::generate_post(&state, &user, req).await?))
}

async fn users_by_genre(
    State(state): State<AppState>,
    _user: LlmUser,
    Query(query): Query<UsersByGenreQuery>,
) -> AppResult<Json<UsersByGenreResponse>> {
    Ok(Json(social::users_by_genre(&state.db, query.genres.as_deref()).await?))
}

/// Accepts suggestion batches of any shape; unusable items are skipped
async fn friend_suggestions(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<(StatusCode, Json<SuggestionsReceived>)> {
    let received = social::save_suggestions(&state.db, user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(received)))
}
