use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::api::AppState;
use crate::error::AppResult;
use crate::middleware::LlmUser;
use crate::models::movie::{MovieSearchQuery, ReviewSummary};
use crate::models::{AuthUser, Movie, PageParams, Paginated};
use crate::services::movies;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search/", get(search))
        .route("/popular/", get(popular))
        .route("/:imdb_id/", get(detail))
        .route("/:imdb_id/review-summary/", get(review_summary))
}

/// Raw catalog search results
async fn search(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<MovieSearchQuery>,
) -> AppResult<Json<Value>> {
    let results = movies::search(&state, query.q.as_deref(), query.page).await?;
    Ok(Json(results))
}

async fn popular(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<Movie>>> {
    Ok(Json(movies::popular(&state.db, page, state.page_size()).await?))
}

async fn detail(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(imdb_id): Path<String>,
) -> AppResult<Json<Movie>> {
    Ok(Json(movies::resolve(&state, &imdb_id).await?))
}

async fn review_summary(
    State(state): State<AppState>,
    _user: LlmUser,
    Path(imdb_id): Path<String>,
) -> AppResult<Json<ReviewSummary>> {
    Ok(Json(movies::review_summary(&state, &imdb_id).await?))
}
