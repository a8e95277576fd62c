use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::{AppState, JsonBody, ValidatedJson};
use crate::error::AppResult;
use crate::models::movie_night::{
    CreateMovieNightRequest, InviteRequest, MovieNightResponse, ParticipantResponse,
    RespondRequest, UpdateMovieNightRequest, VoteRequest, VoteResponse, VoteTally,
};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::movie_nights;

/// Paths carry their own `/movie-nights` prefix so the list keeps its trailing slash
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/movie-nights/", get(list).post(create))
        .route("/movie-nights/:id/", get(detail).patch(update).delete(remove))
        .route("/movie-nights/:id/join/", post(join).delete(leave))
        .route("/movie-nights/:id/request/", post(request))
        .route("/movie-nights/:id/respond/", post(respond))
        .route("/movie-nights/:id/invite/", post(invite))
        .route("/movie-nights/:id/participants/:user_id/approve/", post(approve))
        .route("/movie-nights/:id/vote/", post(vote))
        .route("/movie-nights/:id/votes/", get(votes))
}

async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<MovieNightResponse>>> {
    Ok(Json(movie_nights::list(&state.db, page, state.page_size()).await?))
}

async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateMovieNightRequest>,
) -> AppResult<(StatusCode, Json<MovieNightResponse>)> {
    let night = movie_nights::create(&state.db, user.id, req).await?;
    Ok((StatusCode::CREATED, Json(night)))
}

async fn detail(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MovieNightResponse>> {
    Ok(Json(movie_nights::get(&state.db, id).await?))
}

async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateMovieNightRequest>,
) -> AppResult<Json<MovieNightResponse>> {
    Ok(Json(movie_nights::update(&state.db, user.id, id, req).await?))
}

async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    movie_nights::delete(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Participation
// ============================================================================

async fn join(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ParticipantResponse>> {
    Ok(Json(movie_nights::join(&state.db, user.id, id).await?))
}

async fn leave(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    movie_nights::leave(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ParticipantResponse>> {
    Ok(Json(movie_nights::request(&state.db, user.id, id).await?))
}

async fn respond(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<RespondRequest>,
) -> AppResult<Json<ParticipantResponse>> {
    Ok(Json(
        movie_nights::respond(&state.db, user.id, id, &req.status).await?,
    ))
}

async fn invite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<InviteRequest>,
) -> AppResult<Json<ParticipantResponse>> {
    Ok(Json(
        movie_nights::invite(&state.db, user.id, id, req.user_id).await?,
    ))
}

async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> AppResult<Json<ParticipantResponse>> {
    Ok(Json(
        movie_nights::approve(&state.db, user.id, id, user_id).await?,
    ))
}

// ============================================================================
// Votes
// ============================================================================

async fn vote(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<VoteRequest>,
) -> AppResult<(StatusCode, Json<VoteResponse>)> {
    let vote = movie_nights::vote(&state, user.id, id, &req.movie_imdb_id).await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

async fn votes(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<VoteTally>>> {
    Ok(Json(movie_nights::tally(&state.db, id).await?))
}
