use axum::{extract::State, routing::get, Json, Router};
use serde_json::Value;

use crate::api::AppState;
use crate::error::AppResult;
use crate::middleware::LlmUser;
use crate::services::ai;
use crate::services::llm::LlmHealth;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recommendations/", get(recommendations))
        .route("/healthcheck/", get(healthcheck))
}

/// Recommendations drawn from the caller's favorites, likes and reviews
async fn recommendations(
    State(state): State<AppState>,
    LlmUser(user): LlmUser,
) -> AppResult<Json<Vec<Value>>> {
    Ok(Json(ai::recommendations(&state, user.id).await?))
}

async fn healthcheck(State(state): State<AppState>, _user: LlmUser) -> Json<LlmHealth> {
    Json(ai::healthcheck(&state).await)
}
