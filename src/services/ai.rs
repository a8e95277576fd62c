//! Personalized recommendations and LLM diagnostics

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};

use crate::api::AppState;
use crate::cached;
use crate::db::{CacheKey, DEFAULT_TTL};
use crate::error::AppResult;
use crate::models::split_genres;
use crate::services::llm::{self, LlmHealth};

#[derive(Debug, FromRow)]
struct EngagedMovie {
    imdb_id: String,
    title: String,
    genre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ReviewTaste {
    pub content: String,
    pub sentiment: String,
    pub rating: Option<i16>,
}

fn movie_entry(movie: EngagedMovie) -> Value {
    json!({
        "imdb_id": movie.imdb_id,
        "title": movie.title,
        "genres": split_genres(&movie.genre),
    })
}

async fn engaged_movies(db: &PgPool, table: &str, user_id: i64) -> AppResult<Vec<Value>> {
    let sql = format!(
        r#"
        SELECT m.imdb_id, m.title, m.genre
        FROM {} e
        JOIN movies m ON m.id = e.movie_id
        WHERE e.user_id = $1
        ORDER BY e.created_at DESC
        "#,
        table
    );
    let movies = sqlx::query_as::<_, EngagedMovie>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await?;
    Ok(movies.into_iter().map(movie_entry).collect())
}

/// Favorites, likes and reviews handed to the recommender
pub async fn taste_context(db: &PgPool, user_id: i64) -> AppResult<Value> {
    let favorites = engaged_movies(db, "favorites", user_id).await?;
    let likes = engaged_movies(db, "likes", user_id).await?;
    let reviews = sqlx::query_as::<_, ReviewTaste>(
        "SELECT content, sentiment, rating FROM reviews WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(json!({
        "favorites": favorites,
        "likes": likes,
        "reviews": reviews,
    }))
}

/// LLM recommendations for the user, cached for an hour once the model
/// produced a usable list
pub async fn recommendations(state: &AppState, user_id: i64) -> AppResult<Vec<Value>> {
    if !state.llm.is_configured() {
        return Ok(Vec::new());
    }

    let context = taste_context(&state.db, user_id).await?;
    let model = state.llm.clone();
    let key = CacheKey::Recommendations(user_id);

    let picks: Result<Vec<Value>, ()> = cached!(state.cache, key, DEFAULT_TTL, async {
        llm::recommendations(model.as_ref(), &context).await.ok_or(())
    });
    Ok(picks.unwrap_or_default())
}

pub async fn healthcheck(state: &AppState) -> LlmHealth {
    llm::healthcheck(state.llm.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_entry_splits_genres() {
        let entry = movie_entry(EngagedMovie {
            imdb_id: "tt0133093".to_string(),
            title: "The Matrix".to_string(),
            genre: "Action, Sci-Fi".to_string(),
        });
        assert_eq!(
            entry,
            json!({
                "imdb_id": "tt0133093",
                "title": "The Matrix",
                "genres": ["Action", "Sci-Fi"],
            })
        );
    }
}
