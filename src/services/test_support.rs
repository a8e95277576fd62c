//! Row fixtures for database-backed tests

use sqlx::PgPool;

use crate::models::Movie;

pub async fn insert_user(db: &PgPool, username: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, 'x') RETURNING id",
    )
    .bind(username)
    .bind(format!("{}@example.com", username))
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn insert_movie(db: &PgPool, imdb_id: &str, title: &str) -> Movie {
    sqlx::query_as::<_, Movie>(
        "INSERT INTO movies (imdb_id, title, genre) VALUES ($1, $2, 'Action, Sci-Fi') RETURNING *",
    )
    .bind(imdb_id)
    .bind(title)
    .fetch_one(db)
    .await
    .unwrap()
}
