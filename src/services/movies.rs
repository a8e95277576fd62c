//! Locally stored movies backed by the external catalog

use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;

use crate::api::AppState;
use crate::cached;
use crate::db::{CacheKey, DEFAULT_TTL};
use crate::error::{AppError, AppResult};
use crate::models::movie::ReviewSummary;
use crate::models::{Movie, MovieBrief, NewMovie, PageParams, Paginated};
use crate::services::catalog::is_not_found;
use crate::services::llm;

pub const MOVIE_NOT_FOUND: &str = "Movie not found.";

pub async fn find_by_imdb_id<'e>(
    db: impl PgExecutor<'e>,
    imdb_id: &str,
) -> AppResult<Option<Movie>> {
    let movie = sqlx::query_as::<_, Movie>("SELECT * FROM movies WHERE imdb_id = $1")
        .bind(imdb_id)
        .fetch_optional(db)
        .await?;
    Ok(movie)
}

/// Stored movie or 404, without consulting the catalog
pub async fn get_stored(db: &PgPool, imdb_id: &str) -> AppResult<Movie> {
    find_by_imdb_id(db, imdb_id)
        .await?
        .ok_or_else(|| AppError::not_found(MOVIE_NOT_FOUND))
}

/// Loads stored movies by primary key
pub async fn load_by_ids(db: &PgPool, ids: &[i64]) -> AppResult<HashMap<i64, Movie>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let movies = sqlx::query_as::<_, Movie>("SELECT * FROM movies WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(db)
        .await?;
    Ok(movies.into_iter().map(|m| (m.id, m)).collect())
}

async fn insert(db: &PgPool, movie: NewMovie) -> AppResult<Movie> {
    // A concurrent fetch of the same id may win the insert; keep its row.
    let stored = sqlx::query_as::<_, Movie>(
        r#"
        INSERT INTO movies (imdb_id, title, year, poster, plot, genre, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (imdb_id) DO UPDATE SET imdb_id = EXCLUDED.imdb_id
        RETURNING *
        "#,
    )
    .bind(&movie.imdb_id)
    .bind(&movie.title)
    .bind(&movie.year)
    .bind(&movie.poster)
    .bind(&movie.plot)
    .bind(&movie.genre)
    .bind(&movie.data)
    .fetch_one(db)
    .await?;
    Ok(stored)
}

/// Returns the stored movie, fetching and storing it from the catalog first
/// when it is not known locally
pub async fn resolve(state: &AppState, imdb_id: &str) -> AppResult<Movie> {
    let imdb_id = imdb_id.trim();
    if let Some(movie) = find_by_imdb_id(&state.db, imdb_id).await? {
        return Ok(movie);
    }

    let payload = state
        .catalog
        .details(imdb_id)
        .await?
        .filter(|p| !is_not_found(p))
        .ok_or_else(|| AppError::not_found(MOVIE_NOT_FOUND))?;

    let mut new_movie = NewMovie::from_catalog(&payload);
    if new_movie.imdb_id.is_empty() {
        new_movie.imdb_id = imdb_id.to_string();
    }

    let movie = insert(&state.db, new_movie).await?;
    tracing::info!(
        imdb_id = %movie.imdb_id,
        catalog = state.catalog.name(),
        "Stored movie from catalog"
    );
    Ok(movie)
}

/// Raw catalog search, cached per (query, page)
pub async fn search(state: &AppState, query: Option<&str>, page: Option<u32>) -> AppResult<Value> {
    let query = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::invalid("Query param 'q' is required."))?;
    let page = page.unwrap_or(1).max(1);

    let key = CacheKey::MovieSearch {
        query: query.to_string(),
        page,
    };

    let catalog = state.catalog.clone();
    cached!(state.cache, key, DEFAULT_TTL, async {
        catalog.search(query, page).await
    })
    .map_err(|e: AppError| {
        tracing::warn!(error = %e, query, "Catalog search failed");
        AppError::invalid(e.to_string())
    })
}

/// Stored movies ordered by engagement
pub async fn popular(db: &PgPool, params: PageParams, page_size: i64) -> AppResult<Paginated<Movie>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let movies = sqlx::query_as::<_, Movie>(
        r#"
        SELECT m.*
        FROM movies m
        LEFT JOIN (SELECT movie_id, COUNT(*) AS n FROM favorites GROUP BY movie_id) f
            ON f.movie_id = m.id
        LEFT JOIN (SELECT movie_id, COUNT(*) AS n FROM likes GROUP BY movie_id) l
            ON l.movie_id = m.id
        ORDER BY COALESCE(f.n, 0) DESC, COALESCE(l.n, 0) DESC, m.updated_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(Paginated::new(count, params, movies))
}

/// LLM summary of a movie's reviews, cached until the review count changes
pub async fn review_summary(state: &AppState, imdb_id: &str) -> AppResult<ReviewSummary> {
    let movie = resolve(state, imdb_id).await?;

    let reviews: Vec<String> = sqlx::query_scalar(
        "SELECT content FROM reviews WHERE movie_id = $1 ORDER BY created_at DESC",
    )
    .bind(movie.id)
    .fetch_all(&state.db)
    .await?;

    if reviews.is_empty() || !state.llm.is_configured() {
        return Ok(ReviewSummary::default());
    }

    let key = CacheKey::ReviewSummary {
        imdb_id: movie.imdb_id.clone(),
        review_count: reviews.len(),
    };
    let brief = MovieBrief::from(&movie);
    let model = state.llm.clone();

    let summary: Result<ReviewSummary, ()> = cached!(state.cache, key, DEFAULT_TTL, async {
        llm::summarize_reviews(model.as_ref(), &brief, &reviews)
            .await
            .ok_or(())
    });
    Ok(summary.unwrap_or_default())
}

