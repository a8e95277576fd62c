//! Favorites, likes, shares, reviews and audience queries

use serde_json::{json, Value};
use sqlx::PgPool;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::models::friend::{parse_suggestions, SuggestionItem, SuggestionsReceived};
use crate::models::social::{
    parse_genre_list, CreateReviewRequest, CreateShareRequest, FavoriteRecord, FavoriteResponse,
    GeneratePostRequest, GenreUser, GenreUserRow, LikeToggled, ReviewRecord, ReviewResponse,
    SentimentAnalysisResponse, ShareResponse, SocialPosts, SocialStats, UsersByGenreResponse,
};
use crate::models::{AuthUser, MovieBrief, PageParams, Paginated};
use crate::services::{llm, movies, users};

const REVIEW_SELECT: &str = r#"
    SELECT r.*, m.imdb_id
    FROM reviews r
    JOIN movies m ON m.id = r.movie_id
"#;

// ============================================================================
// Favorites and likes
// ============================================================================

pub async fn list_favorites(
    db: &PgPool,
    user_id: i64,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<FavoriteResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let records = sqlx::query_as::<_, FavoriteRecord>(
        r#"
        SELECT id, movie_id, created_at FROM favorites
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let movie_ids: Vec<i64> = records.iter().map(|r| r.movie_id).collect();
    let mut movies = movies::load_by_ids(db, &movie_ids).await?;

    let results = records
        .into_iter()
        .filter_map(|r| {
            movies.remove(&r.movie_id).map(|movie| FavoriteResponse {
                id: r.id,
                movie,
                created_at: r.created_at,
            })
        })
        .collect();

    Ok(Paginated::new(count, params, results))
}

/// Adds a favorite; favoriting twice returns the existing row
pub async fn add_favorite(
    state: &AppState,
    user_id: i64,
    imdb_id: &str,
) -> AppResult<FavoriteResponse> {
    let movie = movies::resolve(state, imdb_id).await?;

    let record = sqlx::query_as::<_, FavoriteRecord>(
        r#"
        INSERT INTO favorites (user_id, movie_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, movie_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING id, movie_id, created_at
        "#,
    )
    .bind(user_id)
    .bind(movie.id)
    .fetch_one(&state.db)
    .await?;

    Ok(FavoriteResponse {
        id: record.id,
        movie,
        created_at: record.created_at,
    })
}

pub async fn remove_favorite(db: &PgPool, user_id: i64, imdb_id: &str) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM favorites f
        USING movies m
        WHERE f.movie_id = m.id AND f.user_id = $1 AND m.imdb_id = $2
        "#,
    )
    .bind(user_id)
    .bind(imdb_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Favorite not found."));
    }
    Ok(())
}

/// Removes the like if present, otherwise adds it
pub async fn toggle_like(state: &AppState, user_id: i64, imdb_id: &str) -> AppResult<LikeToggled> {
    let movie = movies::resolve(state, imdb_id).await?;

    let removed = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND movie_id = $2")
        .bind(user_id)
        .bind(movie.id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if removed > 0 {
        return Ok(LikeToggled { liked: false });
    }

    sqlx::query(
        "INSERT INTO likes (user_id, movie_id) VALUES ($1, $2) ON CONFLICT (user_id, movie_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(movie.id)
    .execute(&state.db)
    .await?;

    Ok(LikeToggled { liked: true })
}

pub async fn create_share(
    state: &AppState,
    user_id: i64,
    req: CreateShareRequest,
) -> AppResult<ShareResponse> {
    let movie = movies::resolve(state, &req.imdb_id).await?;

    let share = sqlx::query_as::<_, ShareResponse>(
        r#"
        INSERT INTO shares (user_id, movie_id, platform)
        VALUES ($1, $2, $3)
        RETURNING id, $4::text AS imdb_id, platform, created_at
        "#,
    )
    .bind(user_id)
    .bind(movie.id)
    .bind(req.platform.unwrap_or_default().trim())
    .bind(&movie.imdb_id)
    .fetch_one(&state.db)
    .await?;

    Ok(share)
}

// ============================================================================
// Reviews
// ============================================================================

async fn with_authors(db: &PgPool, records: Vec<ReviewRecord>) -> AppResult<Vec<ReviewResponse>> {
    let author_ids: Vec<i64> = records.iter().map(|r| r.user_id).collect();
    let authors = users::load_profiles(db, &author_ids).await?;
    Ok(records
        .into_iter()
        .map(|r| {
            let author = users::profile(&authors, r.user_id);
            ReviewResponse::new(r, author)
        })
        .collect())
}

/// Reviews newest first, optionally for one movie
pub async fn list_reviews(
    db: &PgPool,
    imdb_id: Option<&str>,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<ReviewResponse>> {
    let imdb_id = imdb_id.map(str::trim).filter(|id| !id.is_empty());

    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM reviews r
        JOIN movies m ON m.id = r.movie_id
        WHERE ($1::text IS NULL OR m.imdb_id = $1)
        "#,
    )
    .bind(imdb_id)
    .fetch_one(db)
    .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let sql = format!(
        "{} WHERE ($1::text IS NULL OR m.imdb_id = $1) ORDER BY r.created_at DESC LIMIT $2 OFFSET $3",
        REVIEW_SELECT
    );
    let records = sqlx::query_as::<_, ReviewRecord>(&sql)
        .bind(imdb_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

    let results = with_authors(db, records).await?;
    Ok(Paginated::new(count, params, results))
}

/// Stores a review with its LLM sentiment
pub async fn create_review(
    state: &AppState,
    user_id: i64,
    req: CreateReviewRequest,
) -> AppResult<ReviewResponse> {
    let movie = movies::resolve(state, &req.imdb_id).await?;
    let (overall, advanced) = llm::review_sentiment(state.llm.as_ref(), &req.content).await;

    let sql = format!(
        r#"
        WITH r AS (
            INSERT INTO reviews
                (user_id, movie_id, content, rating, sentiment, sentiment_confidence,
                 emotions, sentiment_breakdown)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        )
        {}
        "#,
        REVIEW_SELECT.replace("FROM reviews r", "FROM r")
    );

    let record = sqlx::query_as::<_, ReviewRecord>(&sql)
        .bind(user_id)
        .bind(movie.id)
        .bind(&req.content)
        .bind(req.rating)
        .bind(overall.as_str())
        .bind(advanced.confidence)
        .bind(advanced.emotions_value())
        .bind(advanced.breakdown_value())
        .fetch_one(&state.db)
        .await?;

    tracing::info!(
        user_id,
        review_id = record.id,
        imdb_id = %movie.imdb_id,
        sentiment = %overall,
        "Review created"
    );

    let author = users::get_profile(&state.db, user_id).await?;
    Ok(ReviewResponse::new(record, author))
}

/// Like/favorite/review counts for a stored movie
pub async fn stats(db: &PgPool, imdb_id: &str) -> AppResult<SocialStats> {
    let movie = movies::get_stored(db, imdb_id).await?;

    let stats = sqlx::query_as::<_, SocialStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM likes WHERE movie_id = $1) AS likes,
            (SELECT COUNT(*) FROM favorites WHERE movie_id = $1) AS favorites,
            (SELECT COUNT(*) FROM reviews WHERE movie_id = $1) AS reviews
        "#,
    )
    .bind(movie.id)
    .fetch_one(db)
    .await?;

    Ok(stats)
}

/// Re-runs detailed sentiment on one of the caller's reviews and stores it
pub async fn analyze_review(
    state: &AppState,
    user_id: i64,
    review_id: i64,
) -> AppResult<SentimentAnalysisResponse> {
    let sql = format!("{} WHERE r.id = $1 AND r.user_id = $2", REVIEW_SELECT);
    let review = sqlx::query_as::<_, ReviewRecord>(&sql)
        .bind(review_id)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found."))?;

    tracing::debug!(user_id, review_id, content_len = review.content.len(), "Analyzing review");
    let advanced = llm::advanced_sentiment(state.llm.as_ref(), &review.content).await;

    let overall = advanced
        .overall
        .map(|s| s.as_str().to_string())
        .unwrap_or(review.sentiment);
    let emotions = advanced.emotions_value();
    let breakdown = advanced.breakdown_value();

    sqlx::query(
        r#"
        UPDATE reviews
        SET sentiment = $2, sentiment_confidence = $3, emotions = $4, sentiment_breakdown = $5
        WHERE id = $1
        "#,
    )
    .bind(review.id)
    .bind(&overall)
    .bind(advanced.confidence)
    .bind(&emotions)
    .bind(&breakdown)
    .execute(&state.db)
    .await?;

    Ok(SentimentAnalysisResponse {
        id: review.id,
        overall,
        confidence: advanced.confidence,
        emotions,
        breakdown,
    })
}

// ============================================================================
// Generated content and audiences
// ============================================================================

pub async fn generate_post(
    state: &AppState,
    user: &AuthUser,
    req: GeneratePostRequest,
) -> AppResult<SocialPosts> {
    let movie = movies::get_stored(&state.db, &req.imdb_id).await?;
    let brief = MovieBrief::from(&movie);
    let preferences = req
        .preferences
        .filter(|p| !p.is_null())
        .unwrap_or_else(|| json!({}));
    let prompt_user = llm::prompt_user(user.id, Some(&user.username));

    Ok(llm::social_posts(state.llm.as_ref(), &brief, &prompt_user, &preferences).await)
}

/// Users who favorited or liked movies in any of the genres, minus anyone
/// notified in the last 24 hours
pub async fn users_by_genre(db: &PgPool, genres: Option<&str>) -> AppResult<UsersByGenreResponse> {
    let raw = genres
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| AppError::invalid("Query param 'genres' is required."))?;

    let genres = parse_genre_list(raw);
    if genres.is_empty() {
        return Ok(UsersByGenreResponse {
            users: Vec::new(),
            count: 0,
        });
    }

    let patterns: Vec<String> = genres
        .iter()
        .map(|g| format!("%{}%", users::escape_like(g)))
        .collect();

    let rows = sqlx::query_as::<_, GenreUserRow>(
        r#"
        WITH engagement AS (
            SELECT f.user_id, 'favorite' AS kind
            FROM favorites f JOIN movies m ON m.id = f.movie_id
            WHERE m.genre ILIKE ANY($1)
            UNION ALL
            SELECT l.user_id, 'like' AS kind
            FROM likes l JOIN movies m ON m.id = l.movie_id
            WHERE m.genre ILIKE ANY($1)
        )
        SELECT u.id, u.username, u.email,
            COUNT(*) FILTER (WHERE e.kind = 'favorite') AS favorites,
            COUNT(*) FILTER (WHERE e.kind = 'like') AS likes
        FROM engagement e
        JOIN users u ON u.id = e.user_id
        WHERE NOT EXISTS (
            SELECT 1 FROM notifications n
            WHERE n.user_id = u.id AND n.sent_at >= NOW() - INTERVAL '24 hours'
        )
        GROUP BY u.id, u.username, u.email
        ORDER BY u.id
        "#,
    )
    .bind(&patterns)
    .fetch_all(db)
    .await?;

    let users: Vec<GenreUser> = rows.into_iter().map(GenreUser::from).collect();
    Ok(UsersByGenreResponse {
        count: users.len(),
        users,
    })
}

async fn upsert_suggestion(db: &PgPool, user_id: i64, item: &SuggestionItem) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO friend_suggestions (user_id, suggested_user_id, similarity_score, shared_genres)
        VALUES ($1, $2, $3, COALESCE($4, '[]'::jsonb))
        ON CONFLICT (user_id, suggested_user_id) DO UPDATE SET
            similarity_score = COALESCE($3, friend_suggestions.similarity_score),
            shared_genres = COALESCE($4, friend_suggestions.shared_genres)
        "#,
    )
    .bind(user_id)
    .bind(item.suggested_user_id)
    .bind(item.similarity_score)
    .bind(&item.shared_genres)
    .execute(db)
    .await?;
    Ok(())
}

/// Stores suggestions pushed by the recommendation pipeline, item by item
pub async fn save_suggestions(
    db: &PgPool,
    user_id: i64,
    body: &Value,
) -> AppResult<SuggestionsReceived> {
    tracing::debug!(user_id, payload = %body, "Friend suggestions received");

    let mut saved = 0;
    for item in parse_suggestions(body) {
        match upsert_suggestion(db, user_id, &item).await {
            Ok(()) => saved += 1,
            Err(e) => tracing::warn!(
                user_id,
                suggested_user_id = item.suggested_user_id,
                error = %e,
                "Failed to store friend suggestion"
            ),
        }
    }

    Ok(SuggestionsReceived {
        detail: "Friend suggestions received.".to_string(),
        received: crate::models::analytics::is_truthy(body),
        saved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{insert_movie, insert_user};

    #[sqlx::test]
    async fn test_favorite_twice_returns_existing_row(db: PgPool) {
        let state = AppState::for_tests(db.clone());
        let neo = insert_user(&db, "neo").await;
        insert_movie(&db, "tt0133093", "The Matrix").await;

        let first = add_favorite(&state, neo, "tt0133093").await.unwrap();
        let second = add_favorite(&state, neo, "tt0133093").await.unwrap();
        assert_eq!(first.id, second.id);

        let favorites = list_favorites(&db, neo, PageParams::default(), 20).await.unwrap();
        assert_eq!(favorites.count, 1);
        assert_eq!(favorites.results[0].movie.imdb_id, "tt0133093");

        remove_favorite(&db, neo, "tt0133093").await.unwrap();
        let err = remove_favorite(&db, neo, "tt0133093").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[sqlx::test]
    async fn test_like_toggles_and_counts(db: PgPool) {
        let state = AppState::for_tests(db.clone());
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;
        insert_movie(&db, "tt0133093", "The Matrix").await;

        assert!(toggle_like(&state, neo, "tt0133093").await.unwrap().liked);
        assert!(toggle_like(&state, trinity, "tt0133093").await.unwrap().liked);
        assert!(!toggle_like(&state, neo, "tt0133093").await.unwrap().liked);

        let counts = stats(&db, "tt0133093").await.unwrap();
        assert_eq!(counts.likes, 1);
        assert_eq!(counts.favorites, 0);
        assert_eq!(counts.reviews, 0);
    }

    #[sqlx::test]
    async fn test_stats_for_unknown_movie_is_not_found(db: PgPool) {
        let err = stats(&db, "tt0000000").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[sqlx::test]
    async fn test_suggestions_upsert_and_skip_bad_items(db: PgPool) {
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;

        let body = json!({
            "suggestions": [
                { "suggested_user_id": trinity, "similarity_score": 0.8 },
                { "user_id": 999_999 },
                { "similarity_score": 0.1 }
            ]
        });
        let first = save_suggestions(&db, neo, &body).await.unwrap();
        assert_eq!(first.saved, 1);

        let second = save_suggestions(&db, neo, &body).await.unwrap();
        assert_eq!(second.saved, 1);

        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM friend_suggestions WHERE user_id = $1")
                .bind(neo)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }
}
