use serde_json::Value;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::middleware::Caller;
use crate::models::analytics::{AnalyticsEvent, NewAnalyticsEvent};
use crate::models::{PageParams, Paginated};

/// Stores an event reported by the app or by the automation
pub async fn ingest(db: &PgPool, caller: &Caller, body: &Value) -> AppResult<AnalyticsEvent> {
    let event =
        NewAnalyticsEvent::from_body(body, caller.default_source()).map_err(AppError::invalid)?;

    let stored = sqlx::query_as::<_, AnalyticsEvent>(
        r#"
        INSERT INTO analytics_events (user_id, event, imdb_id, source, payload)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(caller.user_id())
    .bind(&event.event)
    .bind(&event.imdb_id)
    .bind(&event.source)
    .bind(&event.payload)
    .fetch_one(db)
    .await?;

    tracing::debug!(
        event_id = stored.id,
        event = %stored.event,
        source = %stored.source,
        user_id = ?stored.user_id,
        "Analytics event ingested"
    );
    Ok(stored)
}

/// The user's own events, newest first
pub async fn list(
    db: &PgPool,
    user_id: i64,
    imdb_id: Option<&str>,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<AnalyticsEvent>> {
    let imdb_id = imdb_id.map(str::trim).filter(|id| !id.is_empty());

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM analytics_events WHERE user_id = $1 AND ($2::text IS NULL OR imdb_id = $2)",
    )
    .bind(user_id)
    .bind(imdb_id)
    .fetch_one(db)
    .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let events = sqlx::query_as::<_, AnalyticsEvent>(
        r#"
        SELECT * FROM analytics_events
        WHERE user_id = $1 AND ($2::text IS NULL OR imdb_id = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(imdb_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(Paginated::new(count, params, events))
}
