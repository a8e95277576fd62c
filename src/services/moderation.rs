use serde_json::Value;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::middleware::Caller;
use crate::models::moderation::{ModerationItem, NewModerationItem, UpdateModerationRequest};
use crate::models::{PageParams, Paginated};

pub async fn ingest(db: &PgPool, caller: &Caller, body: &Value) -> AppResult<ModerationItem> {
    let item = NewModerationItem::from_body(body).map_err(AppError::invalid)?;

    let stored = sqlx::query_as::<_, ModerationItem>(
        r#"
        INSERT INTO moderation_queue (content_type, content_id, user_id, reason, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&item.content_type)
    .bind(item.content_id)
    .bind(caller.user_id())
    .bind(&item.reason)
    .bind(&item.metadata)
    .fetch_one(db)
    .await?;

    tracing::info!(
        item_id = stored.id,
        content_type = %stored.content_type,
        content_id = ?stored.content_id,
        "Content queued for moderation"
    );
    Ok(stored)
}

/// Queue items newest first, optionally filtered by status
pub async fn list(
    db: &PgPool,
    status: Option<&str>,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<ModerationItem>> {
    let status = status.map(str::trim).filter(|s| !s.is_empty());

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM moderation_queue WHERE ($1::text IS NULL OR status = $1)",
    )
    .bind(status)
    .fetch_one(db)
    .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let items = sqlx::query_as::<_, ModerationItem>(
        r#"
        SELECT * FROM moderation_queue
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(Paginated::new(count, params, items))
}

/// Staff update; an item that ends up approved or rejected records who resolved it
pub async fn update(
    db: &PgPool,
    staff_id: i64,
    item_id: i64,
    req: UpdateModerationRequest,
) -> AppResult<ModerationItem> {
    if let Some(reason) = &req.reason {
        if reason.chars().count() > 128 {
            return Err(AppError::invalid("'reason' must be at most 128 characters."));
        }
    }

    let item = sqlx::query_as::<_, ModerationItem>(
        r#"
        UPDATE moderation_queue SET
            status = COALESCE($2, status),
            reason = COALESCE($3, reason),
            metadata = COALESCE($4, metadata),
            resolved_by_id = CASE
                WHEN COALESCE($2, status) IN ('approved', 'rejected') THEN $5
                ELSE resolved_by_id
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(req.status.map(|s| s.as_str()))
    .bind(req.reason.as_deref().map(str::trim))
    .bind(&req.metadata)
    .bind(staff_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::not_found("Moderation item not found."))?;

    tracing::info!(item_id, staff_id, status = %item.status, "Moderation item updated");
    Ok(item)
}
