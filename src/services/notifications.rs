use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::notification::{
    merge_template_type, BulkCreateRequest, BulkCreated, BulkPushItem, BulkPushResult,
    GenerateNotificationRequest, GeneratedNotification, Notification, NotificationMessage,
};
use crate::models::{AuthUser, PageParams, Paginated};
use crate::services::llm;

const MAX_TITLE_CHARS: usize = 200;

fn clamp_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

fn object_or_empty(data: Option<Value>) -> Value {
    match data {
        Some(value @ Value::Object(_)) => value,
        _ => json!({}),
    }
}

pub async fn list(
    db: &PgPool,
    user_id: i64,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<Notification>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1
        ORDER BY sent_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(Paginated::new(count, params, notifications))
}

async fn insert(
    db: &PgPool,
    user_id: i64,
    message: &NotificationMessage,
    data: &Value,
    delivered: bool,
) -> AppResult<Notification> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, title, body, data, delivered)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(clamp_title(&message.title))
    .bind(&message.body)
    .bind(data)
    .bind(delivered)
    .fetch_one(db)
    .await?;
    Ok(notification)
}

/// Drafts a notification for the caller, pushes it when a device token is
/// given, and stores it with the delivery outcome
pub async fn generate(
    state: &AppState,
    user: &AuthUser,
    req: GenerateNotificationRequest,
) -> AppResult<GeneratedNotification> {
    let prompt_user = llm::prompt_user(user.id, Some(&user.username));
    let message = llm::notification_message(state.llm.as_ref(), &prompt_user, &req.context).await;

    let device_token = req.device_token().map(str::to_string);
    let data = object_or_empty(req.data);

    let delivered = match device_token {
        Some(token) => {
            state
                .push
                .send(&token, &message.title, &message.body, &data)
                .await
        }
        None => false,
    };

    let notification = insert(&state.db, user.id, &message, &data, delivered).await?;
    tracing::info!(
        user_id = user.id,
        notification_id = notification.id,
        delivered,
        "Notification generated"
    );

    Ok(GeneratedNotification {
        notification,
        generated: message,
    })
}

/// Drafts one notification per user without pushing; unknown user ids are skipped
pub async fn bulk_create(state: &AppState, req: BulkCreateRequest) -> AppResult<BulkCreated> {
    let known: HashSet<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
        .bind(&req.user_ids)
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .collect();

    let data = merge_template_type(req.data.as_ref(), req.template_type.as_deref());

    let mut notifications = Vec::with_capacity(req.user_ids.len());
    for user_id in req.user_ids {
        if !known.contains(&user_id) {
            tracing::warn!(user_id, "Skipping notification for unknown user");
            continue;
        }
        let prompt_user = llm::prompt_user(user_id, None);
        let message =
            llm::notification_message(state.llm.as_ref(), &prompt_user, &req.context).await;
        notifications.push(insert(&state.db, user_id, &message, &data, false).await?);
    }

    tracing::info!(count = notifications.len(), "Notifications bulk created");
    Ok(BulkCreated {
        count: notifications.len(),
        notifications,
    })
}

/// Pushes the caller's stored notifications and marks the delivered ones
///
/// Items naming someone else's (or a missing) notification are skipped and
/// do not count as attempted.
pub async fn bulk_push(
    state: &AppState,
    user_id: i64,
    items: Vec<BulkPushItem>,
) -> AppResult<BulkPushResult> {
    let ids: Vec<i64> = items.iter().map(|i| i.notification_id).collect();
    let owned: HashMap<i64, Notification> = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = $1 AND id = ANY($2)",
    )
    .bind(user_id)
    .bind(&ids)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(|n| (n.id, n))
    .collect();

    let mut result = BulkPushResult::default();
    let mut delivered_ids = Vec::new();

    for item in items {
        let token = item.device_token.trim();
        let Some(notification) = owned.get(&item.notification_id) else {
            continue;
        };
        if token.is_empty() {
            continue;
        }

        result.attempted += 1;
        let delivered = state
            .push
            .send(token, &notification.title, &notification.body, &notification.data)
            .await;
        if delivered {
            result.delivered += 1;
            delivered_ids.push(notification.id);
        }
    }

    if !delivered_ids.is_empty() {
        sqlx::query("UPDATE notifications SET delivered = TRUE WHERE id = ANY($1)")
            .bind(&delivered_ids)
            .execute(&state.db)
            .await?;
    }

    tracing::info!(
        user_id,
        attempted = result.attempted,
        delivered = result.delivered,
        "Bulk push finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_title_counts_chars() {
        let long = "é".repeat(250);
        assert_eq!(clamp_title(&long).chars().count(), 200);
        assert_eq!(clamp_title("Tonight"), "Tonight");
    }

    #[test]
    fn test_object_or_empty() {
        assert_eq!(object_or_empty(None), json!({}));
        assert_eq!(object_or_empty(Some(json!([1]))), json!({}));
        assert_eq!(object_or_empty(Some(json!({ "a": 1 }))), json!({ "a": 1 }));
    }
}
