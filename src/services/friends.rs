use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::friend::{
    FriendRequestAction, FriendRequestRecord, FriendRequestResponse, FriendRequestStatus,
    FriendshipRecord, FriendshipResponse,
};
use crate::models::{PageParams, Paginated};
use crate::services::users;

async fn to_responses(
    db: &PgPool,
    records: Vec<FriendRequestRecord>,
) -> AppResult<Vec<FriendRequestResponse>> {
    let ids: Vec<i64> = records
        .iter()
        .flat_map(|r| [r.from_user_id, r.to_user_id])
        .collect();
    let profiles = users::load_profiles(db, &ids).await?;

    Ok(records
        .into_iter()
        .map(|r| FriendRequestResponse {
            id: r.id,
            from_user: users::profile(&profiles, r.from_user_id),
            to_user: users::profile(&profiles, r.to_user_id),
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

/// Requests the user sent or received, newest first
pub async fn list_requests(
    db: &PgPool,
    user_id: i64,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<FriendRequestResponse>> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM friend_requests WHERE from_user_id = $1 OR to_user_id = $1",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let records = sqlx::query_as::<_, FriendRequestRecord>(
        r#"
        SELECT * FROM friend_requests
        WHERE from_user_id = $1 OR to_user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let results = to_responses(db, records).await?;
    Ok(Paginated::new(count, params, results))
}

/// Sends a pending request; an existing request to the same user is returned unchanged
pub async fn send_request(
    db: &PgPool,
    from_user_id: i64,
    to_user_id: i64,
) -> AppResult<FriendRequestResponse> {
    if !users::exists(db, to_user_id).await? {
        return Err(AppError::invalid("User not found."));
    }
    if to_user_id == from_user_id {
        return Err(AppError::invalid("Cannot send a friend request to yourself."));
    }

    let record = sqlx::query_as::<_, FriendRequestRecord>(
        r#"
        INSERT INTO friend_requests (from_user_id, to_user_id, status)
        VALUES ($1, $2, $3)
        ON CONFLICT (from_user_id, to_user_id) DO UPDATE SET from_user_id = EXCLUDED.from_user_id
        RETURNING *
        "#,
    )
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(FriendRequestStatus::Pending.as_str())
    .fetch_one(db)
    .await?;

    tracing::info!(request_id = record.id, from_user_id, to_user_id, "Friend request sent");
    to_single(db, record).await
}

async fn to_single(db: &PgPool, record: FriendRequestRecord) -> AppResult<FriendRequestResponse> {
    to_responses(db, vec![record])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("friend request vanished".to_string()))
}

/// Accepts or declines a request; only its recipient may do so
///
/// Accepting writes the status and both friendship directions in one
/// transaction.
pub async fn respond(
    db: &PgPool,
    user_id: i64,
    request_id: i64,
    action: Option<&str>,
) -> AppResult<FriendRequestResponse> {
    let mut tx = db.begin().await?;

    let request = sqlx::query_as::<_, FriendRequestRecord>(
        "SELECT * FROM friend_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Friend request not found."))?;

    if request.to_user_id != user_id {
        return Err(AppError::forbidden(
            "Only the recipient can update this request.",
        ));
    }

    let action = FriendRequestAction::parse(action)
        .ok_or_else(|| AppError::invalid("Invalid action."))?;

    let updated = sqlx::query_as::<_, FriendRequestRecord>(
        "UPDATE friend_requests SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(request.id)
    .bind(action.resulting_status().as_str())
    .fetch_one(&mut *tx)
    .await?;

    if action == FriendRequestAction::Accept {
        sqlx::query(
            r#"
            INSERT INTO friendships (user_id, friend_id)
            VALUES ($1, $2), ($2, $1)
            ON CONFLICT (user_id, friend_id) DO NOTHING
            "#,
        )
        .bind(request.from_user_id)
        .bind(request.to_user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        request_id,
        user_id,
        status = %updated.status,
        "Friend request answered"
    );
    to_single(db, updated).await
}

/// The user's friends, newest first
pub async fn list_friends(
    db: &PgPool,
    user_id: i64,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<FriendshipResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM friendships WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let records = sqlx::query_as::<_, FriendshipRecord>(
        r#"
        SELECT * FROM friendships
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

    let ids: Vec<i64> = records
        .iter()
        .flat_map(|r| [r.user_id, r.friend_id])
        .collect();
    let profiles = users::load_profiles(db, &ids).await?;

    let results = records
        .into_iter()
        .map(|r| FriendshipResponse {
            id: r.id,
            user: users::profile(&profiles, r.user_id),
            friend: users::profile(&profiles, r.friend_id),
            created_at: r.created_at,
        })
        .collect();

    Ok(Paginated::new(count, params, results))
}

/// Removes the friendship in both directions; removing a non-friend is a no-op
///
/// Requests between the pair go too, so either side can send a fresh one.
pub async fn unfriend(db: &PgPool, user_id: i64, friend_id: i64) -> AppResult<()> {
    let mut tx = db.begin().await?;

    let removed = sqlx::query(
        r#"
        DELETE FROM friendships
        WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        DELETE FROM friend_requests
        WHERE (from_user_id = $1 AND to_user_id = $2) OR (from_user_id = $2 AND to_user_id = $1)
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, friend_id, removed, "Friendship removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::insert_user;

    #[sqlx::test]
    async fn test_request_can_be_sent_again_after_unfriending(db: PgPool) {
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;

        let request = send_request(&db, neo, trinity).await.unwrap();
        respond(&db, trinity, request.id, Some("accept")).await.unwrap();
        assert_eq!(list_friends(&db, neo, PageParams::default(), 20).await.unwrap().count, 1);

        unfriend(&db, neo, trinity).await.unwrap();
        assert_eq!(list_friends(&db, neo, PageParams::default(), 20).await.unwrap().count, 0);
        assert_eq!(list_friends(&db, trinity, PageParams::default(), 20).await.unwrap().count, 0);

        let again = send_request(&db, neo, trinity).await.unwrap();
        assert_eq!(again.status, FriendRequestStatus::Pending.as_str());
    }

    #[sqlx::test]
    async fn test_repeated_request_returns_existing_row(db: PgPool) {
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;

        let first = send_request(&db, neo, trinity).await.unwrap();
        let second = send_request(&db, neo, trinity).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[sqlx::test]
    async fn test_only_recipient_answers(db: PgPool) {
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;

        let request = send_request(&db, neo, trinity).await.unwrap();
        let err = respond(&db, neo, request.id, Some("accept")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
