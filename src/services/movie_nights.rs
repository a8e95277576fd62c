//! Movie nights: events, participation and votes
//!
//! Every participation change that can end in `accepted` runs inside a
//! transaction holding `SELECT ... FOR UPDATE` on the movie night row, so two
//! concurrent joins cannot both take the last seat.

use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::models::movie_night::{
    can_vote, transition, CreateMovieNightRequest, MovieNightRecord, MovieNightResponse,
    NightContext, ParticipantAction, ParticipantRecord, ParticipantResponse, ParticipantStatus,
    TransitionError, UpdateMovieNightRequest, VoteCountRow, VoteRecord, VoteResponse, VoteTally,
};
use crate::models::{PageParams, Paginated};
use crate::services::{movies, users};

pub const NIGHT_NOT_FOUND: &str = "Movie night not found.";

// ============================================================================
// Loading
// ============================================================================

async fn find(db: &PgPool, night_id: i64) -> AppResult<MovieNightRecord> {
    sqlx::query_as::<_, MovieNightRecord>("SELECT * FROM movie_nights WHERE id = $1")
        .bind(night_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found(NIGHT_NOT_FOUND))
}

async fn lock(conn: &mut PgConnection, night_id: i64) -> AppResult<MovieNightRecord> {
    sqlx::query_as::<_, MovieNightRecord>("SELECT * FROM movie_nights WHERE id = $1 FOR UPDATE")
        .bind(night_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found(NIGHT_NOT_FOUND))
}

async fn find_participant<'e>(
    db: impl sqlx::PgExecutor<'e>,
    night_id: i64,
    user_id: i64,
) -> AppResult<Option<ParticipantRecord>> {
    let participant = sqlx::query_as::<_, ParticipantRecord>(
        "SELECT * FROM movie_night_participants WHERE movie_night_id = $1 AND user_id = $2",
    )
    .bind(night_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(participant)
}

/// Attaches organizers and participant lists to a page of nights
async fn to_responses(
    db: &PgPool,
    nights: Vec<MovieNightRecord>,
) -> AppResult<Vec<MovieNightResponse>> {
    let night_ids: Vec<i64> = nights.iter().map(|n| n.id).collect();
    let participants = sqlx::query_as::<_, ParticipantRecord>(
        r#"
        SELECT * FROM movie_night_participants
        WHERE movie_night_id = ANY($1)
        ORDER BY joined_at, id
        "#,
    )
    .bind(&night_ids)
    .fetch_all(db)
    .await?;

    let user_ids: Vec<i64> = nights
        .iter()
        .map(|n| n.organizer_id)
        .chain(participants.iter().map(|p| p.user_id))
        .collect();
    let profiles = users::load_profiles(db, &user_ids).await?;

    let mut by_night: HashMap<i64, Vec<ParticipantResponse>> = HashMap::new();
    for p in participants {
        by_night
            .entry(p.movie_night_id)
            .or_default()
            .push(participant_response(&profiles, p));
    }

    Ok(nights
        .into_iter()
        .map(|night| {
            let organizer = users::profile(&profiles, night.organizer_id);
            let participants = by_night.remove(&night.id).unwrap_or_default();
            MovieNightResponse::new(night, organizer, participants)
        })
        .collect())
}

fn participant_response(
    profiles: &HashMap<i64, crate::models::UserProfile>,
    p: ParticipantRecord,
) -> ParticipantResponse {
    ParticipantResponse {
        id: p.id,
        user: users::profile(profiles, p.user_id),
        status: p.status,
        joined_at: p.joined_at,
    }
}

// ============================================================================
// Movie night CRUD
// ============================================================================

pub async fn list(
    db: &PgPool,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<MovieNightResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie_nights")
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let nights = sqlx::query_as::<_, MovieNightRecord>(
        "SELECT * FROM movie_nights ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let results = to_responses(db, nights).await?;
    Ok(Paginated::new(count, params, results))
}

pub async fn get(db: &PgPool, night_id: i64) -> AppResult<MovieNightResponse> {
    let night = find(db, night_id).await?;
    to_responses(db, vec![night])
        .await?
        .pop()
        .ok_or_else(|| AppError::not_found(NIGHT_NOT_FOUND))
}

/// Creates a night with the organizer as its first accepted participant
pub async fn create(
    db: &PgPool,
    organizer_id: i64,
    req: CreateMovieNightRequest,
) -> AppResult<MovieNightResponse> {
    let mut tx = db.begin().await?;

    let night = sqlx::query_as::<_, MovieNightRecord>(
        r#"
        INSERT INTO movie_nights
            (organizer_id, title, description, scheduled_date, location, max_participants)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(organizer_id)
    .bind(req.title.trim())
    .bind(req.description.unwrap_or_default())
    .bind(req.scheduled_date)
    .bind(req.location.unwrap_or_default())
    .bind(req.max_participants)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO movie_night_participants (movie_night_id, user_id, status)
        VALUES ($1, $2, $3)
        ON CONFLICT (movie_night_id, user_id) DO NOTHING
        "#,
    )
    .bind(night.id)
    .bind(organizer_id)
    .bind(ParticipantStatus::Accepted.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(movie_night_id = night.id, organizer_id, "Movie night created");
    get(db, night.id).await
}

/// Organizer-only edit of the night's details and status
pub async fn update(
    db: &PgPool,
    user_id: i64,
    night_id: i64,
    req: UpdateMovieNightRequest,
) -> AppResult<MovieNightResponse> {
    let night = find(db, night_id).await?;
    if !night.is_organizer(user_id) {
        return Err(AppError::forbidden(
            "Only the organizer can update this movie night.",
        ));
    }
    if !req.capacity_is_valid() {
        return Err(AppError::invalid("max_participants must be at least 1"));
    }

    let (capacity_set, capacity) = match req.max_participants {
        Some(value) => (true, value),
        None => (false, None),
    };

    sqlx::query(
        r#"
        UPDATE movie_nights SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            scheduled_date = COALESCE($4, scheduled_date),
            location = COALESCE($5, location),
            max_participants = CASE WHEN $6 THEN $7 ELSE max_participants END,
            status = COALESCE($8, status),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(night.id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description)
    .bind(req.scheduled_date)
    .bind(req.location)
    .bind(capacity_set)
    .bind(capacity)
    .bind(req.status.map(|s| s.as_str()))
    .execute(db)
    .await?;

    tracing::info!(movie_night_id = night.id, user_id, "Movie night updated");
    get(db, night.id).await
}

pub async fn delete(db: &PgPool, user_id: i64, night_id: i64) -> AppResult<()> {
    let night = find(db, night_id).await?;
    if !night.is_organizer(user_id) {
        return Err(AppError::forbidden(
            "Only the organizer can delete this movie night.",
        ));
    }

    sqlx::query("DELETE FROM movie_nights WHERE id = $1")
        .bind(night.id)
        .execute(db)
        .await?;

    tracing::info!(movie_night_id = night.id, user_id, "Movie night deleted");
    Ok(())
}

// ============================================================================
// Participation
// ============================================================================

/// Applies one state-machine step to `target_id`'s participation
///
/// `actor_id` is the caller. Invites and approvals are organizer-only and
/// target another user; the other actions target the caller.
async fn apply(
    db: &PgPool,
    actor_id: i64,
    night_id: i64,
    target_id: i64,
    action: ParticipantAction,
) -> AppResult<ParticipantResponse> {
    let mut tx = db.begin().await?;
    let night = lock(&mut *tx, night_id).await?;

    if matches!(action, ParticipantAction::Invite | ParticipantAction::Approve)
        && !night.is_organizer(actor_id)
    {
        return Err(AppError::forbidden(
            "Only the organizer can manage participants.",
        ));
    }

    let current = find_participant(&mut *tx, night.id, target_id).await?;
    let current_status = current.as_ref().and_then(ParticipantRecord::participant_status);

    let accepted_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM movie_night_participants WHERE movie_night_id = $1 AND status = $2",
    )
    .bind(night.id)
    .bind(ParticipantStatus::Accepted.as_str())
    .fetch_one(&mut *tx)
    .await?;

    let ctx = NightContext {
        status: night.night_status(),
        max_participants: night.max_participants,
        accepted_count,
    };
    let next = transition(current_status, action, &ctx)?;

    let participant = match current {
        Some(row) if current_status == Some(next) => row,
        _ => {
            sqlx::query_as::<_, ParticipantRecord>(
                r#"
                INSERT INTO movie_night_participants (movie_night_id, user_id, status)
                VALUES ($1, $2, $3)
                ON CONFLICT (movie_night_id, user_id) DO UPDATE SET status = EXCLUDED.status
                RETURNING *
                "#,
            )
            .bind(night.id)
            .bind(target_id)
            .bind(next.as_str())
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    tracing::info!(
        movie_night_id = night.id,
        actor_id,
        user_id = target_id,
        ?action,
        from = current_status.map(|s| s.as_str()).unwrap_or("none"),
        to = next.as_str(),
        "Participation changed"
    );

    let profiles = users::load_profiles(db, &[participant.user_id]).await?;
    Ok(participant_response(&profiles, participant))
}

pub async fn join(db: &PgPool, user_id: i64, night_id: i64) -> AppResult<ParticipantResponse> {
    apply(db, user_id, night_id, user_id, ParticipantAction::Join).await
}

pub async fn request(db: &PgPool, user_id: i64, night_id: i64) -> AppResult<ParticipantResponse> {
    apply(db, user_id, night_id, user_id, ParticipantAction::Request).await
}

pub async fn respond(
    db: &PgPool,
    user_id: i64,
    night_id: i64,
    status: &str,
) -> AppResult<ParticipantResponse> {
    let status: ParticipantStatus = status
        .trim()
        .parse()
        .map_err(|_| TransitionError::InvalidResponse)?;
    apply(db, user_id, night_id, user_id, ParticipantAction::Respond(status)).await
}

pub async fn invite(
    db: &PgPool,
    organizer_id: i64,
    night_id: i64,
    user_id: i64,
) -> AppResult<ParticipantResponse> {
    if !users::exists(db, user_id).await? {
        return Err(AppError::invalid("User not found."));
    }
    apply(db, organizer_id, night_id, user_id, ParticipantAction::Invite).await
}

pub async fn approve(
    db: &PgPool,
    organizer_id: i64,
    night_id: i64,
    user_id: i64,
) -> AppResult<ParticipantResponse> {
    apply(db, organizer_id, night_id, user_id, ParticipantAction::Approve).await
}

/// Drops the caller's participation; leaving twice is fine
pub async fn leave(db: &PgPool, user_id: i64, night_id: i64) -> AppResult<()> {
    let night = find(db, night_id).await?;
    let removed = sqlx::query(
        "DELETE FROM movie_night_participants WHERE movie_night_id = $1 AND user_id = $2",
    )
    .bind(night.id)
    .bind(user_id)
    .execute(db)
    .await?
    .rows_affected();

    if removed > 0 {
        tracing::info!(movie_night_id = night.id, user_id, "Left movie night");
    }
    Ok(())
}

// ============================================================================
// Votes
// ============================================================================

/// Records a vote; voting twice for the same movie returns the existing vote
pub async fn vote(
    state: &AppState,
    user_id: i64,
    night_id: i64,
    imdb_id: &str,
) -> AppResult<VoteResponse> {
    let night = find(&state.db, night_id).await?;

    let status = find_participant(&state.db, night.id, user_id)
        .await?
        .and_then(|p| p.participant_status());
    if !can_vote(status) {
        return Err(AppError::forbidden(
            "Only accepted or maybe participants can vote.",
        ));
    }

    let movie = movies::resolve(state, imdb_id).await?;

    let vote = sqlx::query_as::<_, VoteRecord>(
        r#"
        INSERT INTO movie_night_votes (movie_night_id, user_id, movie_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (movie_night_id, user_id, movie_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING *
        "#,
    )
    .bind(night.id)
    .bind(user_id)
    .bind(movie.id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(movie_night_id = night.id, user_id, imdb_id = %movie.imdb_id, "Vote recorded");

    let voter = users::get_profile(&state.db, user_id).await?;
    Ok(VoteResponse {
        id: vote.id,
        movie,
        user: voter,
        created_at: vote.created_at,
    })
}

/// Vote counts per movie, most votes first
pub async fn tally(db: &PgPool, night_id: i64) -> AppResult<Vec<VoteTally>> {
    let night = find(db, night_id).await?;

    let rows = sqlx::query_as::<_, VoteCountRow>(
        r#"
        SELECT movie_id, COUNT(*) AS votes
        FROM movie_night_votes
        WHERE movie_night_id = $1
        GROUP BY movie_id
        ORDER BY votes DESC, movie_id
        "#,
    )
    .bind(night.id)
    .fetch_all(db)
    .await?;

    let movie_ids: Vec<i64> = rows.iter().map(|r| r.movie_id).collect();
    let mut stored = movies::load_by_ids(db, &movie_ids).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            stored.remove(&row.movie_id).map(|movie| VoteTally {
                movie,
                votes: row.votes,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{insert_movie, insert_user};

    async fn night(db: &PgPool, organizer_id: i64, max_participants: Option<i32>) -> i64 {
        let req = CreateMovieNightRequest {
            title: "Friday classics".to_string(),
            description: None,
            scheduled_date: chrono::Utc::now(),
            location: None,
            max_participants,
        };
        create(db, organizer_id, req).await.unwrap().id
    }

    fn detail(err: AppError) -> String {
        match err {
            AppError::InvalidInput(msg) | AppError::Forbidden(msg) => msg,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[sqlx::test]
    async fn test_only_organizer_mutates(db: PgPool) {
        let morpheus = insert_user(&db, "morpheus").await;
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;
        let id = night(&db, morpheus, None).await;

        let update_req = UpdateMovieNightRequest {
            title: Some("Hijacked".to_string()),
            ..Default::default()
        };
        let err = update(&db, neo, id, update_req).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = delete(&db, neo, id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = invite(&db, neo, id, trinity).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        request(&db, trinity, id).await.unwrap();
        let err = approve(&db, neo, id, trinity).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let unchanged = get(&db, id).await.unwrap();
        assert_eq!(unchanged.title, "Friday classics");

        let approved = approve(&db, morpheus, id, trinity).await.unwrap();
        assert_eq!(approved.status, "accepted");
    }

    #[sqlx::test]
    async fn test_capacity_is_checked_at_accept_time(db: PgPool) {
        let morpheus = insert_user(&db, "morpheus").await;
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;
        let id = night(&db, morpheus, Some(2)).await;

        request(&db, trinity, id).await.unwrap();
        join(&db, neo, id).await.unwrap();

        let err = approve(&db, morpheus, id, trinity).await.unwrap_err();
        assert_eq!(detail(err), "Movie night is full.");

        // Re-joining an accepted seat does not count against capacity
        let again = join(&db, neo, id).await.unwrap();
        assert_eq!(again.status, "accepted");

        leave(&db, neo, id).await.unwrap();
        let approved = approve(&db, morpheus, id, trinity).await.unwrap();
        assert_eq!(approved.status, "accepted");
    }

    #[sqlx::test]
    async fn test_concurrent_joins_never_overfill(db: PgPool) {
        let morpheus = insert_user(&db, "morpheus").await;
        let neo = insert_user(&db, "neo").await;
        let trinity = insert_user(&db, "trinity").await;
        let id = night(&db, morpheus, Some(2)).await;

        let (a, b) = tokio::join!(join(&db, neo, id), join(&db, trinity, id));
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let accepted = get(&db, id)
            .await
            .unwrap()
            .participants
            .into_iter()
            .filter(|p| p.status == "accepted")
            .count();
        assert_eq!(accepted, 2);
    }

    #[sqlx::test]
    async fn test_vote_is_idempotent_and_gated(db: PgPool) {
        let state = AppState::for_tests(db.clone());
        let morpheus = insert_user(&db, "morpheus").await;
        let neo = insert_user(&db, "neo").await;
        insert_movie(&db, "tt0133093", "The Matrix").await;
        let id = night(&db, morpheus, None).await;

        let err = vote(&state, neo, id, "tt0133093").await.unwrap_err();
        assert_eq!(detail(err), "Only accepted or maybe participants can vote.");

        let first = vote(&state, morpheus, id, "tt0133093").await.unwrap();
        let second = vote(&state, morpheus, id, "tt0133093").await.unwrap();
        assert_eq!(first.id, second.id);

        respond(&db, morpheus, id, "maybe").await.unwrap();
        join(&db, neo, id).await.unwrap();
        respond(&db, neo, id, "maybe").await.unwrap();
        vote(&state, neo, id, "tt0133093").await.unwrap();

        let votes = tally(&db, id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].votes, 2);
    }
}
