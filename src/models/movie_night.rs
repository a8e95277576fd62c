//! Movie nights and the participant state machine
//!
//! A participant row moves between `invited`, `requested`, `accepted`,
//! `declined` and `maybe` through [`transition`]. The function is pure: the
//! service loads the current row and the night (under a row lock) and writes
//! back whatever status comes out. Leaving deletes the row and never goes
//! through the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::{double_option, Movie, UserProfile};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Requested,
    Accepted,
    Declined,
    Maybe,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Requested => "requested",
            ParticipantStatus::Accepted => "accepted",
            ParticipantStatus::Declined => "declined",
            ParticipantStatus::Maybe => "maybe",
        }
    }

    /// Statuses a participant may pick for themselves via `respond`
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Accepted | ParticipantStatus::Declined | ParticipantStatus::Maybe
        )
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(ParticipantStatus::Invited),
            "requested" => Ok(ParticipantStatus::Requested),
            "accepted" => Ok(ParticipantStatus::Accepted),
            "declined" => Ok(ParticipantStatus::Declined),
            "maybe" => Ok(ParticipantStatus::Maybe),
            other => Err(format!("unknown participant status: {}", other)),
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovieNightStatus {
    #[default]
    Planned,
    Confirmed,
    Completed,
    Cancelled,
}

impl MovieNightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieNightStatus::Planned => "planned",
            MovieNightStatus::Confirmed => "confirmed",
            MovieNightStatus::Completed => "completed",
            MovieNightStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled nights accept no new participation changes
    pub fn is_closed(&self) -> bool {
        matches!(self, MovieNightStatus::Completed | MovieNightStatus::Cancelled)
    }
}

impl FromStr for MovieNightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(MovieNightStatus::Planned),
            "confirmed" => Ok(MovieNightStatus::Confirmed),
            "completed" => Ok(MovieNightStatus::Completed),
            "cancelled" => Ok(MovieNightStatus::Cancelled),
            other => Err(format!("unknown movie night status: {}", other)),
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

/// A participation change, from the point of view of the affected user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    /// The user joins directly
    Join,
    /// The user asks the organizer to be let in
    Request,
    /// The user answers with accepted, declined or maybe
    Respond(ParticipantStatus),
    /// The organizer invites the user
    Invite,
    /// The organizer approves the user's request
    Approve,
}

/// The night-level facts a transition depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightContext {
    pub status: MovieNightStatus,
    pub max_participants: Option<i32>,
    pub accepted_count: i64,
}

impl NightContext {
    pub fn is_full(&self) -> bool {
        self.max_participants
            .map(|max| self.accepted_count >= i64::from(max))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Movie night is closed.")]
    Closed,
    #[error("Movie night is full.")]
    Full,
    #[error("You are already part of this movie night.")]
    AlreadyParticipating,
    #[error("You are not a participant of this movie night.")]
    NotParticipant,
    #[error("Invalid status. Use accepted, declined or maybe.")]
    InvalidResponse,
    #[error("Your request is awaiting the organizer's approval.")]
    AwaitingApproval,
    #[error("No pending request from this user.")]
    NotRequested,
}

/// Computes the participant's next status
///
/// `current` is `None` when the user has no participant row yet. The
/// returned status may equal `current`, in which case nothing needs writing.
/// Moving into `accepted` from any other state requires a free seat.
pub fn transition(
    current: Option<ParticipantStatus>,
    action: ParticipantAction,
    ctx: &NightContext,
) -> Result<ParticipantStatus, TransitionError> {
    use ParticipantStatus::*;

    if ctx.status.is_closed() {
        return Err(TransitionError::Closed);
    }

    let next = match action {
        ParticipantAction::Join => Accepted,
        ParticipantAction::Request => match current {
            None | Some(Declined) | Some(Requested) => Requested,
            Some(_) => return Err(TransitionError::AlreadyParticipating),
        },
        ParticipantAction::Respond(status) => {
            if !status.is_response() {
                return Err(TransitionError::InvalidResponse);
            }
            match current {
                None => return Err(TransitionError::NotParticipant),
                Some(Requested) if status != Declined => {
                    return Err(TransitionError::AwaitingApproval)
                }
                Some(_) => status,
            }
        }
        ParticipantAction::Invite => match current {
            None | Some(Declined) => Invited,
            Some(Requested) => Accepted,
            Some(other) => other,
        },
        ParticipantAction::Approve => match current {
            Some(Requested) => Accepted,
            _ => return Err(TransitionError::NotRequested),
        },
    };

    if next == Accepted && current != Some(Accepted) && ctx.is_full() {
        return Err(TransitionError::Full);
    }

    Ok(next)
}

/// Only participants who are coming (or might) get a say in the movie
pub fn can_vote(status: Option<ParticipantStatus>) -> bool {
    matches!(
        status,
        Some(ParticipantStatus::Accepted) | Some(ParticipantStatus::Maybe)
    )
}

// ============================================================================
// Rows and responses
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct MovieNightRecord {
    pub id: i64,
    pub organizer_id: i64,
    pub title: String,
    pub description: String,
    pub scheduled_date: DateTime<Utc>,
    pub location: String,
    pub status: String,
    pub max_participants: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MovieNightRecord {
    pub fn night_status(&self) -> MovieNightStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn is_organizer(&self, user_id: i64) -> bool {
        self.organizer_id == user_id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantRecord {
    pub id: i64,
    pub movie_night_id: i64,
    pub user_id: i64,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

impl ParticipantRecord {
    pub fn participant_status(&self) -> Option<ParticipantStatus> {
        self.status.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub id: i64,
    pub user: UserProfile,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieNightResponse {
    pub id: i64,
    pub organizer: UserProfile,
    pub title: String,
    pub description: String,
    pub scheduled_date: DateTime<Utc>,
    pub location: String,
    pub status: String,
    pub max_participants: Option<i32>,
    pub participants: Vec<ParticipantResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MovieNightResponse {
    pub fn new(
        night: MovieNightRecord,
        organizer: UserProfile,
        participants: Vec<ParticipantResponse>,
    ) -> Self {
        Self {
            id: night.id,
            organizer,
            title: night.title,
            description: night.description,
            scheduled_date: night.scheduled_date,
            location: night.location,
            status: night.status,
            max_participants: night.max_participants,
            participants,
            created_at: night.created_at,
            updated_at: night.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMovieNightRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub location: Option<String>,
    #[validate(range(min = 1, message = "max_participants must be at least 1"))]
    #[serde(default)]
    pub max_participants: Option<i32>,
}

/// Organizer edits; `max_participants: null` removes the limit
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMovieNightRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_participants: Option<Option<i32>>,
    pub status: Option<MovieNightStatus>,
}

impl UpdateMovieNightRequest {
    pub fn capacity_is_valid(&self) -> bool {
        !matches!(self.max_participants, Some(Some(n)) if n < 1)
    }
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VoteRequest {
    #[validate(length(min = 1, max = 20, message = "movie_imdb_id is required"))]
    pub movie_imdb_id: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct VoteRecord {
    pub id: i64,
    pub movie_night_id: i64,
    pub user_id: i64,
    pub movie_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub id: i64,
    pub movie: Movie,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VoteCountRow {
    pub movie_id: i64,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTally {
    pub movie: Movie,
    pub votes: i64,
}

#[cfg(test)]
mod tests {
    use super::ParticipantStatus::*;
    use super::*;

    fn open(max: Option<i32>, accepted: i64) -> NightContext {
        NightContext {
            status: MovieNightStatus::Planned,
            max_participants: max,
            accepted_count: accepted,
        }
    }

    #[test]
    fn test_join_from_any_state_accepts() {
        let ctx = open(None, 3);
        for current in [None, Some(Invited), Some(Requested), Some(Declined), Some(Maybe)] {
            assert_eq!(
                transition(current, ParticipantAction::Join, &ctx),
                Ok(Accepted)
            );
        }
    }

    #[test]
    fn test_join_when_full_is_rejected() {
        let ctx = open(Some(2), 2);
        assert_eq!(
            transition(None, ParticipantAction::Join, &ctx),
            Err(TransitionError::Full)
        );
        assert_eq!(TransitionError::Full.to_string(), "Movie night is full.");
    }

    #[test]
    fn test_join_when_already_accepted_skips_capacity() {
        let ctx = open(Some(2), 2);
        assert_eq!(
            transition(Some(Accepted), ParticipantAction::Join, &ctx),
            Ok(Accepted)
        );
    }

    #[test]
    fn test_request_from_none_or_declined() {
        let ctx = open(Some(1), 1);
        assert_eq!(transition(None, ParticipantAction::Request, &ctx), Ok(Requested));
        assert_eq!(
            transition(Some(Declined), ParticipantAction::Request, &ctx),
            Ok(Requested)
        );
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Request, &ctx),
            Ok(Requested)
        );
    }

    #[test]
    fn test_request_when_already_in_is_rejected() {
        let ctx = open(None, 0);
        for current in [Invited, Accepted, Maybe] {
            assert_eq!(
                transition(Some(current), ParticipantAction::Request, &ctx),
                Err(TransitionError::AlreadyParticipating)
            );
        }
    }

    #[test]
    fn test_respond_requires_existing_row() {
        let ctx = open(None, 0);
        assert_eq!(
            transition(None, ParticipantAction::Respond(Accepted), &ctx),
            Err(TransitionError::NotParticipant)
        );
    }

    #[test]
    fn test_respond_rejects_non_response_status() {
        let ctx = open(None, 0);
        assert_eq!(
            transition(Some(Invited), ParticipantAction::Respond(Requested), &ctx),
            Err(TransitionError::InvalidResponse)
        );
        assert_eq!(
            transition(Some(Invited), ParticipantAction::Respond(Invited), &ctx),
            Err(TransitionError::InvalidResponse)
        );
    }

    #[test]
    fn test_respond_from_invited() {
        let ctx = open(None, 0);
        assert_eq!(
            transition(Some(Invited), ParticipantAction::Respond(Maybe), &ctx),
            Ok(Maybe)
        );
        assert_eq!(
            transition(Some(Invited), ParticipantAction::Respond(Declined), &ctx),
            Ok(Declined)
        );
        assert_eq!(
            transition(Some(Invited), ParticipantAction::Respond(Accepted), &ctx),
            Ok(Accepted)
        );
    }

    #[test]
    fn test_respond_accept_checks_capacity() {
        let ctx = open(Some(3), 3);
        assert_eq!(
            transition(Some(Maybe), ParticipantAction::Respond(Accepted), &ctx),
            Err(TransitionError::Full)
        );
        assert_eq!(
            transition(Some(Accepted), ParticipantAction::Respond(Accepted), &ctx),
            Ok(Accepted)
        );
    }

    #[test]
    fn test_respond_from_requested_only_allows_decline() {
        let ctx = open(None, 0);
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Respond(Declined), &ctx),
            Ok(Declined)
        );
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Respond(Accepted), &ctx),
            Err(TransitionError::AwaitingApproval)
        );
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Respond(Maybe), &ctx),
            Err(TransitionError::AwaitingApproval)
        );
    }

    #[test]
    fn test_invite_transitions() {
        let ctx = open(None, 0);
        assert_eq!(transition(None, ParticipantAction::Invite, &ctx), Ok(Invited));
        assert_eq!(
            transition(Some(Declined), ParticipantAction::Invite, &ctx),
            Ok(Invited)
        );
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Invite, &ctx),
            Ok(Accepted)
        );
        for unchanged in [Invited, Accepted, Maybe] {
            assert_eq!(
                transition(Some(unchanged), ParticipantAction::Invite, &ctx),
                Ok(unchanged)
            );
        }
    }

    #[test]
    fn test_invite_of_requester_respects_capacity() {
        let ctx = open(Some(4), 4);
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Invite, &ctx),
            Err(TransitionError::Full)
        );
        assert_eq!(transition(None, ParticipantAction::Invite, &ctx), Ok(Invited));
    }

    #[test]
    fn test_approve_transitions() {
        let ctx = open(Some(5), 1);
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Approve, &ctx),
            Ok(Accepted)
        );
        for current in [None, Some(Invited), Some(Accepted), Some(Declined), Some(Maybe)] {
            assert_eq!(
                transition(current, ParticipantAction::Approve, &ctx),
                Err(TransitionError::NotRequested)
            );
        }
    }

    #[test]
    fn test_approve_when_full_is_rejected() {
        let ctx = open(Some(1), 1);
        assert_eq!(
            transition(Some(Requested), ParticipantAction::Approve, &ctx),
            Err(TransitionError::Full)
        );
    }

    #[test]
    fn test_closed_nights_reject_everything() {
        for status in [MovieNightStatus::Completed, MovieNightStatus::Cancelled] {
            let ctx = NightContext {
                status,
                max_participants: None,
                accepted_count: 0,
            };
            for action in [
                ParticipantAction::Join,
                ParticipantAction::Request,
                ParticipantAction::Respond(Declined),
                ParticipantAction::Invite,
                ParticipantAction::Approve,
            ] {
                assert_eq!(
                    transition(Some(Accepted), action, &ctx),
                    Err(TransitionError::Closed)
                );
            }
        }
    }

    #[test]
    fn test_confirmed_night_is_open() {
        let ctx = NightContext {
            status: MovieNightStatus::Confirmed,
            max_participants: None,
            accepted_count: 10,
        };
        assert_eq!(transition(None, ParticipantAction::Join, &ctx), Ok(Accepted));
    }

    #[test]
    fn test_can_vote() {
        assert!(can_vote(Some(Accepted)));
        assert!(can_vote(Some(Maybe)));
        assert!(!can_vote(Some(Invited)));
        assert!(!can_vote(Some(Requested)));
        assert!(!can_vote(Some(Declined)));
        assert!(!can_vote(None));
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in [Invited, Requested, Accepted, Declined, Maybe] {
            assert_eq!(status.as_str().parse::<ParticipantStatus>(), Ok(status));
        }
        assert_eq!(
            "cancelled".parse::<MovieNightStatus>(),
            Ok(MovieNightStatus::Cancelled)
        );
        assert!("archived".parse::<MovieNightStatus>().is_err());
    }

    #[test]
    fn test_update_request_capacity_validation() {
        let clear: UpdateMovieNightRequest =
            serde_json::from_str(r#"{"max_participants": null}"#).unwrap();
        assert_eq!(clear.max_participants, Some(None));
        assert!(clear.capacity_is_valid());

        let zero: UpdateMovieNightRequest =
            serde_json::from_str(r#"{"max_participants": 0}"#).unwrap();
        assert!(!zero.capacity_is_valid());

        let status: UpdateMovieNightRequest =
            serde_json::from_str(r#"{"status": "confirmed"}"#).unwrap();
        assert_eq!(status.status, Some(MovieNightStatus::Confirmed));
    }
}
