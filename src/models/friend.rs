use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::str::FromStr;

use super::UserProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Declined => "declined",
        }
    }
}

impl FromStr for FriendRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FriendRequestStatus::Pending),
            "accepted" => Ok(FriendRequestStatus::Accepted),
            "declined" => Ok(FriendRequestStatus::Declined),
            other => Err(format!("unknown friend request status: {}", other)),
        }
    }
}

/// What the recipient does with a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestAction {
    Accept,
    Decline,
}

impl FriendRequestAction {
    /// Parses the `action` field; anything but accept/decline is rejected
    pub fn parse(action: Option<&str>) -> Option<Self> {
        match action {
            Some("accept") => Some(FriendRequestAction::Accept),
            Some("decline") => Some(FriendRequestAction::Decline),
            _ => None,
        }
    }

    pub fn resulting_status(&self) -> FriendRequestStatus {
        match self {
            FriendRequestAction::Accept => FriendRequestStatus::Accepted,
            FriendRequestAction::Decline => FriendRequestStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FriendRequestRecord {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestResponse {
    pub id: i64,
    pub from_user: UserProfile,
    pub to_user: UserProfile,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFriendRequest {
    pub to_user_id: i64,
}

/// PATCH body; `action` is validated by the handler so bad values get 400
#[derive(Debug, Default, Deserialize)]
pub struct UpdateFriendRequest {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FriendshipRecord {
    pub id: i64,
    pub user_id: i64,
    pub friend_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendshipResponse {
    pub id: i64,
    pub user: UserProfile,
    pub friend: UserProfile,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Suggestions pushed by the recommendation pipeline
// ============================================================================

/// One upsertable suggestion extracted from a loosely-shaped payload item
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionItem {
    pub suggested_user_id: i64,
    pub similarity_score: Option<f64>,
    pub shared_genres: Option<Value>,
}

impl SuggestionItem {
    /// Reads `suggested_user_id` (or `user_id`); items without an integer id are skipped
    pub fn from_value(item: &Value) -> Option<Self> {
        let object = item.as_object()?;
        let id = object
            .get("suggested_user_id")
            .filter(|v| !v.is_null())
            .or_else(|| object.get("user_id"))?;

        Some(Self {
            suggested_user_id: id.as_i64()?,
            similarity_score: object.get("similarity_score").and_then(Value::as_f64),
            shared_genres: object.get("shared_genres").filter(|v| !v.is_null()).cloned(),
        })
    }
}

/// Extracts the `suggestions` array from the request body
pub fn parse_suggestions(body: &Value) -> Vec<SuggestionItem> {
    body.get("suggestions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(SuggestionItem::from_value).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionsReceived {
    pub detail: String,
    pub received: bool,
    pub saved: usize,
}
