use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::{Movie, UserProfile};

/// Polarity of a review as classified by the LLM
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    /// Lenient parse of free-form model output ("Positive.", " negative\n")
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned: String = label
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        cleaned.parse().ok()
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment: {}", other)),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Favorites, likes, shares
// ============================================================================

/// A favorite row joined with its movie id
#[derive(Debug, Clone, FromRow)]
pub struct FavoriteRecord {
    pub id: i64,
    pub movie_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteResponse {
    pub id: i64,
    pub movie: Movie,
    pub created_at: DateTime<Utc>,
}

/// Body for endpoints that address a movie by IMDb id
#[derive(Debug, Deserialize, Validate)]
pub struct MovieRef {
    #[validate(length(min = 1, max = 20, message = "imdb_id is required"))]
    pub imdb_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LikeToggled {
    pub liked: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateShareRequest {
    #[validate(length(min = 1, max = 20, message = "imdb_id is required"))]
    pub imdb_id: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShareResponse {
    pub id: i64,
    pub imdb_id: String,
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Reviews
// ============================================================================

/// A review row joined with the movie's IMDb id
#[derive(Debug, Clone, FromRow)]
pub struct ReviewRecord {
    pub id: i64,
    pub user_id: i64,
    pub movie_id: i64,
    pub imdb_id: String,
    pub content: String,
    pub rating: Option<i16>,
    pub sentiment: String,
    pub sentiment_confidence: Option<f64>,
    pub emotions: Value,
    pub sentiment_breakdown: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: i64,
    pub user: UserProfile,
    pub imdb_id: String,
    pub content: String,
    pub rating: Option<i16>,
    pub sentiment: String,
    pub sentiment_confidence: Option<f64>,
    pub emotions: Value,
    pub sentiment_breakdown: Value,
    pub created_at: DateTime<Utc>,
}

impl ReviewResponse {
    pub fn new(record: ReviewRecord, user: UserProfile) -> Self {
        Self {
            id: record.id,
            user,
            imdb_id: record.imdb_id,
            content: record.content,
            rating: record.rating,
            sentiment: record.sentiment,
            sentiment_confidence: record.sentiment_confidence,
            emotions: record.emotions,
            sentiment_breakdown: record.sentiment_breakdown,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, max = 20, message = "imdb_id is required"))]
    pub imdb_id: String,
    #[validate(length(min = 1, message = "Review content cannot be empty"))]
    pub content: String,
    #[validate(range(min = 0, message = "Rating must be positive"))]
    #[serde(default)]
    pub rating: Option<i16>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct SocialStats {
    pub likes: i64,
    pub favorites: i64,
    pub reviews: i64,
}

// ============================================================================
// Sentiment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SentimentBreakdown {
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

/// Detailed sentiment produced for a review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvancedSentiment {
    #[serde(default, deserialize_with = "lenient_sentiment")]
    pub overall: Option<Sentiment>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub emotions: Map<String, Value>,
    #[serde(default)]
    pub breakdown: SentimentBreakdown,
}

impl Default for AdvancedSentiment {
    fn default() -> Self {
        Self {
            overall: Some(Sentiment::Neutral),
            confidence: Some(0.5),
            emotions: Map::new(),
            breakdown: SentimentBreakdown::default(),
        }
    }
}

fn lenient_sentiment<'de, D>(de: D) -> Result<Option<Sentiment>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let label: Option<Value> = Option::deserialize(de)?;
    Ok(label
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Sentiment::from_label))
}

impl AdvancedSentiment {
    pub fn emotions_value(&self) -> Value {
        Value::Object(self.emotions.clone())
    }

    pub fn breakdown_value(&self) -> Value {
        json!(self.breakdown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAnalysisResponse {
    pub id: i64,
    pub overall: String,
    pub confidence: Option<f64>,
    pub emotions: Value,
    pub breakdown: Value,
}

// ============================================================================
// Generated posts and genre audiences
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct GeneratePostRequest {
    #[validate(length(min = 1, max = 20, message = "imdb_id is required"))]
    pub imdb_id: String,
    #[serde(default)]
    pub preferences: Option<Value>,
}

/// Platform-specific post drafts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SocialPosts {
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default)]
    pub facebook: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersByGenreQuery {
    #[serde(default)]
    pub genres: Option<String>,
}

/// Per-user engagement with the requested genres
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenreEngagement {
    pub total_engagements: i64,
    pub favorites: i64,
    pub likes: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct GenreUserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub favorites: i64,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenreUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub preferences: GenreEngagement,
}

impl From<GenreUserRow> for GenreUser {
    fn from(row: GenreUserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            preferences: GenreEngagement {
                total_engagements: row.favorites + row.likes,
                favorites: row.favorites,
                likes: row.likes,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersByGenreResponse {
    pub users: Vec<GenreUser>,
    pub count: usize,
}

/// Parses `?genres=Action, Drama,` into `["Action", "Drama"]`
pub fn parse_genre_list(raw: &str) -> Vec<String> {
    super::split_genres(raw)
}
