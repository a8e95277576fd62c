use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// Full `users` row, including the password hash
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

/// Public view of a user, embedded in most responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio: String,
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
        }
    }
}

impl UserProfile {
    /// Placeholder for rows whose user has since been deleted
    pub fn missing(id: i64) -> Self {
        Self {
            id,
            username: String::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            display_name: String::new(),
            avatar_url: String::new(),
            bio: String::new(),
        }
    }
}

/// The authenticated caller, as carried in an access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1-150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub last_name: Option<String>,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

/// Profile fields the owner may change; username and email are read-only
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(length(max = 150))]
    pub display_name: Option<String>,
    #[validate(custom(function = "validate_optional_url"))]
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
            && self.bio.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let ok = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("username")
            .with_message("Username may contain only letters, digits and @/./+/-/_".into()))
    }
}

fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(ValidationError::new("password_too_short")
            .with_message("This password is too short. It must contain at least 8 characters.".into()));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("password_entirely_numeric")
            .with_message("This password is entirely numeric.".into()));
    }
    Ok(())
}

fn validate_optional_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("url").with_message("Enter a valid URL.".into()))
    }
}
