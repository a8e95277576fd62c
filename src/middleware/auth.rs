//! Bearer-token and automation-secret authentication
//!
//! Access and refresh tokens are HS256 JWTs signed with `SECRET_KEY`. Route
//! handlers ask for the caller through extractors: [`AuthUser`] for any
//! signed-in user, [`StaffUser`] for admin endpoints and [`Caller`] for the
//! ingest endpoints that also accept the n8n automation.

use argon2::{
    password_hash::{Error as PasswordHashError, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::user::TokenPair;
use crate::models::AuthUser;

/// Header carrying the shared secret of the n8n automation
pub const N8N_SECRET_HEADER: &str = "x-n8n-secret";

const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub is_staff: bool,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn new(user: &AuthUser, token_type: TokenType, ttl_secs: u64) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_staff: user.is_staff,
            token_type,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now,
            exp: now + ttl_secs,
        }
    }

    pub fn encode(&self, secret: &[u8]) -> AppResult<String> {
        let header = Header::new(Algorithm::HS256);
        Ok(encode(&header, self, &EncodingKey::from_secret(secret))?)
    }

    /// Decodes and checks signature, expiry and token type
    pub fn decode(token: &str, secret: &[u8], expected: TokenType) -> AppResult<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let claims = decode::<Self>(token, &DecodingKey::from_secret(secret), &validation)?.claims;
        if claims.token_type != expected {
            return Err(AppError::unauthorized("Token has wrong type"));
        }
        Ok(claims)
    }

    pub fn user(&self) -> AppResult<AuthUser> {
        let id = self
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("Token contained no recognizable user identification"))?;
        Ok(AuthUser {
            id,
            username: self.username.clone(),
            is_staff: self.is_staff,
        })
    }

    /// Seconds until expiry, at least one
    pub fn remaining_secs(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.exp.saturating_sub(now).max(1)
    }
}

/// Issues a fresh access/refresh pair for the user
pub fn issue_token_pair(user: &AuthUser, config: &Config) -> AppResult<TokenPair> {
    let secret = config.secret_key.as_bytes();
    let access = Claims::new(user, TokenType::Access, config.access_token_ttl_secs).encode(secret)?;
    let refresh =
        Claims::new(user, TokenType::Refresh, config.refresh_token_ttl_secs).encode(secret)?;
    Ok(TokenPair { access, refresh })
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(parts: &Parts, config: &Config) -> AppResult<AuthUser> {
    let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized(NOT_AUTHENTICATED))?;
    Claims::decode(token, config.secret_key.as_bytes(), TokenType::Access)?.user()
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        authenticate(parts, &state.config)
    }
}

/// A signed-in user with the staff flag
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let user = authenticate(parts, &state.config)?;
        if !user.is_staff {
            return Err(AppError::forbidden(
                "You do not have permission to perform this action.",
            ));
        }
        Ok(StaffUser(user))
    }
}

/// Either a signed-in user or the n8n automation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    User(AuthUser),
    Automation,
}

impl Caller {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Caller::User(user) => Some(user.id),
            Caller::Automation => None,
        }
    }

    /// Source recorded when the body names none
    pub fn default_source(&self) -> &'static str {
        match self {
            Caller::User(_) => "app",
            Caller::Automation => "n8n",
        }
    }
}

/// Checks a presented automation secret against the configured one
pub fn check_n8n_secret(presented: &str, configured: Option<&str>) -> AppResult<()> {
    let expected =
        configured.ok_or_else(|| AppError::unauthorized("N8N shared secret not configured"))?;
    if presented != expected {
        return Err(AppError::unauthorized("Invalid n8n secret"));
    }
    Ok(())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let presented = parts
            .headers
            .get(N8N_SECRET_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty());

        if let Some(secret) = presented {
            check_n8n_secret(secret, state.config.n8n_secret())?;
            tracing::debug!("Request authenticated as n8n automation");
            return Ok(Caller::Automation);
        }

        authenticate(parts, &state.config).map(Caller::User)
    }
}
