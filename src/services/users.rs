//! Accounts, JWT lifecycle and profile lookups

use sqlx::PgPool;
use std::collections::HashMap;

use crate::api::AppState;
use crate::db::CacheKey;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{hash_password, issue_token_pair, verify_password, Claims, TokenType};
use crate::models::user::{
    LoginRequest, RegisterRequest, TokenPair, UpdateProfileRequest, UserRecord,
};
use crate::models::{AuthUser, PageParams, Paginated, UserProfile};

const PROFILE_COLUMNS: &str =
    "id, username, email, first_name, last_name, display_name, avatar_url, bio";

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

fn blank_to_empty(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

pub async fn register(db: &PgPool, req: RegisterRequest) -> AppResult<UserProfile> {
    let password_hash = hash_password(&req.password)?;

    let sql = format!(
        r#"
        INSERT INTO users (username, email, password_hash, first_name, last_name, display_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    );

    let profile = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(req.username.trim())
        .bind(blank_to_empty(req.email))
        .bind(password_hash)
        .bind(blank_to_empty(req.first_name))
        .bind(blank_to_empty(req.last_name))
        .bind(blank_to_empty(req.display_name))
        .fetch_one(db)
        .await?;

    tracing::info!(user_id = profile.id, username = %profile.username, "User registered");
    Ok(profile)
}

async fn find_by_username(db: &PgPool, username: &str) -> AppResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

async fn find_active(db: &PgPool, user_id: i64) -> AppResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>(
        "SELECT * FROM users WHERE id = $1 AND is_active = TRUE",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

fn auth_user(record: &UserRecord) -> AuthUser {
    AuthUser {
        id: record.id,
        username: record.username.clone(),
        is_staff: record.is_staff,
    }
}

pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<TokenPair> {
    let user = find_by_username(&state.db, req.username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;

    if !verify_password(&user.password_hash, &req.password)? {
        tracing::info!(username = %user.username, "Login rejected");
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    issue_token_pair(&auth_user(&user), &state.config)
}

async fn is_revoked(state: &AppState, claims: &Claims) -> AppResult<bool> {
    state
        .cache
        .exists(&CacheKey::RevokedToken(claims.jti.clone()))
        .await
}

/// Blacklists the token unless another request already did; false means it was spent
async fn claim(state: &AppState, claims: &Claims) -> AppResult<bool> {
    state
        .cache
        .claim(
            &CacheKey::RevokedToken(claims.jti.clone()),
            claims.remaining_secs(),
        )
        .await
}

async fn revoke(state: &AppState, claims: &Claims) -> AppResult<()> {
    state
        .cache
        .set_now(
            &CacheKey::RevokedToken(claims.jti.clone()),
            claims.remaining_secs(),
        )
        .await
}

/// Exchanges a refresh token for a new pair, blacklisting the old one
pub async fn refresh(state: &AppState, token: Option<&str>) -> AppResult<TokenPair> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::invalid("Missing refresh token."))?;
    let claims = Claims::decode(token, state.config.secret_key.as_bytes(), TokenType::Refresh)?;

    let user_id = claims.user()?.id;

    if !claim(state, &claims).await? {
        return Err(AppError::unauthorized("Token is blacklisted"));
    }

    let user = find_active(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    tracing::debug!(user_id = user.id, "Refresh token rotated");
    issue_token_pair(&auth_user(&user), &state.config)
}

/// Checks any token this service issued; blacklisted refresh tokens are invalid
pub async fn verify(state: &AppState, token: &str) -> AppResult<()> {
    let secret = state.config.secret_key.as_bytes();
    if Claims::decode(token, secret, TokenType::Access).is_ok() {
        return Ok(());
    }

    let claims = Claims::decode(token, secret, TokenType::Refresh)?;
    if is_revoked(state, &claims).await? {
        return Err(AppError::unauthorized("Token is blacklisted"));
    }
    Ok(())
}

pub async fn logout(state: &AppState, token: Option<&str>) -> AppResult<()> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::invalid("Missing refresh token."))?;

    let claims = Claims::decode(token, state.config.secret_key.as_bytes(), TokenType::Refresh)
        .map_err(|_| AppError::invalid("Invalid refresh token."))?;

    revoke(state, &claims).await?;
    tracing::info!(user_id = %claims.sub, "User logged out");
    Ok(())
}

pub async fn get_profile(db: &PgPool, user_id: i64) -> AppResult<UserProfile> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", PROFILE_COLUMNS);
    sqlx::query_as::<_, UserProfile>(&sql)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))
}

pub async fn update_profile(
    db: &PgPool,
    user_id: i64,
    req: UpdateProfileRequest,
) -> AppResult<UserProfile> {
    if req.is_empty() {
        return get_profile(db, user_id).await;
    }

    let sql = format!(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            display_name = COALESCE($4, display_name),
            avatar_url = COALESCE($5, avatar_url),
            bio = COALESCE($6, bio)
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    );

    sqlx::query_as::<_, UserProfile>(&sql)
        .bind(user_id)
        .bind(req.first_name)
        .bind(req.last_name)
        .bind(req.display_name)
        .bind(req.avatar_url)
        .bind(req.bio)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))
}

/// Case-insensitive search over names and email, excluding the caller
pub async fn search(
    db: &PgPool,
    caller_id: i64,
    query: Option<&str>,
    params: PageParams,
    page_size: i64,
) -> AppResult<Paginated<UserProfile>> {
    let q = query.map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Ok(Paginated::new(0, params, Vec::new()));
    }

    let pattern = format!("%{}%", escape_like(q));
    let filter = r#"
        id <> $1 AND (
            username ILIKE $2 OR display_name ILIKE $2 OR first_name ILIKE $2
            OR last_name ILIKE $2 OR email ILIKE $2
        )
    "#;

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {}", filter))
        .bind(caller_id)
        .bind(&pattern)
        .fetch_one(db)
        .await?;

    let (limit, offset) = params.limit_offset(page_size);
    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY username LIMIT $3 OFFSET $4",
        PROFILE_COLUMNS, filter
    );
    let users = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(caller_id)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

    Ok(Paginated::new(count, params, users))
}

/// Loads public profiles for a set of user ids
pub async fn load_profiles(db: &PgPool, ids: &[i64]) -> AppResult<HashMap<i64, UserProfile>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let sql = format!("SELECT {} FROM users WHERE id = ANY($1)", PROFILE_COLUMNS);
    let profiles = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(&unique)
        .fetch_all(db)
        .await?;

    Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
}

/// Profile from a loaded map, or a blank placeholder for a vanished user
pub fn profile(map: &HashMap<i64, UserProfile>, id: i64) -> UserProfile {
    map.get(&id).cloned().unwrap_or_else(|| UserProfile::missing(id))
}

pub async fn exists(db: &PgPool, user_id: i64) -> AppResult<bool> {
    let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(found)
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
