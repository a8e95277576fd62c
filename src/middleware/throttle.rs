use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::AppState;
use crate::db::{Cache, CacheKey};
use crate::error::{AppError, AppResult};
use crate::models::AuthUser;

/// Throttle scope shared by every LLM-backed endpoint
pub const LLM_SCOPE: &str = "llm";

const WINDOW_SECS: u64 = 60;

/// Outcome of counting one request against a fixed one-minute window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after_secs: u64 },
}

/// Pure window arithmetic: which window `now` falls in and what `count` means for it
pub fn decide(count: u64, limit: u64, now_secs: u64) -> Decision {
    if count <= limit {
        Decision::Allow
    } else {
        Decision::Deny {
            retry_after_secs: WINDOW_SECS - now_secs % WINDOW_SECS,
        }
    }
}

/// Counts a request for `user_id` in `scope`; Redis failures let the request through
pub async fn check_rate(
    cache: &Cache,
    scope: &'static str,
    user_id: i64,
    limit: u64,
) -> AppResult<()> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let key = CacheKey::Throttle {
        scope,
        user_id,
        window: now / WINDOW_SECS,
    };

    let count = match cache.increment(&key, WINDOW_SECS).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, user_id, scope, "Throttle check failed, allowing request");
            return Ok(());
        }
    };

    match decide(count, limit, now) {
        Decision::Allow => Ok(()),
        Decision::Deny { retry_after_secs } => {
            tracing::info!(user_id, scope, count, "Request throttled");
            Err(AppError::Throttled { retry_after_secs })
        }
    }
}

/// A signed-in user who passed the LLM rate limit
#[derive(Debug, Clone)]
pub struct LlmUser(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for LlmUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        check_rate(
            &state.cache,
            LLM_SCOPE,
            user.id,
            state.config.llm_rate_per_minute,
        )
        .await?;
        Ok(LlmUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;

    #[test]
    fn test_decide_allows_up_to_limit() {
        assert_eq!(decide(1, 20, 0), Decision::Allow);
        assert_eq!(decide(20, 20, 0), Decision::Allow);
    }

    #[test]
    fn test_decide_denies_over_limit_until_window_ends() {
        assert_eq!(
            decide(21, 20, 125),
            Decision::Deny {
                retry_after_secs: 55
            }
        );
        assert_eq!(
            decide(21, 20, 120),
            Decision::Deny {
                retry_after_secs: 60
            }
        );
    }

    #[tokio::test]
    async fn test_check_rate_fails_open_without_redis() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);
        assert!(check_rate(&cache, LLM_SCOPE, 1, 0).await.is_ok());
    }
}
