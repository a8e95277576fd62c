use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Postgres SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    Throttled { retry_after_secs: u64 },

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// True when the underlying database error is a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(error = %err, "Token rejected");
        AppError::Unauthorized("Token is invalid or expired".to_string())
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AppError::Internal(format!("Password hashing error: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<crate::models::movie_night::TransitionError> for AppError {
    fn from(err: crate::models::movie_night::TransitionError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Throttled { retry_after_secs } = &self {
            let body = Json(json!({
                "detail": format!(
                    "Request was throttled. Expected available in {} seconds.",
                    retry_after_secs
                )
            }));
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", retry_after_secs.to_string())],
                body,
            )
                .into_response();
        }

        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Validation(errors) => (StatusCode::BAD_REQUEST, errors.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Database(_) if self.is_unique_violation() => {
                (StatusCode::CONFLICT, "Resource already exists.".to_string())
            }
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Throttled { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
        };

        let body = Json(json!({
            "detail": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::not_found("x"), StatusCode::NOT_FOUND),
            (AppError::invalid("x"), StatusCode::BAD_REQUEST),
            (AppError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (AppError::forbidden("x"), StatusCode::FORBIDDEN),
            (AppError::ExternalApi("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppError::Throttled {
                    retry_after_secs: 10,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_throttled_sets_retry_after() {
        let response = AppError::Throttled {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "42");
    }

    #[test]
    fn test_transition_error_is_bad_request() {
        use crate::models::movie_night::TransitionError;

        let err = AppError::from(TransitionError::Full);
        assert!(matches!(&err, AppError::InvalidInput(msg) if msg == "Movie night is full."));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_row_not_found_is_not_unique_violation() {
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_unique_violation());
    }
}
