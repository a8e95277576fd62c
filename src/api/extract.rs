use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// JSON body whose rejections render as `{"detail": ...}` with status 400
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// [`JsonBody`] that also runs the type's `validator` rules
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let JsonBody(value) = JsonBody::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header::CONTENT_TYPE};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Named {
        #[validate(length(min = 1))]
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validated_json_accepts_valid_body() {
        let ValidatedJson(named) = ValidatedJson::<Named>::from_request(json_request(r#"{"name":"ana"}"#), &())
            .await
            .unwrap();
        assert_eq!(named.name, "ana");
    }

    #[tokio::test]
    async fn test_validated_json_rejects_invalid_body() {
        let result = ValidatedJson::<Named>::from_request(json_request(r#"{"name":""}"#), &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_input() {
        let result = JsonBody::<Named>::from_request(json_request("{not json"), &()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
