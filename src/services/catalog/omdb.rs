/// OMDb catalog client
///
/// One endpoint serves both operations:
/// 1. Search: `?s={query}&page={n}` → `{"Search": [...], "totalResults": ...}`
/// 2. Details: `?i={imdb_id}&plot=full` → the full record, or
///    `{"Response": "False", "Error": ...}` for unknown ids
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    services::catalog::{is_not_found, MovieCatalog},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct OmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl OmdbCatalog {
    pub fn new(api_key: String, api_url: String) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url,
        })
    }

    fn api_key(&self) -> AppResult<&str> {
        if self.api_key.is_empty() {
            return Err(AppError::ExternalApi("OMDb API key not configured".to_string()));
        }
        Ok(&self.api_key)
    }

    async fn get(&self, params: &[(&str, &str)]) -> AppResult<Value> {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[("apikey", self.api_key()?)])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "OMDb API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MovieCatalog for OmdbCatalog {
    async fn search(&self, query: &str, page: u32) -> AppResult<Value> {
        let page = page.to_string();
        let results = self.get(&[("s", query), ("page", page.as_str())]).await?;
        let total = results
            .get("totalResults")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("0");

        tracing::debug!(
            query = %query,
            page = %page,
            total = %total,
            "OMDb search completed"
        );

        Ok(results)
    }

    async fn details(&self, imdb_id: &str) -> AppResult<Option<Value>> {
        let payload = self.get(&[("i", imdb_id), ("plot", "full")]).await?;

        if is_not_found(&payload) {
            tracing::debug!(imdb_id = %imdb_id, "OMDb has no record for id");
            return Ok(None);
        }

        Ok(Some(payload))
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}
