/// Google Gemini `generateContent` client
///
/// `POST {api_url}/models/{model}:generateContent?key={api_key}` with a single
/// user turn; the reply text is the concatenation of the first candidate's
/// text parts.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    services::llm::{LanguageModel, ModelTier},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl GeminiClient {
    pub fn new(api_key: String, api_url: String) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, tier: ModelTier, prompt: &str) -> AppResult<String> {
        if !self.is_configured() {
            return Err(AppError::ExternalApi("Gemini API key not configured".to_string()));
        }

        let url = format!("{}/models/{}:generateContent", self.api_url, tier.model());
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Gemini API returned status {}: {}",
                status, body
            )));
        }

        let text = response.json::<GenerateResponse>().await?.text();
        tracing::debug!(model = tier.model(), text_len = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": " 1}" }], "role": "model" },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "{\"a\": 1}");
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let response: GenerateResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert_eq!(response.text(), "");
    }

    #[tokio::test]
    async fn test_unconfigured_client_does_not_call_out() {
        let client = GeminiClient::new(String::new(), "http://127.0.0.1:1".to_string()).unwrap();
        assert!(!client.is_configured());
        assert!(client.generate(ModelTier::Flash, "ping").await.is_err());
    }
}
