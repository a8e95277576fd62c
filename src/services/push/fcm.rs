/// Firebase Cloud Messaging legacy HTTP sender
///
/// `POST {fcm_api_url}` with `Authorization: key={server_key}` and a body of
/// `{to, notification: {title, body}, data}`. A message counts as delivered
/// when FCM answers 2xx and does not report it as failed.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{error::AppResult, services::push::PushSender};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct FcmSender {
    http_client: HttpClient,
    server_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: Option<u64>,
}

impl SendResponse {
    fn delivered(&self) -> bool {
        self.success.map(|n| n > 0).unwrap_or(true)
    }
}

impl FcmSender {
    pub fn new(server_key: String, api_url: String) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            server_key,
            api_url,
        })
    }

    async fn post(&self, payload: &Value) -> AppResult<bool> {
        let response = self
            .http_client
            .post(&self.api_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.server_key),
            )
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "FCM rejected push");
            return Ok(false);
        }

        let reply: SendResponse = response.json().await?;
        Ok(reply.delivered())
    }
}

fn message(device_token: &str, title: &str, body: &str, data: &Value) -> Value {
    let data = if data.is_object() { data.clone() } else { json!({}) };
    json!({
        "to": device_token,
        "notification": { "title": title, "body": body },
        "data": data,
    })
}

#[async_trait::async_trait]
impl PushSender for FcmSender {
    async fn send(&self, device_token: &str, title: &str, body: &str, data: &Value) -> bool {
        if self.server_key.is_empty() {
            tracing::debug!("FCM server key not configured, skipping push");
            return false;
        }

        match self.post(&message(device_token, title, body, data)).await {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(error = %e, "Push notification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let msg = message("tok", "Hi", "There", &json!({ "imdb_id": "tt1" }));
        assert_eq!(msg["to"], "tok");
        assert_eq!(msg["notification"]["title"], "Hi");
        assert_eq!(msg["data"]["imdb_id"], "tt1");

        let msg = message("tok", "Hi", "There", &json!("not an object"));
        assert_eq!(msg["data"], json!({}));
    }

    #[test]
    fn test_send_response_delivery() {
        let ok: SendResponse = serde_json::from_value(json!({ "success": 1, "failure": 0 })).unwrap();
        assert!(ok.delivered());
        let failed: SendResponse =
            serde_json::from_value(json!({ "success": 0, "failure": 1 })).unwrap();
        assert!(!failed.delivered());
    }

    #[tokio::test]
    async fn test_unconfigured_sender_returns_false() {
        let sender = FcmSender::new(String::new(), "http://127.0.0.1:1/".to_string()).unwrap();
        assert!(!sender.send("tok", "t", "b", &json!({})).await);
    }

    #[tokio::test]
    async fn test_transport_failure_returns_false() {
        let sender = FcmSender::new("key".to_string(), "http://127.0.0.1:1/".to_string()).unwrap();
        assert!(!sender.send("tok", "t", "b", &json!({})).await);
    }
}
