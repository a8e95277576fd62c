use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub delivered: bool,
    pub sent_at: DateTime<Utc>,
}

/// Title and body drafted by the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationMessage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateNotificationRequest {
    pub context: Value,
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl GenerateNotificationRequest {
    /// The push target, if a non-blank token was given
    pub fn device_token(&self) -> Option<&str> {
        self.device_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedNotification {
    pub notification: Notification,
    pub generated: NotificationMessage,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkCreateRequest {
    #[validate(length(min = 1, message = "user_ids must not be empty"))]
    pub user_ids: Vec<i64>,
    pub context: Value,
    #[serde(default)]
    pub template_type: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCreated {
    pub count: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPushItem {
    pub notification_id: i64,
    pub device_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkPushRequest {
    #[validate(length(min = 1, max = 500, message = "items must hold 1-500 entries"))]
    pub items: Vec<BulkPushItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BulkPushResult {
    pub attempted: usize,
    pub delivered: usize,
}

/// Builds the stored payload for bulk-created notifications
///
/// Non-object `data` is dropped; a non-blank `template_type` is added as a key.
pub fn merge_template_type(data: Option<&Value>, template_type: Option<&str>) -> Value {
    let mut payload = data
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    if let Some(template) = template_type.map(str::trim).filter(|t| !t.is_empty()) {
        payload.insert("template_type".to_string(), Value::String(template.to_string()));
    }

    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_template_type() {
        let data = json!({ "imdb_id": "tt0133093" });
        assert_eq!(
            merge_template_type(Some(&data), Some("new_release")),
            json!({ "imdb_id": "tt0133093", "template_type": "new_release" })
        );
        assert_eq!(merge_template_type(Some(&data), Some("  ")), data);
        assert_eq!(merge_template_type(None, None), json!({}));
        assert_eq!(merge_template_type(Some(&json!([1, 2])), None), json!({}));
    }

    #[test]
    fn test_device_token_ignores_blank() {
        let req: GenerateNotificationRequest =
            serde_json::from_value(json!({ "context": {}, "device_token": " " })).unwrap();
        assert_eq!(req.device_token(), None);

        let req: GenerateNotificationRequest =
            serde_json::from_value(json!({ "context": {}, "device_token": "abc" })).unwrap();
        assert_eq!(req.device_token(), Some("abc"));
    }

    #[test]
    fn test_bulk_push_requires_items() {
        let req: BulkPushRequest = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert!(req.validate().is_err());

        let req: BulkPushRequest = serde_json::from_value(json!({
            "items": [{ "notification_id": 1, "device_token": "abc" }]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_notification_hides_owner() {
        let notification = Notification {
            id: 1,
            user_id: 9,
            title: "t".into(),
            body: "b".into(),
            data: json!({}),
            delivered: false,
            sent_at: Utc::now(),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["delivered"], false);
    }
}
