use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalyticsEvent {
    pub id: i64,
    #[serde(rename = "user")]
    pub user_id: Option<i64>,
    pub event: String,
    pub imdb_id: String,
    pub source: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Validated ingest payload, ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalyticsEvent {
    pub event: String,
    pub imdb_id: String,
    pub source: String,
    pub payload: Value,
}

const MAX_EVENT_LEN: usize = 64;
const MAX_IMDB_ID_LEN: usize = 16;
const MAX_SOURCE_LEN: usize = 32;

impl NewAnalyticsEvent {
    /// Reads an ingest body
    ///
    /// `default_source` applies when the body names no source ("app" for
    /// users, "n8n" for the automation). Without a usable `payload` the
    /// whole body is stored.
    pub fn from_body(body: &Value, default_source: &str) -> Result<Self, String> {
        let event = trimmed(body, "event");
        if event.is_empty() {
            return Err("'event' is required.".to_string());
        }

        let imdb_id = trimmed(body, "imdb_id");
        let source = match trimmed(body, "source") {
            s if s.is_empty() => default_source.to_string(),
            s => s,
        };

        if event.chars().count() > MAX_EVENT_LEN {
            return Err(format!("'event' must be at most {} characters.", MAX_EVENT_LEN));
        }
        if imdb_id.chars().count() > MAX_IMDB_ID_LEN {
            return Err(format!("'imdb_id' must be at most {} characters.", MAX_IMDB_ID_LEN));
        }
        if source.chars().count() > MAX_SOURCE_LEN {
            return Err(format!("'source' must be at most {} characters.", MAX_SOURCE_LEN));
        }

        let payload = body
            .get("payload")
            .filter(|p| is_truthy(p))
            .cloned()
            .unwrap_or_else(|| body.clone());

        Ok(Self {
            event,
            imdb_id,
            source,
            payload,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// String field from a loose JSON body, trimmed; non-strings read as empty
pub(crate) fn trimmed(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Whether a JSON value carries anything (non-null, non-empty, non-zero)
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_is_required() {
        assert!(NewAnalyticsEvent::from_body(&json!({}), "app").is_err());
        assert!(NewAnalyticsEvent::from_body(&json!({ "event": "   " }), "app").is_err());
        assert!(NewAnalyticsEvent::from_body(&json!({ "event": 5 }), "app").is_err());
    }

    #[test]
    fn test_defaults_for_user_caller() {
        let body = json!({ "event": " movie_view ", "imdb_id": "tt0133093" });
        let event = NewAnalyticsEvent::from_body(&body, "app").unwrap();
        assert_eq!(event.event, "movie_view");
        assert_eq!(event.imdb_id, "tt0133093");
        assert_eq!(event.source, "app");
        assert_eq!(event.payload, body);
    }

    #[test]
    fn test_explicit_source_and_payload() {
        let body = json!({
            "event": "digest_sent",
            "source": "n8n-cron",
            "payload": { "users": 12 }
        });
        let event = NewAnalyticsEvent::from_body(&body, "n8n").unwrap();
        assert_eq!(event.source, "n8n-cron");
        assert_eq!(event.payload, json!({ "users": 12 }));
    }

    #[test]
    fn test_empty_payload_falls_back_to_body() {
        let body = json!({ "event": "x", "payload": {} });
        let event = NewAnalyticsEvent::from_body(&body, "n8n").unwrap();
        assert_eq!(event.source, "n8n");
        assert_eq!(event.payload, body);
    }

    #[test]
    fn test_overlong_event_is_rejected() {
        let body = json!({ "event": "e".repeat(65) });
        assert!(NewAnalyticsEvent::from_body(&body, "app").is_err());
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({ "a": 1 })));
        assert!(is_truthy(&json!(true)));
    }
}
