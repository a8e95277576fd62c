use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::str::FromStr;

use super::analytics::{is_truthy, trimmed};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected items record who resolved them
    pub fn is_resolution(&self) -> bool {
        matches!(self, ModerationStatus::Approved | ModerationStatus::Rejected)
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ModerationStatus::Pending),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            other => Err(format!("unknown moderation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModerationItem {
    pub id: i64,
    pub content_type: String,
    pub content_id: Option<i64>,
    #[serde(rename = "user")]
    pub user_id: Option<i64>,
    pub reason: String,
    pub status: String,
    pub metadata: Value,
    #[serde(rename = "resolved_by")]
    pub resolved_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated ingest payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewModerationItem {
    pub content_type: String,
    pub content_id: Option<i64>,
    pub reason: String,
    pub metadata: Value,
}

const MAX_CONTENT_TYPE_LEN: usize = 32;
const MAX_REASON_LEN: usize = 128;

impl NewModerationItem {
    /// Reads an ingest body; `content_id` is kept only when it is an integer
    pub fn from_body(body: &Value) -> Result<Self, String> {
        let content_type = trimmed(body, "content_type");
        if content_type.is_empty() {
            return Err("'content_type' is required.".to_string());
        }
        if content_type.chars().count() > MAX_CONTENT_TYPE_LEN {
            return Err(format!(
                "'content_type' must be at most {} characters.",
                MAX_CONTENT_TYPE_LEN
            ));
        }

        let reason = trimmed(body, "reason");
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(format!("'reason' must be at most {} characters.", MAX_REASON_LEN));
        }

        let metadata = body
            .get("metadata")
            .filter(|m| is_truthy(m))
            .cloned()
            .unwrap_or_else(|| body.clone());

        Ok(Self {
            content_type,
            content_id: body.get("content_id").and_then(Value::as_i64),
            reason,
            metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct QueueListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Staff edits to a queue item
#[derive(Debug, Default, Deserialize)]
pub struct UpdateModerationRequest {
    pub status: Option<ModerationStatus>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
}
