use serde_json::Value;

pub mod fcm;

pub use fcm::FcmSender;

/// Delivers push notifications to a single device
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PushSender: Send + Sync {
    /// Returns whether the push service accepted the message; never errors
    async fn send(&self, device_token: &str, title: &str, body: &str, data: &Value) -> bool;
}
