use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

/// Default lifetime for cached catalog and LLM results
pub const DEFAULT_TTL: u64 = 3600; // 1 hour

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieSearch { query: String, page: u32 },
    Recommendations(i64),
    ReviewSummary { imdb_id: String, review_count: usize },
    RevokedToken(String),
    Throttle { scope: &'static str, user_id: i64, window: u64 },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::MovieSearch { query, page } => {
                write!(f, "search:{}:{}", query.to_lowercase(), page)
            }
            CacheKey::Recommendations(user_id) => write!(f, "reco:{}", user_id),
            CacheKey::ReviewSummary {
                imdb_id,
                review_count,
            } => write!(f, "summary:{}:{}", imdb_id, review_count),
            CacheKey::RevokedToken(jti) => write!(f, "revoked:{}", jti),
            CacheKey::Throttle {
                scope,
                user_id,
                window,
            } => write!(f, "throttle:{}:{}:{}", scope, user_id, window),
        }
    }
}

/// Creates a Redis client for caching
///
/// The client connects lazily; nothing is dialed until the first command.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task, which flushes all
    /// pending writes to Redis before exiting.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a new Cache instance with an async write background task
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    /// Background task that processes cache write messages
    ///
    /// On shutdown signal, flushes all remaining messages before exiting.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");
                    write_rx.close();

                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` when the key is absent.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Like [`Cache::get_from_cache`], but treats any cache failure as a miss
    pub async fn get_or_miss<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.get_from_cache(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores a value in the cache asynchronously without blocking
    ///
    /// The value is serialized here and handed to the background writer, so
    /// the caller never waits on Redis.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }

    /// Stores a marker value and waits for Redis to acknowledge it
    ///
    /// Used where a later request must observe the write, e.g. revoked tokens.
    pub async fn set_now(&self, key: &CacheKey, ttl: u64) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key.to_string(), "1", ttl.max(1)).await?;
        Ok(())
    }

    /// Sets a marker only when the key is absent (`SET NX EX`)
    ///
    /// Returns true when this call created the key. Concurrent callers racing
    /// for the same key see exactly one `true`.
    pub async fn claim(&self, key: &CacheKey, ttl: u64) -> AppResult<bool> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.to_string())
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    pub async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let found: bool = conn.exists(key.to_string()).await?;
        Ok(found)
    }

    /// Increments a counter, setting its expiry when the counter is new
    ///
    /// Returns the counter value after the increment.
    pub async fn increment(&self, key: &CacheKey, ttl: u64) -> AppResult<u64> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = key.to_string();
        let count: u64 = conn.incr(&key, 1u64).await?;
        if count == 1 {
            let _: () = conn.expire(&key, ttl as i64).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_cache() -> Cache {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        Cache::new(create_redis_client(&url).unwrap()).0
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_claim_is_granted_once() {
        let cache = live_cache();
        let key = CacheKey::RevokedToken(uuid::Uuid::new_v4().simple().to_string());

        let (first, second) = tokio::join!(cache.claim(&key, 30), cache.claim(&key, 30));
        let granted = [first.unwrap(), second.unwrap()];
        assert_eq!(granted.iter().filter(|g| **g).count(), 1);
        assert!(!cache.claim(&key, 30).await.unwrap());
        assert!(cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_fails_without_redis() {
        let cache = Cache::new(create_redis_client("redis://127.0.0.1:1").unwrap()).0;
        let key = CacheKey::RevokedToken("abc".to_string());
        assert!(cache.claim(&key, 30).await.is_err());
    }

    #[test]
    fn test_cache_key_display_movie_search_lowercase() {
        let key = CacheKey::MovieSearch {
            query: "THE MATRIX".to_string(),
            page: 2,
        };
        assert_eq!(key.to_string(), "search:the matrix:2");
    }

    #[test]
    fn test_cache_key_display_recommendations() {
        assert_eq!(CacheKey::Recommendations(7).to_string(), "reco:7");
    }

    #[test]
    fn test_cache_key_display_review_summary() {
        let key = CacheKey::ReviewSummary {
            imdb_id: "tt1375666".to_string(),
            review_count: 12,
        };
        assert_eq!(key.to_string(), "summary:tt1375666:12");
    }

    #[test]
    fn test_cache_key_display_revoked_token() {
        let key = CacheKey::RevokedToken("abc".to_string());
        assert_eq!(key.to_string(), "revoked:abc");
    }

    #[test]
    fn test_cache_key_display_throttle() {
        let key = CacheKey::Throttle {
            scope: "llm",
            user_id: 3,
            window: 29_000_000,
        };
        assert_eq!(key.to_string(), "throttle:llm:3:29000000");
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_in_background_writes_to_cache() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client.clone());

        let key = CacheKey::Recommendations(-1);
        let value = vec!["item1".to_string(), "item2".to_string()];

        cache.set_in_background(&key, &value, 60);
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_writer_graceful_shutdown() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client.clone());

        let key = CacheKey::Recommendations(-2);
        let value = vec!["shutdown_test".to_string()];

        cache.set_in_background(&key, &value, 60);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_increment_counts_within_window() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client.clone());

        let key = CacheKey::Throttle {
            scope: "test",
            user_id: -1,
            window: 1,
        };
        assert_eq!(cache.increment(&key, 60).await.unwrap(), 1);
        assert_eq!(cache.increment(&key, 60).await.unwrap(), 2);

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_or_miss_degrades_when_redis_unreachable() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);

        let value: Option<Vec<String>> = cache.get_or_miss(&CacheKey::Recommendations(1)).await;
        assert_eq!(value, None);
    }
}
