use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Cache;
use crate::services::catalog::MovieCatalog;
use crate::services::llm::LanguageModel;
use crate::services::push::PushSender;

/// Shared application state
///
/// Everything is cheap to clone: the pool, the cache handle and the
/// integrations are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cache: Cache,
    pub catalog: Arc<dyn MovieCatalog>,
    pub llm: Arc<dyn LanguageModel>,
    pub push: Arc<dyn PushSender>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        cache: Cache,
        catalog: Arc<dyn MovieCatalog>,
        llm: Arc<dyn LanguageModel>,
        push: Arc<dyn PushSender>,
        config: Config,
    ) -> Self {
        Self {
            db,
            cache,
            catalog,
            llm,
            push,
            config: Arc::new(config),
        }
    }

    pub fn page_size(&self) -> i64 {
        self.config.page_size
    }
}

#[cfg(test)]
impl AppState {
    /// State over `db` with mocked integrations and an unreachable Redis
    ///
    /// Must be called inside a Tokio runtime (the cache writer is spawned).
    pub fn for_tests(db: PgPool) -> Self {
        use crate::db::create_redis_client;
        use crate::services::catalog::MockMovieCatalog;
        use crate::services::llm::MockLanguageModel;
        use crate::services::push::MockPushSender;

        let mut llm = MockLanguageModel::new();
        llm.expect_is_configured().return_const(false);

        let (cache, _handle) =
            Cache::new(create_redis_client("redis://127.0.0.1:1").expect("redis url"));

        Self::new(
            db,
            cache,
            Arc::new(MockMovieCatalog::new()),
            Arc::new(llm),
            Arc::new(MockPushSender::new()),
            Config::for_tests(),
        )
    }
}
