use std::sync::Arc;

use movie_social_api::api::{create_router, AppState};
use movie_social_api::config::Config;
use movie_social_api::db::{create_pool, create_redis_client, run_migrations, Cache};
use movie_social_api::services::catalog::OmdbCatalog;
use movie_social_api::services::llm::GeminiClient;
use movie_social_api::services::push::FcmSender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movie_social_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Database
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Cache
    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client);

    // External integrations
    let catalog = Arc::new(OmdbCatalog::new(
        config.omdb_api_key.clone(),
        config.omdb_api_url.clone(),
    )?);
    let llm = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
    )?);
    let push = Arc::new(FcmSender::new(
        config.fcm_server_key.clone(),
        config.fcm_api_url.clone(),
    )?);

    if config.n8n_secret().is_none() {
        tracing::warn!("N8N_SHARED_SECRET is not set; automation requests will be rejected");
    }

    let addr = format!("{}:{}", config.host, config.port);

    // Initialize application state
    let state = AppState::new(db, cache, catalog, llm, push, config);

    // Create the router with all routes
    let app = create_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
