use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use traffic_copilot::analytics::{
    Cache, Ga4Client, MemoryCache, SearchConsoleClient, SqliteCache,
};
use traffic_copilot::chat_core::ChatPipeline;
use traffic_copilot::completion::ResponsesClient;
use traffic_copilot::config::{self, CacheBackend};
use traffic_copilot::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let config = config::load_or_default(&cwd).context("failed to load configuration")?;

    traffic_copilot::init_tracing(&config.logging);

    if config.completion.api_key.is_none() {
        tracing::warn!("no completion API key configured; chat requests will fail with no_api_key");
    }
    if config.analytics.access_token.is_none() {
        tracing::warn!("no analytics access token configured; answers will lack analytics data");
    }

    let completion = Arc::new(ResponsesClient::from_config(&config.completion)?);
    let analytics = Arc::new(Ga4Client::from_config(&config.analytics)?);
    let keywords = Arc::new(SearchConsoleClient::from_config(&config.analytics)?);

    let cache: Arc<dyn Cache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Sqlite => {
            let path = config.cache.sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create cache directory {}", parent.display())
                })?;
            }
            tracing::info!(path = %path.display(), "opening SQLite cache");
            Arc::new(SqliteCache::open(&path.to_string_lossy())?)
        }
    };

    let pipeline = ChatPipeline::new(&config, completion, analytics, keywords, cache);
    let app = server::router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let bind_addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("failed to bind to address")?;
    tracing::info!(address = %bind_addr, model = %config.completion.model, "listening");

    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
