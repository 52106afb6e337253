use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use lucky_draw::{
    cli::Config,
    http,
    keys::KeySpace,
    profile::{GithubProvider, ProfileCache},
    store::{KeyValueStore, MemoryStore, RedisStore},
    LuckyDraw,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::parse();
    let keys = KeySpace::new(config.key_prefix.as_str());

    let mut provider = GithubProvider::new(config.github_api.as_str(), config.provider_timeout())
        .context("building GitHub client")?;
    if let Some(token) = &config.github_token {
        provider = provider.with_token(token.as_str());
    }

    match &config.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .context("connecting to redis")?;
            serve(&config, store, provider, keys).await
        }
        None => {
            warn!("no redis url configured; draw state lives in this process only");
            serve(&config, MemoryStore::new(), provider, keys).await
        }
    }
}

async fn serve<S: KeyValueStore>(
    config: &Config,
    store: S,
    provider: GithubProvider,
    keys: KeySpace,
) -> Result<()> {
    let store = Arc::new(store);
    let profiles = ProfileCache::new(Arc::clone(&store), Arc::new(provider), keys.clone())
        .with_ttl(config.profile_ttl());
    let draw = Arc::new(LuckyDraw::with_profiles(store, profiles, keys));

    if config.admin_password.is_none() {
        warn!("no admin password configured; admin routes are disabled");
    }
    let app = http::router(
        draw,
        config.admin_password.clone(),
        config.request_timeout(),
    );

    let listener = TcpListener::bind(config.listen).await?;
    info!("lucky draw listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
