//! esg-server: boots the analysis platform with the configured backends.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use esg_acquire::{AcquirerConfig, ContentAcquirer};
use esg_api::{build_router, ApiMetrics, AppState};
use esg_cache::{AnalysisCache, MemoryCache, RedisCache};
use esg_catalog::Catalog;
use esg_core::{AnalysisStore, CacheBackend, PlatformConfig};
use esg_db::{MemoryStore, PostgresStore};
use esg_engine::{AnalysisOrchestrator, OrchestratorConfig};
use esg_governor::SlidingWindowLimiter;

#[derive(Parser, Debug)]
#[command(name = "esg-server", about = "ESG disclosure analysis platform")]
struct Args {
    /// Override the configured bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = PlatformConfig::load().context("configuration")?;

    let catalog = Catalog::global();
    tracing::info!(
        version = catalog.version(),
        requirements = catalog.len(),
        "framework catalog loaded"
    );

    let store: Arc<dyn AnalysisStore> = match &config.db_uri {
        Some(uri) => {
            let pg = PostgresStore::connect(uri, config.db_pool_min, config.db_pool_max)
                .await
                .context("database connection")?;
            pg.initialize().await.context("schema initialization")?;
            tracing::info!("using postgres persistence");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DB_URI not set, using in-memory persistence");
            Arc::new(MemoryStore::new())
        }
    };

    let backend: Arc<dyn CacheBackend> = match &config.cache_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => {
                tracing::info!("using redis cache");
                Arc::new(redis)
            }
            Err(err) => {
                tracing::warn!(error = %err, "redis unavailable, using in-memory cache");
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };
    let cache = Arc::new(AnalysisCache::new(
        backend,
        Duration::from_secs(config.cache_ttl_sec),
    ));

    let limiter = Arc::new(match &config.rate_limit_overrides {
        Some(spec) => SlidingWindowLimiter::with_overrides(spec),
        None => SlidingWindowLimiter::new(),
    });

    let acquirer = Arc::new(
        ContentAcquirer::new(AcquirerConfig {
            timeout_ms: config.fetch_timeout_ms,
            connect_timeout_ms: 5_000,
            max_bytes: config.fetch_max_bytes,
            allow_private_hosts: false,
        })
        .context("http client")?,
    );

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        catalog,
        store,
        cache,
        limiter,
        acquirer,
        None,
        OrchestratorConfig {
            cache_ttl: Duration::from_secs(config.cache_ttl_sec),
            ..OrchestratorConfig::default()
        },
    ));

    let metrics = Arc::new(ApiMetrics::new().context("metrics registry")?);
    let state = AppState::new(&config, orchestrator, metrics);
    let router = build_router(state, &config.cors_origin_list());

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);
    esg_api::serve(router, &host, port).await.context("serve")?;
    Ok(())
}
