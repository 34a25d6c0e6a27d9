use std::sync::Arc;

use esg_catalog::Catalog;
use esg_core::{AnalysisStore, PlatformConfig};
use esg_engine::AnalysisOrchestrator;
use esg_governor::SlidingWindowLimiter;

use crate::auth::TokenAuthority;
use crate::metrics::ApiMetrics;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub catalog: &'static Catalog,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub store: Arc<dyn AnalysisStore>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub tokens: Arc<TokenAuthority>,
    pub metrics: Arc<ApiMetrics>,
    pub free_tier_credits: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: &PlatformConfig,
        orchestrator: Arc<AnalysisOrchestrator>,
        metrics: Arc<ApiMetrics>,
    ) -> Self {
        Self {
            catalog: Catalog::global(),
            store: orchestrator.store().clone(),
            limiter: orchestrator.limiter().clone(),
            tokens: Arc::new(TokenAuthority::new(&config.jwt_secret, config.token_ttl_min)),
            orchestrator,
            metrics,
            free_tier_credits: config.free_tier_credits,
            started_at: chrono::Utc::now(),
        }
    }
}
