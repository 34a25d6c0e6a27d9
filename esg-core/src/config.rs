use serde::Deserialize;

use crate::errors::{EsgError, EsgResult};

/// Platform configuration, layered defaults under environment overrides.
/// Keys match the documented environment variables (`JWT_SECRET`, `DB_URI`,
/// `CACHE_URL`, ...), matched case-insensitively.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub jwt_secret: String,
    pub token_ttl_min: i64,
    pub db_uri: Option<String>,
    pub db_pool_min: u32,
    pub db_pool_max: u32,
    pub cache_url: Option<String>,
    pub free_tier_credits: i64,
    pub cors_origins: String,
    pub rate_limit_overrides: Option<String>,
    pub fetch_max_bytes: u64,
    pub fetch_timeout_ms: u64,
    pub cache_ttl_sec: u64,
    pub host: String,
    pub port: u16,
}

impl PlatformConfig {
    pub fn load() -> EsgResult<Self> {
        let settings = config::Config::builder()
            .set_default("token_ttl_min", 1440i64)
            .and_then(|b| b.set_default("db_pool_min", 5i64))
            .and_then(|b| b.set_default("db_pool_max", 50i64))
            .and_then(|b| b.set_default("free_tier_credits", 100i64))
            .and_then(|b| b.set_default("cors_origins", "*"))
            .and_then(|b| b.set_default("fetch_max_bytes", 10_485_760i64))
            .and_then(|b| b.set_default("fetch_timeout_ms", 15_000i64))
            .and_then(|b| b.set_default("cache_ttl_sec", 86_400i64))
            .and_then(|b| b.set_default("host", "0.0.0.0"))
            .and_then(|b| b.set_default("port", 8080i64))
            .map_err(|e| EsgError::Config {
                parameter: "defaults".to_string(),
                reason: e.to_string(),
            })?
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| EsgError::Config {
                parameter: "environment".to_string(),
                reason: e.to_string(),
            })?;

        let cfg: PlatformConfig = settings.try_deserialize().map_err(|e| EsgError::Config {
            parameter: "jwt_secret".to_string(),
            reason: format!("incomplete configuration: {}", e),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EsgResult<()> {
        if self.jwt_secret.len() < 16 {
            return Err(EsgError::Config {
                parameter: "jwt_secret".to_string(),
                reason: "must be at least 16 bytes".to_string(),
            });
        }
        if self.db_pool_min > self.db_pool_max {
            return Err(EsgError::Config {
                parameter: "db_pool_min".to_string(),
                reason: "exceeds db_pool_max".to_string(),
            });
        }
        Ok(())
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Configuration suitable for tests and local development: in-memory
    /// backends, short fetch limits.
    pub fn for_tests() -> Self {
        Self {
            jwt_secret: "test-secret-test-secret".to_string(),
            token_ttl_min: 1440,
            db_uri: None,
            db_pool_min: 5,
            db_pool_max: 50,
            cache_url: None,
            free_tier_credits: 100,
            cors_origins: "*".to_string(),
            rate_limit_overrides: None,
            fetch_max_bytes: 10_485_760,
            fetch_timeout_ms: 15_000,
            cache_ttl_sec: 86_400,
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_passes_validation() {
        let cfg = PlatformConfig::for_tests();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.token_ttl_min, 1440);
        assert_eq!(cfg.free_tier_credits, 100);
        assert_eq!(cfg.fetch_max_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut cfg = PlatformConfig::for_tests();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = PlatformConfig::for_tests();
        cfg.db_pool_min = 60;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let mut cfg = PlatformConfig::for_tests();
        cfg.cors_origins = "https://a.example, https://b.example".to_string();
        assert_eq!(
            cfg.cors_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
