//! Sliding-window rate limiting per user, endpoint and tier. The window
//! log keeps request timestamps; a request at the window edge ages out
//! exactly one period after it was admitted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use esg_core::{EsgError, EsgResult, Tier, UsageReport, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Analyze,
    Compare,
    Export,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Analyze => "analyze",
            Endpoint::Compare => "compare",
            Endpoint::Export => "export",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "analyze" => Some(Endpoint::Analyze),
            "compare" => Some(Endpoint::Compare),
            "export" => Some(Endpoint::Export),
            _ => None,
        }
    }

    /// Export limits are daily; everything else uses a one-hour window.
    fn window(&self) -> ChronoDuration {
        match self {
            Endpoint::Export => ChronoDuration::hours(24),
            _ => ChronoDuration::hours(1),
        }
    }
}

fn default_limit(endpoint: Endpoint, tier: Tier) -> u32 {
    match (endpoint, tier) {
        (Endpoint::Analyze, Tier::Anonymous) => 5,
        (Endpoint::Analyze, Tier::Free) => 20,
        (Endpoint::Analyze, Tier::Starter) => 100,
        (Endpoint::Analyze, Tier::Growth) => 500,
        (Endpoint::Analyze, Tier::Enterprise) => 2000,
        (Endpoint::Compare, Tier::Anonymous) => 5,
        (Endpoint::Compare, Tier::Free) => 10,
        (Endpoint::Compare, Tier::Starter) => 50,
        (Endpoint::Compare, Tier::Growth) => 200,
        (Endpoint::Compare, Tier::Enterprise) => 1000,
        (Endpoint::Export, Tier::Anonymous) => 1,
        (Endpoint::Export, Tier::Free) => 5,
        (Endpoint::Export, Tier::Starter) => 20,
        (Endpoint::Export, Tier::Growth) => 100,
        (Endpoint::Export, Tier::Enterprise) => 1000,
    }
}

/// Admission decision for an allowed request.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<(UserId, Endpoint), VecDeque<DateTime<Utc>>>>,
    overrides: HashMap<(Endpoint, Tier), u32>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            overrides: HashMap::new(),
        }
    }

    /// Override syntax: `analyze:free=30,export:starter=40`. Unparseable
    /// entries are skipped with a warning.
    pub fn with_overrides(spec: &str) -> Self {
        let mut overrides = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parsed = entry.split_once('=').and_then(|(key, value)| {
                let (endpoint, tier) = key.split_once(':')?;
                Some((
                    Endpoint::parse(endpoint.trim())?,
                    Tier::parse(tier.trim()).ok()?,
                    value.trim().parse::<u32>().ok()?,
                ))
            });
            match parsed {
                Some((endpoint, tier, limit)) => {
                    overrides.insert((endpoint, tier), limit);
                }
                None => tracing::warn!(entry, "ignoring malformed rate limit override"),
            }
        }
        Self {
            windows: Mutex::new(HashMap::new()),
            overrides,
        }
    }

    pub fn limit_for(&self, endpoint: Endpoint, tier: Tier) -> u32 {
        self.overrides
            .get(&(endpoint, tier))
            .copied()
            .unwrap_or_else(|| default_limit(endpoint, tier))
    }

    /// Admits or rejects a request now.
    pub fn check(&self, user: &UserId, tier: Tier, endpoint: Endpoint) -> EsgResult<Decision> {
        self.check_at(user, tier, endpoint, Utc::now())
    }

    fn check_at(
        &self,
        user: &UserId,
        tier: Tier,
        endpoint: Endpoint,
        now: DateTime<Utc>,
    ) -> EsgResult<Decision> {
        let limit = self.limit_for(endpoint, tier);
        let window = endpoint.window();

        let mut windows = self.windows.lock();
        let log = windows.entry((user.clone(), endpoint)).or_default();

        while log.front().map_or(false, |&ts| ts + window <= now) {
            log.pop_front();
        }

        if log.len() as u32 >= limit {
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after_secs = ((oldest + window) - now).num_seconds().max(1) as u64;
            return Err(EsgError::RateLimited {
                retry_after_secs,
                tier,
                limit,
            });
        }

        log.push_back(now);
        let oldest = log.front().copied().unwrap_or(now);
        Ok(Decision {
            limit,
            remaining: limit - log.len() as u32,
            reset_at: oldest + window,
        })
    }

    /// Current window usage without admitting a request.
    pub fn usage(&self, user: &UserId, tier: Tier, endpoint: Endpoint) -> UsageReport {
        self.usage_at(user, tier, endpoint, Utc::now())
    }

    fn usage_at(
        &self,
        user: &UserId,
        tier: Tier,
        endpoint: Endpoint,
        now: DateTime<Utc>,
    ) -> UsageReport {
        let limit = self.limit_for(endpoint, tier);
        let window = endpoint.window();
        let mut windows = self.windows.lock();
        let log = windows.entry((user.clone(), endpoint)).or_default();
        while log.front().map_or(false, |&ts| ts + window <= now) {
            log.pop_front();
        }
        let current = log.len() as u32;
        UsageReport {
            current_usage: current,
            limit,
            percentage: if limit == 0 {
                100.0
            } else {
                esg_core::round1(100.0 * current as f64 / limit as f64)
            },
            reset_at: log.front().copied().unwrap_or(now) + window,
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}
