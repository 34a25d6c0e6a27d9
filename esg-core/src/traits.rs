use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::errors::EsgResult;
use crate::types::{
    ActivityRecord, Analysis, AnalysisId, BenchmarkAggregate, CompanyProfile, Framework,
    SentimentSignal, User, UserId,
};

/// Persistence contract (C9). Implementations are externally synchronized;
/// `update_user_credits` is the only path allowed to mutate balances and
/// must be observably atomic.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Creates the user, or returns the existing record when the email is
    /// already registered.
    async fn create_user(&self, user: User) -> EsgResult<User>;

    async fn get_user(&self, id: &UserId) -> EsgResult<Option<User>>;

    async fn touch_user(&self, id: &UserId) -> EsgResult<()>;

    /// Applies `delta` to the balance. Refuses to move below zero with the
    /// typed insufficient-credits error and returns the new balance.
    async fn update_user_credits(&self, id: &UserId, delta: i64) -> EsgResult<i64>;

    async fn insert_analysis(&self, analysis: &Analysis) -> EsgResult<()>;

    /// Owner-scoped read: not-found both when the id is unknown and when
    /// the owner mismatches.
    async fn get_analysis(&self, user: &UserId, id: &AnalysisId) -> EsgResult<Analysis>;

    async fn list_analyses_by_user(
        &self,
        user: &UserId,
        page: u32,
        size: u32,
    ) -> EsgResult<Vec<Analysis>>;

    /// Company history, oldest first, bounded by `since`.
    async fn list_by_company(&self, name: &str, since: DateTime<Utc>) -> EsgResult<Vec<Analysis>>;

    /// Latest analyses for a company, newest first, at most `count`.
    async fn latest_by_company(&self, name: &str, count: u32) -> EsgResult<Vec<Analysis>>;

    async fn aggregate_benchmark(
        &self,
        frameworks: &[Framework],
        sector: Option<&str>,
    ) -> EsgResult<BenchmarkAggregate>;

    async fn upsert_company(&self, profile: &CompanyProfile) -> EsgResult<()>;

    async fn get_company(&self, name: &str) -> EsgResult<Option<CompanyProfile>>;

    async fn record_activity(&self, record: ActivityRecord) -> EsgResult<()>;

    async fn list_activity(&self, user: &UserId, limit: u32) -> EsgResult<Vec<ActivityRecord>>;

    /// Latest overall score per company within a sector (all sectors when
    /// `None`); used for comparison baselines.
    async fn sector_overall_scores(&self, sector: Option<&str>) -> EsgResult<Vec<f64>>;

    async fn ping(&self) -> EsgResult<()>;
}

/// Cache contract (C7). Best effort: backend unavailability is an error the
/// caller downgrades to a local compute, never a request failure.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> EsgResult<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> EsgResult<()>;

    async fn ping(&self) -> EsgResult<()>;
}

/// Optional external sentiment collaborator. Absence or failure leaves
/// scoring unadjusted.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn classify(&self, text: &str) -> EsgResult<SentimentSignal>;
}
