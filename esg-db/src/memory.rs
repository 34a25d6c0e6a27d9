//! Full-fidelity in-memory store used by tests and single-node
//! development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use esg_core::{
    ActivityRecord, Analysis, AnalysisId, AnalysisStore, BenchmarkAggregate, CompanyProfile,
    EsgError, EsgResult, Framework, User, UserId,
};

use crate::benchmark::aggregate_from_latest;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    email_index: HashMap<String, UserId>,
    analyses: HashMap<AnalysisId, Analysis>,
    companies: HashMap<String, CompanyProfile>,
    activity: Vec<ActivityRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest_per_company(inner: &Inner, sector: Option<&str>) -> Vec<Analysis> {
        let mut latest: HashMap<String, &Analysis> = HashMap::new();
        for analysis in inner.analyses.values() {
            let Some(company) = analysis.company_name.as_deref() else {
                continue;
            };
            if let Some(wanted) = sector {
                if analysis.industry_sector.as_deref().map(|s| s.to_lowercase())
                    != Some(wanted.to_lowercase())
                {
                    continue;
                }
            }
            let key = company.to_lowercase();
            let newer = latest
                .get(&key)
                .map_or(true, |existing| existing.created_at < analysis.created_at);
            if newer {
                latest.insert(key, analysis);
            }
        }
        latest.into_values().cloned().collect()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn create_user(&self, user: User) -> EsgResult<User> {
        let mut inner = self.inner.write();
        if let Some(existing_id) = inner.email_index.get(&user.email) {
            let existing_id = existing_id.clone();
            return Ok(inner.users[&existing_id].clone());
        }
        inner.email_index.insert(user.email.clone(), user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &UserId) -> EsgResult<Option<User>> {
        Ok(self.inner.read().users.get(id).cloned())
    }

    async fn touch_user(&self, id: &UserId) -> EsgResult<()> {
        if let Some(user) = self.inner.write().users.get_mut(id) {
            user.last_seen_at = Utc::now();
        }
        Ok(())
    }

    async fn update_user_credits(&self, id: &UserId, delta: i64) -> EsgResult<i64> {
        let mut inner = self.inner.write();
        let user = inner
            .users
            .get_mut(id)
            .ok_or_else(|| EsgError::not_found("user"))?;
        let next = user.credits + delta;
        if next < 0 {
            return Err(EsgError::InsufficientCredits {
                required: -delta,
                available: user.credits,
            });
        }
        user.credits = next;
        Ok(next)
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> EsgResult<()> {
        self.inner
            .write()
            .analyses
            .insert(analysis.id, analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, user: &UserId, id: &AnalysisId) -> EsgResult<Analysis> {
        self.inner
            .read()
            .analyses
            .get(id)
            .filter(|a| &a.user_id == user)
            .cloned()
            .ok_or_else(|| EsgError::not_found("analysis"))
    }

    async fn list_analyses_by_user(
        &self,
        user: &UserId,
        page: u32,
        size: u32,
    ) -> EsgResult<Vec<Analysis>> {
        let inner = self.inner.read();
        let mut mine: Vec<&Analysis> = inner
            .analyses
            .values()
            .filter(|a| &a.user_id == user)
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine
            .into_iter()
            .skip((page as usize) * size as usize)
            .take(size as usize)
            .cloned()
            .collect())
    }

    async fn list_by_company(
        &self,
        name: &str,
        since: DateTime<Utc>,
    ) -> EsgResult<Vec<Analysis>> {
        let inner = self.inner.read();
        let needle = name.to_lowercase();
        let mut matching: Vec<&Analysis> = inner
            .analyses
            .values()
            .filter(|a| {
                a.company_name.as_deref().map(|c| c.to_lowercase()) == Some(needle.clone())
                    && a.created_at >= since
            })
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching.into_iter().cloned().collect())
    }

    async fn latest_by_company(&self, name: &str, count: u32) -> EsgResult<Vec<Analysis>> {
        let inner = self.inner.read();
        let needle = name.to_lowercase();
        let mut matching: Vec<&Analysis> = inner
            .analyses
            .values()
            .filter(|a| a.company_name.as_deref().map(|c| c.to_lowercase()) == Some(needle.clone()))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().take(count as usize).cloned().collect())
    }

    async fn aggregate_benchmark(
        &self,
        frameworks: &[Framework],
        sector: Option<&str>,
    ) -> EsgResult<BenchmarkAggregate> {
        let inner = self.inner.read();
        let latest = Self::latest_per_company(&inner, sector);
        Ok(aggregate_from_latest(&latest, frameworks, sector))
    }

    async fn upsert_company(&self, profile: &CompanyProfile) -> EsgResult<()> {
        self.inner
            .write()
            .companies
            .insert(profile.name.to_lowercase(), profile.clone());
        Ok(())
    }

    async fn get_company(&self, name: &str) -> EsgResult<Option<CompanyProfile>> {
        Ok(self.inner.read().companies.get(&name.to_lowercase()).cloned())
    }

    async fn record_activity(&self, record: ActivityRecord) -> EsgResult<()> {
        self.inner.write().activity.push(record);
        Ok(())
    }

    async fn list_activity(&self, user: &UserId, limit: u32) -> EsgResult<Vec<ActivityRecord>> {
        let inner = self.inner.read();
        let mut mine: Vec<&ActivityRecord> = inner
            .activity
            .iter()
            .filter(|a| &a.user_id == user)
            .collect();
        mine.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(mine.into_iter().take(limit as usize).cloned().collect())
    }

    async fn sector_overall_scores(&self, sector: Option<&str>) -> EsgResult<Vec<f64>> {
        let inner = self.inner.read();
        Ok(Self::latest_per_company(&inner, sector)
            .iter()
            .map(|a| a.scores.overall)
            .collect())
    }

    async fn ping(&self) -> EsgResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use esg_core::{
        AnalysisDiagnostics, AnalysisKind, AnalysisSource, FrameworkCoverage, Scores, Tier,
    };

    fn analysis(user: &UserId, company: &str, overall: f64, age_minutes: i64) -> Analysis {
        Analysis {
            id: AnalysisId::new(),
            user_id: user.clone(),
            source: AnalysisSource::Text {
                fingerprint: "f".repeat(64),
            },
            company_name: Some(company.to_string()),
            kind: AnalysisKind::Quick,
            industry_sector: Some("mining".to_string()),
            reporting_period: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            scores: Scores {
                environmental: overall,
                social: overall,
                governance: overall,
                overall,
            },
            keywords: vec![],
            insights: vec![],
            extracted_metrics: vec![],
            framework_coverage: vec![FrameworkCoverage::compute(Framework::Csrd, 5, 13, 5, 13)],
            gap_analysis: vec![],
            requirement_findings: vec![],
            recommendations: vec![],
            sentiment: None,
            confidence: 0.5,
            diagnostics: AnalysisDiagnostics::default(),
        }
    }

    #[tokio::test]
    async fn create_user_is_idempotent_per_email() {
        let store = MemoryStore::new();
        let first = store
            .create_user(User::register("a@x.com", Tier::Free, 100))
            .await
            .unwrap();
        store.update_user_credits(&first.id, -30).await.unwrap();
        let second = store
            .create_user(User::register("a@x.com", Tier::Free, 100))
            .await
            .unwrap();
        // Re-registration keeps the drained balance
        assert_eq!(second.credits, 70);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn credits_never_go_negative() {
        let store = MemoryStore::new();
        let user = store
            .create_user(User::register("b@x.com", Tier::Free, 2))
            .await
            .unwrap();
        assert_eq!(store.update_user_credits(&user.id, -2).await.unwrap(), 0);
        let err = store.update_user_credits(&user.id, -1).await.unwrap_err();
        assert_eq!(err.error_kind(), "insufficient_credits");
        assert_eq!(store.get_user(&user.id).await.unwrap().unwrap().credits, 0);
    }

    #[tokio::test]
    async fn analysis_reads_are_owner_scoped() {
        let store = MemoryStore::new();
        let owner = UserId::from_email("owner@x.com");
        let stranger = UserId::from_email("stranger@x.com");
        let record = analysis(&owner, "MegaCorp", 50.0, 0);
        store.insert_analysis(&record).await.unwrap();

        assert!(store.get_analysis(&owner, &record.id).await.is_ok());
        let err = store.get_analysis(&stranger, &record.id).await.unwrap_err();
        assert_eq!(err.error_kind(), "not_found");
        let missing = store
            .get_analysis(&owner, &AnalysisId::new())
            .await
            .unwrap_err();
        assert_eq!(missing.error_kind(), "not_found");
    }

    #[tokio::test]
    async fn user_listing_pages_newest_first() {
        let store = MemoryStore::new();
        let user = UserId::from_email("pager@x.com");
        for i in 0..5 {
            store
                .insert_analysis(&analysis(&user, "MegaCorp", 10.0 * i as f64, 60 - i))
                .await
                .unwrap();
        }
        let first_page = store.list_analyses_by_user(&user, 0, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert!(first_page[0].created_at > first_page[1].created_at);
        let second_page = store.list_analyses_by_user(&user, 1, 2).await.unwrap();
        assert_eq!(second_page.len(), 2);
        assert!(second_page[0].created_at < first_page[1].created_at);
    }

    #[tokio::test]
    async fn company_history_is_oldest_first_and_bounded() {
        let store = MemoryStore::new();
        let user = UserId::from_email("history@x.com");
        store
            .insert_analysis(&analysis(&user, "MegaCorp", 10.0, 600))
            .await
            .unwrap();
        store
            .insert_analysis(&analysis(&user, "MegaCorp", 20.0, 30))
            .await
            .unwrap();
        store
            .insert_analysis(&analysis(&user, "megacorp", 30.0, 5))
            .await
            .unwrap();

        let since = Utc::now() - Duration::minutes(60);
        let history = store.list_by_company("MegaCorp", since).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at < history[1].created_at);
        assert_eq!(history[0].scores.overall, 20.0);

        let latest = store.latest_by_company("MEGACORP", 2).await.unwrap();
        assert_eq!(latest[0].scores.overall, 30.0);
    }

    #[tokio::test]
    async fn benchmark_uses_latest_analysis_per_company() {
        let store = MemoryStore::new();
        let user = UserId::from_email("bench@x.com");
        store
            .insert_analysis(&analysis(&user, "Alpha", 10.0, 120))
            .await
            .unwrap();
        store
            .insert_analysis(&analysis(&user, "Alpha", 40.0, 1))
            .await
            .unwrap();
        store
            .insert_analysis(&analysis(&user, "Beta", 20.0, 1))
            .await
            .unwrap();

        let aggregate = store
            .aggregate_benchmark(&[Framework::Csrd], None)
            .await
            .unwrap();
        assert_eq!(aggregate.companies, 2);
        assert_eq!(aggregate.median_overall, 30.0);
        assert_eq!(aggregate.average_coverage[0].0, Framework::Csrd);
        assert_eq!(aggregate.average_coverage[0].1, 38.5);

        let sectorless = store
            .aggregate_benchmark(&[Framework::Csrd], Some("aviation"))
            .await
            .unwrap();
        assert_eq!(sectorless.companies, 0);
    }

    #[tokio::test]
    async fn activity_is_append_only_and_user_scoped() {
        let store = MemoryStore::new();
        let a = UserId::from_email("a@activity.com");
        let b = UserId::from_email("b@activity.com");
        store
            .record_activity(ActivityRecord::new(
                a.clone(),
                esg_core::ActivityKind::Analyze,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        store
            .record_activity(ActivityRecord::new(
                b.clone(),
                esg_core::ActivityKind::Export,
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let mine = store.list_activity(&a, 10).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].kind, esg_core::ActivityKind::Analyze);
    }
}
