//! End-to-end analysis pipeline: admission, credits, acquisition, cached
//! single-flight compute, persistence and activity recording.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use esg_acquire::ContentAcquirer;
use esg_analysis::compliance;
use esg_cache::AnalysisCache;
use esg_catalog::Catalog;
use esg_core::{
    normalize_for_match, ActivityKind, ActivityRecord, Analysis, AnalysisDiagnostics, AnalysisId,
    AnalysisKind, AnalysisResponse, AnalysisSource, AnalysisStore, AnalyzeRequest, CompanyProfile,
    EsgError, EsgResult, Principal, SentimentProvider, SentimentSignal, UserId,
};
use esg_governor::{analysis_cost, CreditGovernor, Endpoint, SlidingWindowLimiter, CACHE_HIT_COST};

use crate::fingerprint;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub per_user_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(86_400),
            request_timeout: Duration::from_secs(60),
            per_user_concurrency: 4,
        }
    }
}

pub struct AnalysisOrchestrator {
    catalog: &'static Catalog,
    store: Arc<dyn AnalysisStore>,
    cache: Arc<AnalysisCache>,
    credits: CreditGovernor,
    limiter: Arc<SlidingWindowLimiter>,
    acquirer: Arc<ContentAcquirer>,
    sentiment: Option<Arc<dyn SentimentProvider>>,
    admissions: DashMap<UserId, Arc<Semaphore>>,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: &'static Catalog,
        store: Arc<dyn AnalysisStore>,
        cache: Arc<AnalysisCache>,
        limiter: Arc<SlidingWindowLimiter>,
        acquirer: Arc<ContentAcquirer>,
        sentiment: Option<Arc<dyn SentimentProvider>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            store: store.clone(),
            cache,
            credits: CreditGovernor::new(store),
            limiter,
            acquirer,
            sentiment,
            admissions: DashMap::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Runs one analysis request end to end for the given principal.
    pub async fn analyze(
        &self,
        principal: &Principal,
        request: AnalyzeRequest,
    ) -> EsgResult<AnalysisResponse> {
        request.validate()?;
        let kind = request.kind();
        let frameworks = request.effective_frameworks();

        // Admission gate: rate limit first, then the per-user concurrency
        // bound. Neither consumes credits.
        if let Err(err) = self
            .limiter
            .check(&principal.user_id, principal.tier, Endpoint::Analyze)
        {
            self.record_activity(
                principal,
                ActivityKind::RateLimitHit,
                serde_json::json!({ "endpoint": "analyze" }),
            )
            .await;
            return Err(err);
        }

        let _permit = self.admission_permit(&principal.user_id)?;

        // Scheme and literal-address screening happens before any credit
        // movement, so a disallowed URL never touches the balance.
        let (source_url, fingerprint) = match request.url.as_deref() {
            Some(url) => {
                let canonical = esg_acquire::canonicalize_url(url)?;
                let fp = fingerprint::for_url(
                    &canonical,
                    kind,
                    &frameworks,
                    request.industry_sector.as_deref(),
                );
                (Some(canonical), fp)
            }
            None => {
                let text = request.text.as_deref().unwrap_or_default();
                let fp = fingerprint::for_text(
                    text,
                    kind,
                    &frameworks,
                    request.industry_sector.as_deref(),
                );
                (None, fp)
            }
        };

        // Cache hits bypass compute entirely but still debit the quick
        // cost to meter usage.
        if let Some(cached) = self.cache.get::<Analysis>(&fingerprint).await {
            let remaining = self.credits.debit(&principal.user_id, CACHE_HIT_COST).await?;
            self.record_activity(
                principal,
                ActivityKind::Analyze,
                serde_json::json!({ "cache_hit": true, "analysis_id": cached.id }),
            )
            .await;
            return Ok(AnalysisResponse {
                analysis: cached,
                credits_used: CACHE_HIT_COST,
                credits_remaining: remaining,
                cache_hit: true,
            });
        }

        let cost = analysis_cost(kind, source_url.is_some());
        let mut remaining = self.credits.debit(&principal.user_id, cost).await?;

        let compute_result = tokio::time::timeout(
            self.config.request_timeout,
            self.cache.compute_or_load(&fingerprint, Some(self.config.cache_ttl), || {
                self.compute_analysis(
                    principal.clone(),
                    request.clone(),
                    kind,
                    frameworks.clone(),
                    source_url.clone(),
                    fingerprint.clone(),
                )
            }),
        )
        .await
        .map_err(|_| EsgError::Timeout {
            operation: "analyze".to_string(),
            duration_ms: self.config.request_timeout.as_millis() as u64,
        })
        .and_then(|inner| inner);

        match compute_result {
            Ok((analysis, raced_hit)) => {
                let mut credits_used = cost;
                if raced_hit && cost > CACHE_HIT_COST {
                    // A concurrent identical request computed the result
                    // while we waited; settle at cache-hit pricing.
                    remaining = self
                        .credits
                        .refund(&principal.user_id, cost - CACHE_HIT_COST)
                        .await?;
                    credits_used = CACHE_HIT_COST;
                }
                Ok(AnalysisResponse {
                    analysis,
                    credits_used,
                    credits_remaining: remaining,
                    cache_hit: raced_hit,
                })
            }
            Err(err) => {
                // Fetch, compute or persistence failure after the debit:
                // compensate so the request aborts atomically.
                if let Err(refund_err) = self.credits.refund(&principal.user_id, cost).await {
                    tracing::error!(
                        user = %principal.user_id,
                        error = %refund_err,
                        "compensating refund failed"
                    );
                }
                Err(err)
            }
        }
    }

    fn admission_permit(
        &self,
        user: &UserId,
    ) -> EsgResult<tokio::sync::OwnedSemaphorePermit> {
        let semaphore = self
            .admissions
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_user_concurrency)))
            .clone();
        semaphore.try_acquire_owned().map_err(|_| EsgError::Busy {
            in_flight: self.config.per_user_concurrency as u32,
        })
    }

    /// The cache-miss path: acquire text, score, extract, evaluate,
    /// persist and record activity. Runs under single-flight.
    async fn compute_analysis(
        &self,
        principal: Principal,
        request: AnalyzeRequest,
        kind: AnalysisKind,
        frameworks: Vec<esg_core::Framework>,
        source_url: Option<String>,
        text_fingerprint: String,
    ) -> EsgResult<Analysis> {
        let (text, source) = match &source_url {
            Some(url) => {
                let fetched = self.acquirer.fetch(url).await?;
                (fetched.text, AnalysisSource::Url { url: url.clone() })
            }
            None => {
                let raw = request.text.as_deref().unwrap_or_default();
                (
                    esg_acquire::clean_inline_text(raw)?,
                    AnalysisSource::Text {
                        fingerprint: text_fingerprint,
                    },
                )
            }
        };

        let normalized = normalize_for_match(&text);
        let extract = kind == AnalysisKind::Full && request.extract_metrics;

        // Scoring, sentiment and metric extraction are independent;
        // compliance needs the metrics and joins afterwards.
        let (breakdown, sentiment, extraction) = tokio::join!(
            async { esg_analysis::score_text(&text) },
            self.classify_sentiment(&text),
            async {
                if extract {
                    esg_analysis::extract_metrics(&text, self.catalog, &frameworks)
                } else {
                    esg_analysis::ExtractionOutcome::default()
                }
            },
        );

        let outcome = compliance::evaluate(
            self.catalog,
            &normalized,
            &extraction.metrics,
            &frameworks,
            request.industry_sector.as_deref(),
        );

        let scores = esg_analysis::apply_sentiment(breakdown.scores, sentiment);
        let insights = esg_analysis::generate_insights(
            &breakdown,
            &extraction.metrics,
            &outcome.coverage,
            &outcome.gaps,
            sentiment,
        );

        let analysis = Analysis {
            id: AnalysisId::new(),
            user_id: principal.user_id.clone(),
            source,
            company_name: request.company_name.clone(),
            kind,
            industry_sector: request.industry_sector.clone(),
            reporting_period: request.reporting_period.clone(),
            created_at: Utc::now(),
            scores,
            keywords: breakdown.top_phrases(10),
            insights,
            extracted_metrics: extraction.metrics,
            framework_coverage: outcome.coverage,
            gap_analysis: outcome.gaps,
            requirement_findings: outcome.findings,
            recommendations: outcome.recommendations,
            sentiment,
            confidence: overall_confidence(&breakdown, &analysis_inputs(&extraction.diagnostics)),
            diagnostics: extraction.diagnostics,
        };

        // Anonymous analyses are computed but never persisted.
        if !principal.is_anonymous() {
            self.store.insert_analysis(&analysis).await?;
            if let Some(company) = &analysis.company_name {
                let profile = CompanyProfile {
                    name: company.clone(),
                    sector: analysis.industry_sector.clone(),
                    latest_analysis_id: Some(analysis.id),
                    latest_overall: analysis.scores.overall,
                    updated_at: analysis.created_at,
                };
                if let Err(err) = self.store.upsert_company(&profile).await {
                    tracing::warn!(company = %company, error = %err, "company profile upsert failed");
                }
            }
            self.record_activity(
                &principal,
                ActivityKind::Analyze,
                serde_json::json!({
                    "analysis_id": analysis.id,
                    "kind": kind.as_str(),
                    "cache_hit": false,
                }),
            )
            .await;
        }

        Ok(analysis)
    }

    async fn classify_sentiment(&self, text: &str) -> Option<SentimentSignal> {
        let provider = self.sentiment.as_ref()?;
        match provider.classify(text).await {
            Ok(signal) => Some(signal),
            Err(err) => {
                tracing::warn!(error = %err, "sentiment provider failed, scoring unadjusted");
                None
            }
        }
    }

    /// Activity is never recorded for anonymous principals and never
    /// fails the caller.
    async fn record_activity(
        &self,
        principal: &Principal,
        kind: ActivityKind,
        payload: serde_json::Value,
    ) {
        if principal.is_anonymous() {
            return;
        }
        let record = ActivityRecord::new(principal.user_id.clone(), kind, payload);
        if let Err(err) = self.store.record_activity(record).await {
            tracing::warn!(error = %err, "activity record insertion failed");
        }
    }
}

struct ConfidenceInputs {
    dropped_ratio: f64,
}

fn analysis_inputs(diagnostics: &AnalysisDiagnostics) -> ConfidenceInputs {
    let dropped_ratio = if diagnostics.candidates_seen == 0 {
        0.0
    } else {
        diagnostics.candidates_dropped as f64 / diagnostics.candidates_seen as f64
    };
    ConfidenceInputs { dropped_ratio }
}

/// Analysis-level confidence: text signal strength discounted by the
/// share of metric candidates that failed standardization.
fn overall_confidence(breakdown: &esg_analysis::ScoreBreakdown, inputs: &ConfidenceInputs) -> f64 {
    let text_signal = (breakdown.matched.len() as f64 / 10.0).min(1.0);
    let confidence = (0.4 + 0.6 * text_signal) * (1.0 - 0.5 * inputs.dropped_ratio);
    (confidence * 100.0).round() / 100.0
}
