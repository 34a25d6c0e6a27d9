//! Endpoint handlers for the REST surface.

use axum::extract::{Extension, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use esg_catalog::FrameworkSummary;
use esg_core::{
    ActivityKind, ActivityRecord, AnalysisId, AnalysisResponse, AnalyzeRequest, EsgError, Framework,
    Gap, HistoryPoint, Principal, Tier, UsageReport, User,
};
use esg_engine::queries;
use esg_governor::Endpoint;

use crate::errors::ApiResult;
use crate::state::{AppState, API_VERSION};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub tier: Tier,
    pub credits: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let email = body.email.trim().to_lowercase();
    if !esg_core::validate_email(&email) {
        return Err(EsgError::Validation {
            field: "email".to_string(),
            message: "not a valid email address".to_string(),
        }
        .into());
    }

    let user = state
        .store
        .create_user(User::register(&email, Tier::Free, state.free_tier_credits))
        .await?;
    let token = state.tokens.issue(&user.id, user.tier)?;

    let record = ActivityRecord::new(
        user.id.clone(),
        ActivityKind::Register,
        serde_json::json!({ "email": user.email }),
    );
    if let Err(err) = state.store.record_activity(record).await {
        tracing::warn!(error = %err, "register activity insertion failed");
    }

    Ok(Json(RegisterResponse {
        token,
        tier: user.tier,
        credits: user.credits,
    }))
}

pub async fn analyze(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisResponse>> {
    match state.orchestrator.analyze(&principal, request).await {
        Ok(response) => {
            for coverage in &response.analysis.framework_coverage {
                state
                    .metrics
                    .analysis_by_framework_total
                    .with_label_values(&[coverage.framework.as_str(), principal.tier.as_str()])
                    .inc();
            }
            state
                .metrics
                .metrics_extracted_count
                .observe(response.analysis.extracted_metrics.len() as f64);
            let outcome = if response.cache_hit { "hit" } else { "miss" };
            state
                .metrics
                .cache_operations_total
                .with_label_values(&["analysis_lookup", outcome])
                .inc();
            state
                .metrics
                .credit_debits_total
                .with_label_values(&["success"])
                .inc();
            Ok(Json(response))
        }
        Err(err) => {
            match &err {
                EsgError::InsufficientCredits { .. } => {
                    state
                        .metrics
                        .credit_debits_total
                        .with_label_values(&["insufficient"])
                        .inc();
                }
                EsgError::RateLimited { .. } => {
                    state
                        .metrics
                        .rate_limit_hits_total
                        .with_label_values(&["analyze", principal.tier.as_str()])
                        .inc();
                }
                _ => {}
            }
            Err(err.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub companies: Vec<String>,
}

pub async fn compare(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CompareRequest>,
) -> ApiResult<Json<Vec<esg_core::CompareEntry>>> {
    if body.companies.is_empty() {
        return Err(EsgError::Validation {
            field: "companies".to_string(),
            message: "at least one company is required".to_string(),
        }
        .into());
    }

    if let Err(err) = state
        .limiter
        .check(&principal.user_id, principal.tier, Endpoint::Compare)
    {
        state
            .metrics
            .rate_limit_hits_total
            .with_label_values(&["compare", principal.tier.as_str()])
            .inc();
        record_limited(&state, &principal, "compare").await;
        return Err(err.into());
    }

    let entries = queries::compare(&state.store, &body.companies).await?;
    record_activity(
        &state,
        &principal,
        ActivityKind::Compare,
        serde_json::json!({ "companies": body.companies.len() }),
    )
    .await;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct BenchmarkRequest {
    pub companies: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

pub async fn benchmark(
    State(state): State<AppState>,
    Extension(_principal): Extension<Principal>,
    Json(body): Json<BenchmarkRequest>,
) -> ApiResult<Json<Vec<esg_core::BenchmarkEntry>>> {
    if body.companies.is_empty() {
        return Err(EsgError::Validation {
            field: "companies".to_string(),
            message: "at least one company is required".to_string(),
        }
        .into());
    }
    let entries = queries::benchmark(&state.store, &body.companies, &body.frameworks).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct FrameworksResponse {
    pub version: String,
    pub frameworks: Vec<FrameworkSummary>,
}

pub async fn frameworks(State(state): State<AppState>) -> Json<FrameworksResponse> {
    Json(FrameworksResponse {
        version: state.catalog.version().to_string(),
        frameworks: state.catalog.summary(),
    })
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

pub async fn company_history(
    State(state): State<AppState>,
    Extension(_principal): Extension<Principal>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryPoint>>> {
    let days = query.days.unwrap_or(30).clamp(1, 3650);
    let history = queries::company_history(&state.store, &name, days).await?;
    Ok(Json(history))
}

pub async fn analysis_gaps(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Gap>>> {
    let analysis_id: AnalysisId = id.parse()?;
    let gaps = queries::analysis_gaps(&state.store, &principal.user_id, &analysis_id).await?;
    Ok(Json(gaps))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
}

pub async fn export(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ExportRequest>,
) -> ApiResult<Response> {
    if let Err(err) = state
        .limiter
        .check(&principal.user_id, principal.tier, Endpoint::Export)
    {
        state
            .metrics
            .rate_limit_hits_total
            .with_label_values(&["export", principal.tier.as_str()])
            .inc();
        record_limited(&state, &principal, "export").await;
        return Err(err.into());
    }

    let analyses = queries::export_analyses(&state.store, &principal.user_id).await?;
    record_activity(
        &state,
        &principal,
        ActivityKind::Export,
        serde_json::json!({ "count": analyses.len() }),
    )
    .await;

    match body.format {
        ExportFormat::Json => Ok(Json(analyses).into_response()),
        ExportFormat::Csv => {
            let csv = queries::render_csv(&analyses)?;
            Ok((
                [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
                csv,
            )
                .into_response())
        }
    }
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Json<UsageReport> {
    Json(
        state
            .limiter
            .usage(&principal.user_id, principal.tier, Endpoint::Analyze),
    )
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

pub async fn activity(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<ActivityRecord>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let records = state.store.list_activity(&principal.user_id, limit).await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: API_VERSION.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ServiceProbe {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub services: ServiceProbes,
    pub system: SystemStats,
}

#[derive(Debug, Serialize)]
pub struct ServiceProbes {
    pub store: ServiceProbe,
    pub cache: ServiceProbe,
    pub catalog: ServiceProbe,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub disk_percent: f64,
}

fn probe(result: Result<(), EsgError>) -> ServiceProbe {
    match result {
        Ok(()) => ServiceProbe {
            status: "up".to_string(),
            detail: None,
        },
        Err(err) => ServiceProbe {
            status: "down".to_string(),
            detail: Some(err.to_string()),
        },
    }
}

pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let store = probe(state.store.ping().await);
    let cache = probe(state.orchestrator.cache().ping().await);
    let catalog = if state.catalog.is_empty() {
        probe(Err(EsgError::internal("catalog empty")))
    } else {
        ServiceProbe {
            status: "up".to_string(),
            detail: Some(format!("{} requirements", state.catalog.len())),
        }
    };

    let degraded = store.status == "down" || catalog.status == "down";
    Json(DetailedHealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: API_VERSION.to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        services: ServiceProbes {
            store,
            cache,
            catalog,
        },
        system: system_stats(),
    })
}

/// Best-effort process stats from /proc; zeros on other platforms.
fn system_stats() -> SystemStats {
    SystemStats {
        memory_percent: memory_percent().unwrap_or(0.0),
        cpu_percent: cpu_percent().unwrap_or(0.0),
        disk_percent: 0.0,
    }
}

fn memory_percent() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse::<f64>()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(esg_core::round1(100.0 * (total - available) / total))
}

fn cpu_percent() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cores = std::thread::available_parallelism().ok()?.get() as f64;
    Some(esg_core::round1((100.0 * one_minute / cores).min(100.0)))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let rendered = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        rendered,
    )
        .into_response())
}

async fn record_activity(
    state: &AppState,
    principal: &Principal,
    kind: ActivityKind,
    payload: serde_json::Value,
) {
    if principal.is_anonymous() {
        return;
    }
    let record = ActivityRecord::new(principal.user_id.clone(), kind, payload);
    if let Err(err) = state.store.record_activity(record).await {
        tracing::warn!(error = %err, "activity record insertion failed");
    }
}

async fn record_limited(state: &AppState, principal: &Principal, endpoint: &str) {
    record_activity(
        state,
        principal,
        ActivityKind::RateLimitHit,
        serde_json::json!({ "endpoint": endpoint }),
    )
    .await;
}
