use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EsgError, EsgResult};

/// Opaque user identifier derived from the registered email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Stable id: `u_` + first 32 hex chars of SHA-256 over the
    /// lowercased, trimmed email.
    pub fn from_email(email: &str) -> Self {
        let digest = crate::utils::sha256_hex(email.trim().to_lowercase().as_bytes());
        Self(format!("u_{}", &digest[..32]))
    }

    pub fn anonymous() -> Self {
        Self("u_anonymous".to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == "u_anonymous"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisId(pub Uuid);

impl AnalysisId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnalysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for AnalysisId {
    type Err = EsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| EsgError::Validation {
            field: "analysis_id".to_string(),
            message: format!("not a valid analysis id: {}", s),
        })
    }
}

/// Billing class governing credit allowance and rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Free,
    Starter,
    Growth,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Growth => "growth",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> EsgResult<Self> {
        match value {
            "anonymous" => Ok(Tier::Anonymous),
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "growth" => Ok(Tier::Growth),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(EsgError::Validation {
                field: "tier".to_string(),
                message: format!("unknown tier: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Quick,
    Full,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Quick => "quick",
            AnalysisKind::Full => "full",
        }
    }
}

/// The four reporting frameworks the compliance engine evaluates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "CSRD")]
    Csrd,
    #[serde(rename = "GRI")]
    Gri,
    #[serde(rename = "SASB")]
    Sasb,
    #[serde(rename = "TCFD")]
    Tcfd,
}

impl Framework {
    pub const ALL: [Framework; 4] = [Framework::Csrd, Framework::Gri, Framework::Sasb, Framework::Tcfd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Csrd => "CSRD",
            Framework::Gri => "GRI",
            Framework::Sasb => "SASB",
            Framework::Tcfd => "TCFD",
        }
    }

    pub fn parse(value: &str) -> EsgResult<Self> {
        match value.to_uppercase().as_str() {
            "CSRD" => Ok(Framework::Csrd),
            "GRI" => Ok(Framework::Gri),
            "SASB" => Ok(Framework::Sasb),
            "TCFD" => Ok(Framework::Tcfd),
            other => Err(EsgError::Validation {
                field: "frameworks".to_string(),
                message: format!("unknown framework: {}", other),
            }),
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gap severity. Variant order gives `Ord`: Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub label: SentimentLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendTag {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Register,
    Analyze,
    Compare,
    Export,
    Subscribe,
    RateLimitHit,
    CreditDenied,
    CreditRefund,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Register => "register",
            ActivityKind::Analyze => "analyze",
            ActivityKind::Compare => "compare",
            ActivityKind::Export => "export",
            ActivityKind::Subscribe => "subscribe",
            ActivityKind::RateLimitHit => "rate_limit_hit",
            ActivityKind::CreditDenied => "credit_denied",
            ActivityKind::CreditRefund => "credit_refund",
        }
    }
}

/// Sub-reason codes for acquisition failures, stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchFailure {
    #[serde(rename = "disallowed")]
    Disallowed,
    #[serde(rename = "too_large")]
    TooLarge,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "upstream_4xx")]
    Upstream4xx,
    #[serde(rename = "upstream_5xx")]
    Upstream5xx,
}

impl FetchFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailure::Disallowed => "disallowed",
            FetchFailure::TooLarge => "too_large",
            FetchFailure::Timeout => "timeout",
            FetchFailure::Upstream4xx => "upstream_4xx",
            FetchFailure::Upstream5xx => "upstream_5xx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    Html,
    Pdf,
    Text,
}

/// Authenticated caller identity as carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub tier: Tier,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            user_id: UserId::anonymous(),
            tier: Tier::Anonymous,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_anonymous()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub tier: Tier,
    pub credits: i64,
    #[serde(with = "crate::utils::ts_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::utils::ts_ms")]
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_customer_id: Option<String>,
}

impl User {
    pub fn register(email: &str, tier: Tier, credits: i64) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::from_email(email),
            email: email.trim().to_lowercase(),
            tier,
            credits,
            created_at: now,
            last_seen_at: now,
            payment_customer_id: None,
        }
    }
}

/// Category scores on the 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub environmental: f64,
    pub social: f64,
    pub governance: f64,
    pub overall: f64,
}

impl Scores {
    /// Builds scores with overall as the equally weighted pillar mean,
    /// rounded to one decimal.
    pub fn from_pillars(environmental: f64, social: f64, governance: f64) -> Self {
        let overall = crate::utils::round1((environmental + social + governance) / 3.0);
        Self {
            environmental: crate::utils::round1(environmental),
            social: crate::utils::round1(social),
            governance: crate::utils::round1(governance),
            overall,
        }
    }

    pub fn zero() -> Self {
        Self {
            environmental: 0.0,
            social: 0.0,
            governance: 0.0,
            overall: 0.0,
        }
    }
}

/// Reference to a catalog requirement, by framework and id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequirementRef {
    pub framework: Framework,
    pub requirement_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetric {
    pub name: String,
    pub raw_value: String,
    pub raw_unit: String,
    pub normalized_value: f64,
    pub normalized_unit: String,
    pub confidence: f64,
    pub snippet: String,
    pub framework_mappings: Vec<RequirementRef>,
}

/// Why a requirement was considered met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchReason {
    Keyword { phrase: String },
    Metric { metric_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementFinding {
    pub framework: Framework,
    pub requirement_id: String,
    pub category: String,
    pub reason: MatchReason,
    pub evidence: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkCoverage {
    pub framework: Framework,
    pub requirements_found: u32,
    pub requirements_total: u32,
    pub mandatory_met: u32,
    pub mandatory_total: u32,
    pub coverage_percentage: f64,
}

impl FrameworkCoverage {
    pub fn compute(
        framework: Framework,
        requirements_found: u32,
        requirements_total: u32,
        mandatory_met: u32,
        mandatory_total: u32,
    ) -> Self {
        let coverage_percentage = if requirements_total == 0 {
            0.0
        } else {
            crate::utils::round1(100.0 * requirements_found as f64 / requirements_total as f64)
        };
        Self {
            framework,
            requirements_found,
            requirements_total,
            mandatory_met,
            mandatory_total,
            coverage_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub framework: Framework,
    pub requirement_id: String,
    pub category: String,
    pub description: String,
    pub severity: Severity,
}

/// Where the analyzed content came from. Inline text is stored as a
/// fingerprint only, never verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnalysisSource {
    Url { url: String },
    Text { fingerprint: String },
}

/// Per-analysis extraction diagnostics. Dropped candidates are counted,
/// never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDiagnostics {
    pub candidates_seen: u32,
    pub candidates_dropped: u32,
}

/// The primary value object. Immutable once created; re-analysis produces
/// a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub user_id: UserId,
    pub source: AnalysisSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub kind: AnalysisKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_period: Option<String>,
    #[serde(with = "crate::utils::ts_ms")]
    pub created_at: DateTime<Utc>,
    pub scores: Scores,
    pub keywords: Vec<String>,
    pub insights: Vec<String>,
    pub extracted_metrics: Vec<ExtractedMetric>,
    pub framework_coverage: Vec<FrameworkCoverage>,
    pub gap_analysis: Vec<Gap>,
    pub requirement_findings: Vec<RequirementFinding>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentSignal>,
    pub confidence: f64,
    pub diagnostics: AnalysisDiagnostics,
}

impl Analysis {
    pub fn coverage_for(&self, framework: Framework) -> Option<&FrameworkCoverage> {
        self.framework_coverage.iter().find(|c| c.framework == framework)
    }

    pub fn coverage_avg(&self) -> f64 {
        if self.framework_coverage.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.framework_coverage.iter().map(|c| c.coverage_percentage).sum();
        crate::utils::round1(sum / self.framework_coverage.len() as f64)
    }
}

/// Incoming analysis request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub quick_mode: bool,
    #[serde(default)]
    pub frameworks: Vec<Framework>,
    #[serde(default)]
    pub industry_sector: Option<String>,
    #[serde(default)]
    pub reporting_period: Option<String>,
    #[serde(default)]
    pub extract_metrics: bool,
}

impl AnalyzeRequest {
    pub fn kind(&self) -> AnalysisKind {
        if self.quick_mode {
            AnalysisKind::Quick
        } else {
            AnalysisKind::Full
        }
    }

    /// Requested frameworks, defaulting to all four when none are given.
    pub fn effective_frameworks(&self) -> Vec<Framework> {
        if self.frameworks.is_empty() {
            Framework::ALL.to_vec()
        } else {
            let mut seen = Vec::new();
            for fw in &self.frameworks {
                if !seen.contains(fw) {
                    seen.push(*fw);
                }
            }
            seen
        }
    }

    pub fn validate(&self) -> EsgResult<()> {
        let has_url = self.url.as_deref().map_or(false, |u| !u.trim().is_empty());
        let has_text = self.text.as_deref().map_or(false, |t| !t.trim().is_empty());
        if !has_url && !has_text {
            return Err(EsgError::Validation {
                field: "url|text".to_string(),
                message: "one of url or text is required".to_string(),
            });
        }
        if has_url && has_text {
            return Err(EsgError::Validation {
                field: "url|text".to_string(),
                message: "url and text are mutually exclusive".to_string(),
            });
        }
        if let Some(name) = &self.company_name {
            if name.len() > 200 {
                return Err(EsgError::Validation {
                    field: "company_name".to_string(),
                    message: "company name exceeds 200 characters".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Full analysis payload returned to the caller, with request accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub credits_used: i64,
    pub credits_remaining: i64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_analysis_id: Option<AnalysisId>,
    pub latest_overall: f64,
    #[serde(with = "crate::utils::ts_ms")]
    pub updated_at: DateTime<Utc>,
}

/// Append-only usage audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: ActivityKind,
    #[serde(with = "crate::utils::ts_ms")]
    pub at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl ActivityRecord {
    pub fn new(user_id: UserId, kind: ActivityKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            at: Utc::now(),
            payload,
        }
    }
}

/// One point in a company's score history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(with = "crate::utils::ts_ms")]
    pub at: DateTime<Utc>,
    pub scores: Scores,
    pub framework_coverage: Vec<FrameworkCoverage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Scores>,
    pub framework_coverage: Vec<FrameworkCoverage>,
    pub trend: TrendTag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareEntry {
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Scores>,
    pub trend: TrendTag,
    pub baseline: f64,
}

/// Cross-company aggregation produced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkAggregate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub companies: u32,
    pub median_overall: f64,
    pub average_coverage: Vec<(Framework, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub current_usage: u32,
    pub limit: u32,
    pub percentage: f64,
    #[serde(with = "crate::utils::ts_ms")]
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_is_stable_for_equivalent_emails() {
        let a = UserId::from_email("Jane@Example.com");
        let b = UserId::from_email("  jane@example.com ");
        assert_eq!(a, b);
        assert!(a.0.starts_with("u_"));
        assert_eq!(a.0.len(), 2 + 32);
    }

    #[test]
    fn user_id_differs_across_emails() {
        assert_ne!(UserId::from_email("a@x.com"), UserId::from_email("b@x.com"));
    }

    #[test]
    fn anonymous_user_id() {
        assert!(UserId::anonymous().is_anonymous());
        assert!(!UserId::from_email("a@x.com").is_anonymous());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn framework_serde_uses_uppercase_tags() {
        assert_eq!(serde_json::to_string(&Framework::Csrd).unwrap(), "\"CSRD\"");
        let parsed: Framework = serde_json::from_str("\"TCFD\"").unwrap();
        assert_eq!(parsed, Framework::Tcfd);
    }

    #[test]
    fn framework_parse_is_case_insensitive() {
        assert_eq!(Framework::parse("csrd").unwrap(), Framework::Csrd);
        assert!(Framework::parse("ISO").is_err());
    }

    #[test]
    fn scores_overall_is_rounded_equal_weight_mean() {
        let s = Scores::from_pillars(50.0, 40.0, 30.0);
        assert_eq!(s.overall, 40.0);
        let s = Scores::from_pillars(33.3, 33.3, 33.4);
        assert_eq!(s.overall, 33.3);
    }

    #[test]
    fn coverage_percentage_rounds_to_one_decimal() {
        let c = FrameworkCoverage::compute(Framework::Csrd, 4, 13, 4, 13);
        assert_eq!(c.coverage_percentage, 30.8);
        let empty = FrameworkCoverage::compute(Framework::Gri, 0, 0, 0, 0);
        assert_eq!(empty.coverage_percentage, 0.0);
    }

    #[test]
    fn analyze_request_requires_exactly_one_source() {
        let empty = AnalyzeRequest::default();
        assert!(empty.validate().is_err());

        let both = AnalyzeRequest {
            url: Some("https://example.com".into()),
            text: Some("body".into()),
            ..Default::default()
        };
        assert!(both.validate().is_err());

        let text_only = AnalyzeRequest {
            text: Some("body".into()),
            ..Default::default()
        };
        assert!(text_only.validate().is_ok());
    }

    #[test]
    fn effective_frameworks_defaults_to_all_and_dedups() {
        let req = AnalyzeRequest::default();
        assert_eq!(req.effective_frameworks().len(), 4);

        let req = AnalyzeRequest {
            frameworks: vec![Framework::Csrd, Framework::Csrd, Framework::Tcfd],
            ..Default::default()
        };
        assert_eq!(req.effective_frameworks(), vec![Framework::Csrd, Framework::Tcfd]);
    }

    #[test]
    fn fetch_failure_wire_codes() {
        assert_eq!(serde_json::to_string(&FetchFailure::Upstream4xx).unwrap(), "\"upstream_4xx\"");
        assert_eq!(serde_json::to_string(&FetchFailure::TooLarge).unwrap(), "\"too_large\"");
    }

    #[test]
    fn activity_kind_wire_codes() {
        assert_eq!(
            serde_json::to_string(&ActivityKind::RateLimitHit).unwrap(),
            "\"rate_limit_hit\""
        );
        assert_eq!(
            serde_json::to_string(&ActivityKind::CreditRefund).unwrap(),
            "\"credit_refund\""
        );
    }

    #[test]
    fn analysis_response_flattens_analysis_fields() {
        let analysis = Analysis {
            id: AnalysisId::new(),
            user_id: UserId::anonymous(),
            source: AnalysisSource::Text {
                fingerprint: "ab".repeat(32),
            },
            company_name: None,
            kind: AnalysisKind::Quick,
            industry_sector: None,
            reporting_period: None,
            created_at: Utc::now(),
            scores: Scores::from_pillars(10.0, 20.0, 30.0),
            keywords: vec![],
            insights: vec![],
            extracted_metrics: vec![],
            framework_coverage: vec![],
            gap_analysis: vec![],
            requirement_findings: vec![],
            recommendations: vec![],
            sentiment: None,
            confidence: 0.5,
            diagnostics: AnalysisDiagnostics::default(),
        };
        let response = AnalysisResponse {
            analysis,
            credits_used: 1,
            credits_remaining: 99,
            cache_hit: false,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("scores").is_some());
        assert_eq!(value["credits_used"], 1);
        assert_eq!(value["cache_hit"], false);
    }
}
