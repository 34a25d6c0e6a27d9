//! Read-side operations: company history, gap listings, benchmarking,
//! comparison baselines and CSV/JSON export.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use esg_core::{
    median, Analysis, AnalysisId, AnalysisStore, BenchmarkEntry, CompareEntry, EsgResult,
    Framework, Gap, HistoryPoint, TrendTag, UserId,
};

/// Trend derivation over the last three overall scores, newest first:
/// a swing of two points or more marks the direction.
pub fn trend_from_latest(newest_first: &[Analysis]) -> TrendTag {
    if newest_first.len() < 3 {
        return TrendTag::Stable;
    }
    let newest = newest_first[0].scores.overall;
    let oldest = newest_first[2].scores.overall;
    let delta = newest - oldest;
    if delta >= 2.0 {
        TrendTag::Improving
    } else if delta <= -2.0 {
        TrendTag::Declining
    } else {
        TrendTag::Stable
    }
}

/// Timestamped score/coverage history for one company, oldest first.
pub async fn company_history(
    store: &Arc<dyn AnalysisStore>,
    company: &str,
    days: i64,
) -> EsgResult<Vec<HistoryPoint>> {
    let since = Utc::now() - ChronoDuration::days(days.max(0));
    let analyses = store.list_by_company(company, since).await?;
    Ok(analyses
        .into_iter()
        .map(|a| HistoryPoint {
            at: a.created_at,
            scores: a.scores,
            framework_coverage: a.framework_coverage,
        })
        .collect())
}

/// Owner-scoped gap list for one analysis, ordered by severity (critical
/// first), then framework, then requirement id.
pub async fn analysis_gaps(
    store: &Arc<dyn AnalysisStore>,
    user: &UserId,
    id: &AnalysisId,
) -> EsgResult<Vec<Gap>> {
    let analysis = store.get_analysis(user, id).await?;
    let mut gaps = analysis.gap_analysis;
    gaps.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.framework.as_str().cmp(b.framework.as_str()))
            .then_with(|| a.requirement_id.cmp(&b.requirement_id))
    });
    Ok(gaps)
}

/// Per-company benchmark rows: latest scores, requested framework
/// coverages, and the three-point trend tag.
pub async fn benchmark(
    store: &Arc<dyn AnalysisStore>,
    companies: &[String],
    frameworks: &[Framework],
) -> EsgResult<Vec<BenchmarkEntry>> {
    let mut entries = Vec::with_capacity(companies.len());
    for company in companies {
        let latest = store.latest_by_company(company, 3).await?;
        let trend = trend_from_latest(&latest);
        let (scores, coverage) = match latest.first() {
            Some(analysis) => (
                Some(analysis.scores),
                analysis
                    .framework_coverage
                    .iter()
                    .filter(|c| frameworks.is_empty() || frameworks.contains(&c.framework))
                    .cloned()
                    .collect(),
            ),
            None => (None, Vec::new()),
        };
        entries.push(BenchmarkEntry {
            company: company.clone(),
            scores,
            framework_coverage: coverage,
            trend,
        });
    }
    Ok(entries)
}

/// Comparison rows with a baseline: the sector median of latest overall
/// scores, or the global median when the company has no known sector.
pub async fn compare(
    store: &Arc<dyn AnalysisStore>,
    companies: &[String],
) -> EsgResult<Vec<CompareEntry>> {
    let mut global_scores = store.sector_overall_scores(None).await?;
    let global_baseline = median(&mut global_scores);

    let mut entries = Vec::with_capacity(companies.len());
    for company in companies {
        let latest = store.latest_by_company(company, 3).await?;
        let trend = trend_from_latest(&latest);
        let scores = latest.first().map(|a| a.scores);

        let sector = latest.first().and_then(|a| a.industry_sector.clone());
        let baseline = match sector.as_deref() {
            Some(sector) => {
                let mut sector_scores = store.sector_overall_scores(Some(sector)).await?;
                if sector_scores.is_empty() {
                    global_baseline
                } else {
                    median(&mut sector_scores)
                }
            }
            None => global_baseline,
        };

        entries.push(CompareEntry {
            company: company.clone(),
            scores,
            trend,
            baseline,
        });
    }
    Ok(entries)
}

pub const EXPORT_PAGE_SIZE: u32 = 1000;

/// All analyses belonging to the user, newest first.
pub async fn export_analyses(
    store: &Arc<dyn AnalysisStore>,
    user: &UserId,
) -> EsgResult<Vec<Analysis>> {
    let mut all = Vec::new();
    let mut page = 0;
    loop {
        let batch = store
            .list_analyses_by_user(user, page, EXPORT_PAGE_SIZE)
            .await?;
        let done = (batch.len() as u32) < EXPORT_PAGE_SIZE;
        all.extend(batch);
        if done {
            break;
        }
        page += 1;
    }
    Ok(all)
}

pub const CSV_COLUMNS: [&str; 11] = [
    "analysis_id",
    "created_at",
    "company_name",
    "industry_sector",
    "reporting_period",
    "environmental",
    "social",
    "governance",
    "overall",
    "frameworks",
    "coverage_avg",
];

/// CSV rendering with the fixed column order of the export contract.
pub fn render_csv(analyses: &[Analysis]) -> EsgResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| esg_core::EsgError::internal(format!("csv header: {}", e)))?;

    for analysis in analyses {
        let frameworks = analysis
            .framework_coverage
            .iter()
            .map(|c| c.framework.as_str())
            .collect::<Vec<_>>()
            .join("|");
        writer
            .write_record([
                analysis.id.to_string(),
                analysis
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                analysis.company_name.clone().unwrap_or_default(),
                analysis.industry_sector.clone().unwrap_or_default(),
                analysis.reporting_period.clone().unwrap_or_default(),
                analysis.scores.environmental.to_string(),
                analysis.scores.social.to_string(),
                analysis.scores.governance.to_string(),
                analysis.scores.overall.to_string(),
                frameworks,
                analysis.coverage_avg().to_string(),
            ])
            .map_err(|e| esg_core::EsgError::internal(format!("csv row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| esg_core::EsgError::internal(format!("csv flush: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| esg_core::EsgError::internal(format!("csv utf8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::{
        AnalysisDiagnostics, AnalysisKind, AnalysisSource, FrameworkCoverage, Scores,
    };

    fn analysis_with_overall(overall: f64) -> Analysis {
        Analysis {
            id: AnalysisId::new(),
            user_id: UserId::anonymous(),
            source: AnalysisSource::Text {
                fingerprint: "f".repeat(64),
            },
            company_name: Some("MegaCorp".into()),
            kind: AnalysisKind::Quick,
            industry_sector: None,
            reporting_period: Some("FY2024".into()),
            created_at: Utc::now(),
            scores: Scores {
                environmental: overall,
                social: overall,
                governance: overall,
                overall,
            },
            keywords: vec![],
            insights: vec![],
            extracted_metrics: vec![],
            framework_coverage: vec![
                FrameworkCoverage::compute(Framework::Csrd, 4, 13, 4, 13),
                FrameworkCoverage::compute(Framework::Tcfd, 5, 11, 5, 11),
            ],
            gap_analysis: vec![],
            requirement_findings: vec![],
            recommendations: vec![],
            sentiment: None,
            confidence: 0.5,
            diagnostics: AnalysisDiagnostics::default(),
        }
    }

    #[test]
    fn trend_requires_three_points() {
        assert_eq!(trend_from_latest(&[]), TrendTag::Stable);
        assert_eq!(
            trend_from_latest(&[analysis_with_overall(50.0), analysis_with_overall(10.0)]),
            TrendTag::Stable
        );
    }

    #[test]
    fn trend_direction_follows_two_point_swing() {
        let improving = vec![
            analysis_with_overall(54.0),
            analysis_with_overall(53.0),
            analysis_with_overall(50.0),
        ];
        assert_eq!(trend_from_latest(&improving), TrendTag::Improving);

        let declining = vec![
            analysis_with_overall(40.0),
            analysis_with_overall(41.0),
            analysis_with_overall(42.5),
        ];
        assert_eq!(trend_from_latest(&declining), TrendTag::Declining);

        let flat = vec![
            analysis_with_overall(50.5),
            analysis_with_overall(49.0),
            analysis_with_overall(50.0),
        ];
        assert_eq!(trend_from_latest(&flat), TrendTag::Stable);
    }

    #[test]
    fn csv_carries_the_fixed_column_order() {
        let rendered = render_csv(&[analysis_with_overall(42.0)]).unwrap();
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next().unwrap(),
            "analysis_id,created_at,company_name,industry_sector,reporting_period,environmental,social,governance,overall,frameworks,coverage_avg"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("MegaCorp"));
        assert!(row.contains("FY2024"));
        assert!(row.contains("CSRD|TCFD"));
        // (30.8 + 45.5) / 2 = 38.2 rounded
        assert!(row.ends_with("38.2"));
    }

    #[test]
    fn csv_export_is_empty_safe() {
        let rendered = render_csv(&[]).unwrap();
        assert_eq!(rendered.lines().count(), 1);
    }
}
