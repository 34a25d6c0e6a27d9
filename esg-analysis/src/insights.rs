//! Rule-based narrative insights derived from scores, keywords, metrics
//! and notable gaps.

use esg_core::{ExtractedMetric, FrameworkCoverage, Gap, Scores, SentimentLabel, SentimentSignal, Severity};

use crate::scorer::ScoreBreakdown;

pub const MAX_INSIGHTS: usize = 8;

fn score_band(overall: f64) -> &'static str {
    match overall {
        v if v >= 70.0 => "strong",
        v if v >= 40.0 => "moderate",
        v if v >= 15.0 => "emerging",
        _ => "limited",
    }
}

fn pillar_extremes(scores: &Scores) -> (&'static str, &'static str) {
    let pillars = [
        ("environmental", scores.environmental),
        ("social", scores.social),
        ("governance", scores.governance),
    ];
    let strongest = pillars
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|p| p.0)
        .unwrap_or("environmental");
    let weakest = pillars
        .iter()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|p| p.0)
        .unwrap_or("environmental");
    (strongest, weakest)
}

/// Builds at most [`MAX_INSIGHTS`] deterministic, human-readable insight
/// statements.
pub fn generate_insights(
    breakdown: &ScoreBreakdown,
    metrics: &[ExtractedMetric],
    coverage: &[FrameworkCoverage],
    gaps: &[Gap],
    sentiment: Option<SentimentSignal>,
) -> Vec<String> {
    let mut insights = Vec::new();
    let scores = &breakdown.scores;

    insights.push(format!(
        "Overall ESG disclosure signal is {} at {:.1}/100.",
        score_band(scores.overall),
        scores.overall
    ));

    let (strongest, weakest) = pillar_extremes(scores);
    if strongest != weakest {
        insights.push(format!(
            "Disclosure is strongest on the {} pillar and thinnest on the {} pillar.",
            strongest, weakest
        ));
    }

    let top = breakdown.top_phrases(3);
    if !top.is_empty() {
        insights.push(format!("Reporting emphasis centers on: {}.", top.join(", ")));
    }

    if !metrics.is_empty() {
        let quantified = metrics.iter().filter(|m| m.confidence >= 0.8).count();
        insights.push(format!(
            "{} quantitative metrics were extracted, {} with high confidence.",
            metrics.len(),
            quantified
        ));
    }

    let critical = gaps.iter().filter(|g| g.severity == Severity::Critical).count();
    if critical > 0 {
        insights.push(format!(
            "{} critical disclosure gaps require immediate attention.",
            critical
        ));
    }

    if let Some(best) = coverage.iter().max_by(|a, b| {
        a.coverage_percentage
            .partial_cmp(&b.coverage_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        insights.push(format!(
            "Best framework alignment is {} at {:.1}% coverage.",
            best.framework.as_str(),
            best.coverage_percentage
        ));
    }

    if let Some(coverage) = coverage
        .iter()
        .find(|c| c.mandatory_total > 0 && c.mandatory_met < c.mandatory_total)
    {
        insights.push(format!(
            "{} of {} mandatory {} requirements are still unmet.",
            coverage.mandatory_total - coverage.mandatory_met,
            coverage.mandatory_total,
            coverage.framework.as_str()
        ));
    }

    if let Some(signal) = sentiment {
        let tone = match signal.label {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        };
        insights.push(format!(
            "Narrative tone reads {} (confidence {:.2}).",
            tone, signal.confidence
        ));
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::score_text;
    use esg_core::{Framework, FrameworkCoverage, Gap};

    #[test]
    fn insights_are_bounded_and_lead_with_overall() {
        let breakdown = score_text("carbon emissions and board diversity with net zero targets");
        let coverage = vec![FrameworkCoverage::compute(Framework::Csrd, 3, 13, 3, 13)];
        let gaps = vec![Gap {
            framework: Framework::Csrd,
            requirement_id: "E1-6".into(),
            category: "climate".into(),
            description: "GHG emissions".into(),
            severity: Severity::Critical,
        }];
        let insights = generate_insights(&breakdown, &[], &coverage, &gaps, None);
        assert!(insights.len() <= MAX_INSIGHTS);
        assert!(insights[0].starts_with("Overall ESG disclosure signal"));
        assert!(insights.iter().any(|i| i.contains("critical disclosure gaps")));
        assert!(insights.iter().any(|i| i.contains("CSRD")));
    }

    #[test]
    fn empty_inputs_still_produce_a_summary() {
        let breakdown = score_text("");
        let insights = generate_insights(&breakdown, &[], &[], &[], None);
        assert!(!insights.is_empty());
        assert!(insights[0].contains("limited"));
    }

    #[test]
    fn insights_are_deterministic() {
        let breakdown = score_text("renewable energy transition with strong governance");
        let a = generate_insights(&breakdown, &[], &[], &[], None);
        let b = generate_insights(&breakdown, &[], &[], &[], None);
        assert_eq!(a, b);
    }
}
