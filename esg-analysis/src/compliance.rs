//! Framework compliance evaluation: requirement findings, coverage and
//! gap analysis with severity policy.

use esg_catalog::{is_critical_category, Catalog, CatalogRequirement};
use esg_core::{
    ExtractedMetric, Framework, FrameworkCoverage, Gap, MatchReason, RequirementFinding, Severity,
};

/// Metric findings only qualify at or above this confidence.
pub const METRIC_CONFIDENCE_FLOOR: f64 = 0.5;

const KEYWORD_FINDING_CONFIDENCE: f64 = 0.6;
const EVIDENCE_WINDOW_CHARS: usize = 120;

#[derive(Debug, Default)]
pub struct ComplianceOutcome {
    pub findings: Vec<RequirementFinding>,
    pub coverage: Vec<FrameworkCoverage>,
    pub gaps: Vec<Gap>,
    pub recommendations: Vec<String>,
}

/// Evaluates the requested frameworks against normalized text and the
/// extracted metrics. One framework never fails another: evaluation is
/// pure and per-requirement.
pub fn evaluate(
    catalog: &Catalog,
    normalized_text: &str,
    metrics: &[ExtractedMetric],
    frameworks: &[Framework],
    industry_sector: Option<&str>,
) -> ComplianceOutcome {
    let mut outcome = ComplianceOutcome::default();
    let sector = industry_sector.map(|s| s.to_lowercase());

    for framework in frameworks {
        let requirements = catalog.requirements(*framework);
        let mut found = 0u32;
        let mut mandatory_met = 0u32;
        let mandatory_total = requirements.iter().filter(|r| r.mandatory).count() as u32;

        for requirement in &requirements {
            match assess_requirement(requirement, normalized_text, metrics) {
                Assessment::Found(finding) => {
                    found += 1;
                    if requirement.mandatory {
                        mandatory_met += 1;
                    }
                    outcome.findings.push(finding);
                }
                Assessment::Missing { partial_overlap } => {
                    let severity =
                        gap_severity(requirement, sector.as_deref(), partial_overlap);
                    outcome.gaps.push(Gap {
                        framework: *framework,
                        requirement_id: requirement.id.clone(),
                        category: requirement.category.clone(),
                        description: requirement.description.clone(),
                        severity,
                    });
                }
            }
        }

        outcome.coverage.push(FrameworkCoverage::compute(
            *framework,
            found,
            requirements.len() as u32,
            mandatory_met,
            mandatory_total,
        ));
    }

    outcome.recommendations = recommendations_for(&outcome.gaps);
    outcome
}

enum Assessment {
    Found(RequirementFinding),
    Missing { partial_overlap: bool },
}

fn assess_requirement(
    requirement: &CatalogRequirement,
    normalized_text: &str,
    metrics: &[ExtractedMetric],
) -> Assessment {
    // Metric evidence is preferred over keyword evidence when both apply.
    let metric_hit = metrics
        .iter()
        .filter(|m| m.confidence >= METRIC_CONFIDENCE_FLOOR)
        .filter(|m| {
            m.framework_mappings.iter().any(|r| {
                r.framework == requirement.framework && r.requirement_id == requirement.id
            })
        })
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    if let Some(metric) = metric_hit {
        return Assessment::Found(RequirementFinding {
            framework: requirement.framework,
            requirement_id: requirement.id.clone(),
            category: requirement.category.clone(),
            reason: MatchReason::Metric {
                metric_name: metric.name.clone(),
            },
            evidence: metric.snippet.clone(),
            confidence: metric.confidence,
        });
    }

    for phrase in &requirement.keywords {
        if let Some(pos) = normalized_text.find(phrase.as_str()) {
            return Assessment::Found(RequirementFinding {
                framework: requirement.framework,
                requirement_id: requirement.id.clone(),
                category: requirement.category.clone(),
                reason: MatchReason::Keyword {
                    phrase: phrase.clone(),
                },
                evidence: evidence_window(normalized_text, pos, phrase.len()),
                confidence: KEYWORD_FINDING_CONFIDENCE,
            });
        }
    }

    Assessment::Missing {
        partial_overlap: has_partial_overlap(requirement, normalized_text),
    }
}

/// Partial semantic overlap: no whole phrase matched, but an individual
/// token (length >= 4) of a multi-word keyword phrase occurs in the text.
fn has_partial_overlap(requirement: &CatalogRequirement, normalized_text: &str) -> bool {
    requirement
        .keywords
        .iter()
        .filter(|phrase| phrase.contains(' '))
        .flat_map(|phrase| phrase.split_whitespace())
        .filter(|token| token.len() >= 4)
        .any(|token| {
            normalized_text
                .split_whitespace()
                .any(|word| word.trim_matches(|c: char| !c.is_alphanumeric()) == token)
        })
}

fn gap_severity(
    requirement: &CatalogRequirement,
    sector: Option<&str>,
    partial_overlap: bool,
) -> Severity {
    if partial_overlap {
        return Severity::Low;
    }
    if requirement.mandatory {
        if is_critical_category(requirement.framework, &requirement.category) {
            Severity::Critical
        } else {
            Severity::High
        }
    } else if sector.map_or(false, |s| {
        requirement.industry_critical.iter().any(|c| c == s)
    }) {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn evidence_window(text: &str, pos: usize, len: usize) -> String {
    let half = EVIDENCE_WINDOW_CHARS / 2;
    let before: Vec<char> = text[..pos].chars().collect();
    let after: Vec<char> = text[pos + len..].chars().collect();
    let prefix: String = before[before.len().saturating_sub(half)..].iter().collect();
    let suffix: String = after[..after.len().min(half)].iter().collect();
    format!("{}{}{}", prefix, &text[pos..pos + len], suffix)
        .trim()
        .to_string()
}

fn directive(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Immediately address",
        Severity::High => "Prioritize",
        Severity::Medium => "Plan disclosure of",
        Severity::Low => "Strengthen existing coverage of",
    }
}

/// Short templated directives, one per gap, critical first.
fn recommendations_for(gaps: &[Gap]) -> Vec<String> {
    let mut ordered: Vec<&Gap> = gaps.iter().collect();
    ordered.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.framework.as_str().cmp(b.framework.as_str()))
            .then_with(|| a.requirement_id.cmp(&b.requirement_id))
    });
    ordered
        .into_iter()
        .map(|gap| {
            format!(
                "{} {} reporting: {} ({} {})",
                directive(gap.severity),
                gap.category.replace('_', " "),
                gap.description,
                gap.framework.as_str(),
                gap.requirement_id
            )
        })
        .collect()
}
