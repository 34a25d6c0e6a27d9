//! Metric candidate extraction and standardization (the full-mode path).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use esg_catalog::Catalog;
use esg_core::{AnalysisDiagnostics, ExtractedMetric, Framework, RequirementRef};

use crate::units::{self, UnitFamily};

/// Generic numeric-with-unit fallback, applied after the catalog patterns.
static GENERIC_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([0-9][0-9,.\s]*?)\s*(ktco2e|mtco2e|t\s?co2e?|kg\s?co2e?|mwh|gwh|twh|kwh|gj|tj|million\s+m3|m3|m³|megalit(?:er|re)s|lit(?:er|re)s|gallons?|employees|workers|incidents|fatalities)\b",
    )
    .unwrap()
});

static GENERIC_PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9][0-9,.]*)\s*(%|percent)").unwrap());

const SNIPPET_CONTEXT_CHARS: usize = 80;
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug)]
struct Candidate {
    name: String,
    raw_value: String,
    raw_unit: String,
    match_start: usize,
    match_end: usize,
    refs: Vec<RequirementRef>,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub metrics: Vec<ExtractedMetric>,
    pub diagnostics: AnalysisDiagnostics,
}

fn generic_name(family: UnitFamily) -> &'static str {
    match family {
        UnitFamily::Emissions => "ghg_emissions",
        UnitFamily::Energy => "energy_consumption",
        UnitFamily::Water => "water_consumption",
        UnitFamily::Percentage => "percentage",
        UnitFamily::Monetary => "monetary_value",
        UnitFamily::Count => "count",
        UnitFamily::Unknown => "quantity",
    }
}

/// Evidence window: up to 80 chars either side of the match, trimmed to
/// word boundaries, capped at 200 chars.
fn snippet(text: &str, start: usize, end: usize) -> String {
    let before: Vec<char> = text[..start].chars().collect();
    let after: Vec<char> = text[end..].chars().collect();

    let mut prefix_start = before.len().saturating_sub(SNIPPET_CONTEXT_CHARS);
    if prefix_start > 0 {
        while prefix_start < before.len() && !before[prefix_start].is_whitespace() {
            prefix_start += 1;
        }
    }
    let prefix: String = before[prefix_start..].iter().collect();

    let mut suffix_end = after.len().min(SNIPPET_CONTEXT_CHARS);
    if suffix_end < after.len() {
        while suffix_end > 0 && !after[suffix_end - 1].is_whitespace() {
            suffix_end -= 1;
        }
    }
    let suffix: String = after[..suffix_end].iter().collect();

    let combined = format!("{}{}{}", prefix.trim_start(), &text[start..end], suffix.trim_end());
    esg_core::truncate_chars(combined.trim(), SNIPPET_MAX_CHARS)
}

/// Extracts metric candidates from the raw text via the requested
/// frameworks' catalog patterns plus the generic fallback, standardizes
/// them, and cross-maps standardized metrics back onto requirement ids.
/// Per-candidate failures are dropped and tallied, never fatal.
pub fn extract_metrics(
    text: &str,
    catalog: &Catalog,
    frameworks: &[Framework],
) -> ExtractionOutcome {
    // Keyed by the byte offset of the numeric group so the same figure
    // surfaced by several patterns collapses into one candidate.
    let mut candidates: BTreeMap<usize, Candidate> = BTreeMap::new();

    for framework in frameworks {
        for requirement in catalog.requirements(*framework) {
            for pattern in &requirement.metric_patterns {
                for caps in pattern.regex.captures_iter(text) {
                    let (Some(value), Some(unit)) = (caps.get(1), caps.get(2)) else {
                        continue;
                    };
                    let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
                    let reference = RequirementRef {
                        framework: *framework,
                        requirement_id: requirement.id.clone(),
                    };
                    candidates
                        .entry(value.start())
                        .and_modify(|c| {
                            if !c.refs.contains(&reference) {
                                c.refs.push(reference.clone());
                            }
                        })
                        .or_insert_with(|| Candidate {
                            name: pattern.metric_name.clone(),
                            raw_value: value.as_str().trim().to_string(),
                            raw_unit: unit.as_str().trim().to_string(),
                            match_start: whole.0,
                            match_end: whole.1,
                            refs: vec![reference],
                        });
                }
            }
        }
    }

    for re in [&*GENERIC_UNIT_RE, &*GENERIC_PERCENT_RE] {
        for caps in re.captures_iter(text) {
            let (Some(value), Some(unit)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if candidates.contains_key(&value.start()) {
                continue;
            }
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
            let family = units::resolve_unit(unit.as_str())
                .map(|r| r.family)
                .unwrap_or(UnitFamily::Unknown);
            candidates.insert(
                value.start(),
                Candidate {
                    name: generic_name(family).to_string(),
                    raw_value: value.as_str().trim().to_string(),
                    raw_unit: unit.as_str().trim().to_string(),
                    match_start: whole.0,
                    match_end: whole.1,
                    refs: Vec::new(),
                },
            );
        }
    }

    let mut outcome = ExtractionOutcome::default();
    outcome.diagnostics.candidates_seen = candidates.len() as u32;

    for candidate in candidates.into_values() {
        let evidence = snippet(text, candidate.match_start, candidate.match_end);
        match units::standardize(&candidate.raw_value, &candidate.raw_unit, &evidence) {
            Some(standardized) if standardized.confidence > 0.0 => {
                let mut refs = candidate.refs;
                cross_map(&mut refs, &candidate.name, &evidence, catalog, frameworks);
                outcome.metrics.push(ExtractedMetric {
                    name: candidate.name,
                    raw_value: candidate.raw_value,
                    raw_unit: candidate.raw_unit,
                    normalized_value: standardized.value,
                    normalized_unit: standardized.unit,
                    confidence: standardized.confidence,
                    snippet: evidence,
                    framework_mappings: refs,
                });
            }
            _ => {
                outcome.diagnostics.candidates_dropped += 1;
                tracing::debug!(
                    value = %candidate.raw_value,
                    unit = %candidate.raw_unit,
                    "dropping unstandardizable metric candidate"
                );
            }
        }
    }

    outcome
}

/// Attaches every requested requirement whose metric-pattern hints agree
/// with this metric, by shared metric name or by a pattern match inside
/// the evidence snippet.
fn cross_map(
    refs: &mut Vec<RequirementRef>,
    metric_name: &str,
    evidence: &str,
    catalog: &Catalog,
    frameworks: &[Framework],
) {
    for framework in frameworks {
        for requirement in catalog.requirements(*framework) {
            for pattern in &requirement.metric_patterns {
                if pattern.metric_name == metric_name || pattern.regex.is_match(evidence) {
                    let reference = RequirementRef {
                        framework: *framework,
                        requirement_id: requirement.id.clone(),
                    };
                    if !refs.contains(&reference) {
                        refs.push(reference);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::standard()
    }

    #[test]
    fn scenario_text_yields_named_percentages() {
        let text = "We reduced carbon emissions by 35% and increased board diversity to 40% women.";
        let outcome = extract_metrics(text, &catalog(), &[Framework::Csrd, Framework::Tcfd]);

        let reduction = outcome
            .metrics
            .iter()
            .find(|m| m.name == "emissions_reduction")
            .expect("emissions_reduction extracted");
        assert_eq!(reduction.normalized_value, 35.0);
        assert_eq!(reduction.normalized_unit, "%");
        assert!(reduction.confidence >= 0.8);

        let diversity = outcome
            .metrics
            .iter()
            .find(|m| m.name == "board_diversity")
            .expect("board_diversity extracted");
        assert_eq!(diversity.normalized_value, 40.0);
        assert_eq!(diversity.normalized_unit, "%");
    }

    #[test]
    fn emissions_metric_maps_to_requesting_frameworks() {
        let text = "Our gross Scope 1 emissions were 1,200 tCO2e for the year.";
        let outcome = extract_metrics(text, &catalog(), &[Framework::Csrd, Framework::Tcfd]);

        let emissions = outcome
            .metrics
            .iter()
            .find(|m| m.name == "ghg_emissions")
            .expect("emissions extracted");
        assert_eq!(emissions.normalized_value, 1200.0);
        assert_eq!(emissions.normalized_unit, "tCO2e");
        assert!(emissions.framework_mappings.iter().any(|r| {
            r.framework == Framework::Csrd && r.requirement_id == "E1-6"
        }));
        assert!(emissions.framework_mappings.iter().any(|r| {
            r.framework == Framework::Tcfd && r.requirement_id == "MET-B"
        }));
    }

    #[test]
    fn unit_conversion_applies_during_extraction() {
        let text = "Total energy consumption reached 2 GWh across all sites.";
        let outcome = extract_metrics(text, &catalog(), &[Framework::Csrd]);
        let energy = outcome
            .metrics
            .iter()
            .find(|m| m.name == "energy_consumption")
            .unwrap();
        assert_eq!(energy.normalized_value, 2000.0);
        assert_eq!(energy.normalized_unit, "MWh");
    }

    #[test]
    fn unparseable_candidates_are_tallied_not_fatal() {
        let text = "An increase of 2,000% was claimed alongside 10 MWh of usage.";
        let outcome = extract_metrics(text, &catalog(), &[Framework::Csrd]);
        assert!(outcome.metrics.iter().any(|m| m.name == "energy_consumption"));
        assert!(outcome.diagnostics.candidates_dropped >= 1);
        assert!(outcome.metrics.iter().all(|m| m.name != "percentage" || m.normalized_value <= 100.0));
    }

    #[test]
    fn snippet_is_bounded_and_word_aligned() {
        let filler = "sustainability ".repeat(30);
        let text = format!("{}emissions of 1,200 tCO2e recorded{}", filler, filler);
        let outcome = extract_metrics(&text, &catalog(), &[Framework::Csrd]);
        let metric = &outcome.metrics[0];
        assert!(metric.snippet.chars().count() <= 200);
        assert!(metric.snippet.contains("1,200 tCO2e"));
        assert!(!metric.snippet.starts_with(' '));
    }

    #[test]
    fn duplicate_patterns_collapse_into_one_metric() {
        let text = "Scope 1 emissions: 900 tCO2e.";
        let outcome = extract_metrics(text, &catalog(), &[Framework::Csrd, Framework::Gri, Framework::Tcfd]);
        let count = outcome
            .metrics
            .iter()
            .filter(|m| (m.normalized_value - 900.0).abs() < f64::EPSILON)
            .count();
        assert_eq!(count, 1);
        let metric = outcome
            .metrics
            .iter()
            .find(|m| (m.normalized_value - 900.0).abs() < f64::EPSILON)
            .unwrap();
        assert!(metric.framework_mappings.len() >= 2);
    }
}
