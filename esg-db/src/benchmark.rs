//! Aggregation shared by the store backends: benchmarks are computed over
//! each company's latest analysis.

use esg_core::{median, round1, Analysis, BenchmarkAggregate, Framework};

/// `latest` holds one analysis per company (its most recent).
pub fn aggregate_from_latest(
    latest: &[Analysis],
    frameworks: &[Framework],
    sector: Option<&str>,
) -> BenchmarkAggregate {
    let mut overalls: Vec<f64> = latest.iter().map(|a| a.scores.overall).collect();

    let average_coverage = frameworks
        .iter()
        .map(|fw| {
            let percentages: Vec<f64> = latest
                .iter()
                .filter_map(|a| a.coverage_for(*fw).map(|c| c.coverage_percentage))
                .collect();
            let avg = if percentages.is_empty() {
                0.0
            } else {
                round1(percentages.iter().sum::<f64>() / percentages.len() as f64)
            };
            (*fw, avg)
        })
        .collect();

    BenchmarkAggregate {
        sector: sector.map(|s| s.to_string()),
        companies: latest.len() as u32,
        median_overall: median(&mut overalls),
        average_coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_aggregates_to_zero() {
        let aggregate = aggregate_from_latest(&[], &[Framework::Csrd], None);
        assert_eq!(aggregate.companies, 0);
        assert_eq!(aggregate.median_overall, 0.0);
        assert_eq!(aggregate.average_coverage, vec![(Framework::Csrd, 0.0)]);
    }
}
