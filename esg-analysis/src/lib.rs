pub mod compliance;
pub mod extractor;
pub mod insights;
pub mod scorer;
pub mod sentiment;
pub mod units;

pub use compliance::{evaluate, ComplianceOutcome, METRIC_CONFIDENCE_FLOOR};
pub use extractor::{extract_metrics, ExtractionOutcome};
pub use insights::{generate_insights, MAX_INSIGHTS};
pub use scorer::{apply_sentiment, score_text, Pillar, ScoreBreakdown};
pub use sentiment::LexiconSentiment;
pub use units::{parse_number, standardize, UnitFamily};
