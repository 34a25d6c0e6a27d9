//! Lexicon-based default for the optional sentiment capability. The
//! scoring path works unchanged when no provider is wired in.

use async_trait::async_trait;

use esg_core::{EsgResult, SentimentLabel, SentimentProvider, SentimentSignal};

const POSITIVE_TERMS: &[&str] = &[
    "improved", "improvement", "reduced emissions", "achieved", "exceeded", "progress",
    "increased diversity", "strengthened", "award", "leading", "on track", "milestone",
];

const NEGATIVE_TERMS: &[&str] = &[
    "failed", "failure", "violation", "penalty", "fine", "incident", "missed", "declined",
    "lawsuit", "breach", "fatality", "non-compliance",
];

/// Deterministic word-list classifier used in development and tests.
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn classify_sync(text: &str) -> SentimentSignal {
        let lower = text.to_lowercase();
        let positives = POSITIVE_TERMS.iter().filter(|t| lower.contains(*t)).count() as f64;
        let negatives = NEGATIVE_TERMS.iter().filter(|t| lower.contains(*t)).count() as f64;

        let balance = positives - negatives;
        let label = if balance > 0.0 {
            SentimentLabel::Positive
        } else if balance < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        let confidence = (balance.abs() / 5.0).min(1.0);
        SentimentSignal { label, confidence }
    }
}

#[async_trait]
impl SentimentProvider for LexiconSentiment {
    async fn classify(&self, text: &str) -> EsgResult<SentimentSignal> {
        Ok(Self::classify_sync(text))
    }
}
