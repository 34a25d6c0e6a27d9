//! Token-level category scoring with weighted domain keyword tables.

use serde::{Deserialize, Serialize};

use esg_core::{normalize_for_match, round1, Scores, SentimentLabel, SentimentSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Environmental,
    Social,
    Governance,
}

/// Per-phrase occurrence cap, guarding against keyword stuffing.
const OCCURRENCE_CAP: usize = 5;

const ENVIRONMENTAL_CAP: f64 = 40.0;
const SOCIAL_CAP: f64 = 35.0;
const GOVERNANCE_CAP: f64 = 30.0;

/// Weighted phrase tables. Domain-critical terms carry weight 2.0.
const ENVIRONMENTAL_KEYWORDS: &[(&str, f64)] = &[
    ("net zero", 2.0),
    ("net-zero", 2.0),
    ("scope 1", 2.0),
    ("scope 2", 2.0),
    ("scope 3", 2.0),
    ("decarboni", 2.0),
    ("science based target", 2.0),
    ("greenhouse gas", 1.5),
    ("renewable", 1.5),
    ("biodiversity", 1.5),
    ("energy efficiency", 1.5),
    ("circular economy", 1.5),
    ("carbon", 1.0),
    ("emission", 1.0),
    ("climate", 1.0),
    ("water", 1.0),
    ("waste", 1.0),
    ("recycl", 1.0),
    ("pollution", 1.0),
    ("solar", 1.0),
    ("wind power", 1.0),
    ("environmental", 1.0),
    ("sustainab", 1.0),
];

const SOCIAL_KEYWORDS: &[(&str, f64)] = &[
    ("human rights", 2.0),
    ("pay equity", 2.0),
    ("living wage", 2.0),
    ("board diversity", 2.0),
    ("health and safety", 1.5),
    ("diversity", 1.5),
    ("inclusion", 1.5),
    ("gender", 1.5),
    ("collective bargaining", 1.5),
    ("employee", 1.0),
    ("workforce", 1.0),
    ("training", 1.0),
    ("community", 1.0),
    ("wellbeing", 1.0),
    ("well-being", 1.0),
    ("women", 1.0),
    ("labor", 1.0),
    ("labour", 1.0),
    ("volunteer", 1.0),
    ("supply chain", 1.0),
    ("social", 1.0),
];

const GOVERNANCE_KEYWORDS: &[(&str, f64)] = &[
    ("anti-corruption", 2.0),
    ("anti-bribery", 2.0),
    ("board diversity", 2.0),
    ("whistleblower", 1.5),
    ("governance", 1.5),
    ("ethics", 1.5),
    ("transparency", 1.5),
    ("risk management", 1.5),
    ("independent director", 1.5),
    ("executive compensation", 1.5),
    ("board", 1.0),
    ("audit", 1.0),
    ("compliance", 1.0),
    ("shareholder", 1.0),
    ("stewardship", 1.0),
    ("data privacy", 1.0),
    ("code of conduct", 1.0),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedKeyword {
    pub phrase: String,
    pub pillar: Pillar,
    pub weight: f64,
    pub occurrences: u32,
}

#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub scores: Scores,
    pub matched: Vec<MatchedKeyword>,
}

impl ScoreBreakdown {
    /// Matched phrases ordered by contribution, strongest first.
    pub fn top_phrases(&self, limit: usize) -> Vec<String> {
        let mut ranked: Vec<&MatchedKeyword> = self.matched.iter().collect();
        ranked.sort_by(|a, b| {
            let ca = a.weight * a.occurrences as f64;
            let cb = b.weight * b.occurrences as f64;
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.phrase.cmp(&b.phrase))
        });
        ranked.into_iter().take(limit).map(|m| m.phrase.clone()).collect()
    }
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(needle) {
        count += 1;
        offset += pos + needle.len();
        if count >= OCCURRENCE_CAP {
            break;
        }
    }
    count
}

fn pillar_raw(normalized: &str, table: &[(&str, f64)], pillar: Pillar, matched: &mut Vec<MatchedKeyword>) -> f64 {
    let mut raw = 0.0;
    for (phrase, weight) in table {
        let occurrences = count_occurrences(normalized, phrase);
        if occurrences > 0 {
            raw += weight * occurrences as f64;
            matched.push(MatchedKeyword {
                phrase: phrase.to_string(),
                pillar,
                weight: *weight,
                occurrences: occurrences as u32,
            });
        }
    }
    raw
}

fn scale(raw: f64, cap: f64) -> f64 {
    round1((100.0 * raw / cap).min(100.0))
}

/// Scores the three pillars from normalized text. Deterministic: the same
/// text always yields identical scores.
pub fn score_text(text: &str) -> ScoreBreakdown {
    let normalized = normalize_for_match(text);
    let mut matched = Vec::new();

    let env_raw = pillar_raw(&normalized, ENVIRONMENTAL_KEYWORDS, Pillar::Environmental, &mut matched);
    let soc_raw = pillar_raw(&normalized, SOCIAL_KEYWORDS, Pillar::Social, &mut matched);
    let gov_raw = pillar_raw(&normalized, GOVERNANCE_KEYWORDS, Pillar::Governance, &mut matched);

    let scores = Scores::from_pillars(
        scale(env_raw, ENVIRONMENTAL_CAP),
        scale(soc_raw, SOCIAL_CAP),
        scale(gov_raw, GOVERNANCE_CAP),
    );

    ScoreBreakdown { scores, matched }
}

/// Applies an optional sentiment adjustment of ±min(5, 10·confidence) per
/// pillar, then clamps back into [0, 100].
pub fn apply_sentiment(scores: Scores, signal: Option<SentimentSignal>) -> Scores {
    let Some(signal) = signal else {
        return scores;
    };
    let magnitude = (10.0 * signal.confidence).min(5.0);
    let delta = match signal.label {
        SentimentLabel::Positive => magnitude,
        SentimentLabel::Negative => -magnitude,
        SentimentLabel::Neutral => 0.0,
    };
    let adjust = |v: f64| round1((v + delta).clamp(0.0, 100.0));
    Scores::from_pillars(
        adjust(scores.environmental),
        adjust(scores.social),
        adjust(scores.governance),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_TEXT: &str =
        "We reduced carbon emissions by 35% and increased board diversity to 40% women.";

    #[test]
    fn scenario_text_scores_environment_and_governance() {
        let breakdown = score_text(SCENARIO_TEXT);
        assert!(breakdown.scores.environmental > 0.0);
        assert!(breakdown.scores.governance > 0.0);
        assert!(breakdown.scores.social > 0.0);
        assert_eq!(
            breakdown.scores.overall,
            round1(
                (breakdown.scores.environmental
                    + breakdown.scores.social
                    + breakdown.scores.governance)
                    / 3.0
            )
        );
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = score_text(SCENARIO_TEXT);
        let b = score_text(SCENARIO_TEXT);
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.top_phrases(5), b.top_phrases(5));
    }

    #[test]
    fn occurrences_are_capped_against_stuffing() {
        let stuffed = "carbon ".repeat(50);
        let once = score_text("carbon");
        let capped = score_text(&stuffed);
        // 5x the weight at most, not 50x
        assert!(capped.scores.environmental <= once.scores.environmental * 5.0 + 0.1);
        let matched = capped
            .matched
            .iter()
            .find(|m| m.phrase == "carbon")
            .unwrap();
        assert_eq!(matched.occurrences, 5);
    }

    #[test]
    fn scores_never_exceed_one_hundred() {
        let dense = "net zero scope 1 scope 2 scope 3 renewable biodiversity carbon emission climate water waste pollution decarbonisation greenhouse gas energy efficiency circular economy sustainable solar ".repeat(10);
        let breakdown = score_text(&dense);
        assert!(breakdown.scores.environmental <= 100.0);
        assert_eq!(breakdown.scores.environmental, 100.0);
    }

    #[test]
    fn empty_text_scores_zero() {
        let breakdown = score_text("");
        assert_eq!(breakdown.scores.overall, 0.0);
        assert!(breakdown.matched.is_empty());
    }

    #[test]
    fn positive_sentiment_lifts_scores_within_bounds() {
        let base = Scores::from_pillars(50.0, 50.0, 50.0);
        let lifted = apply_sentiment(
            base,
            Some(SentimentSignal {
                label: SentimentLabel::Positive,
                confidence: 0.9,
            }),
        );
        assert_eq!(lifted.environmental, 55.0);

        let weak = apply_sentiment(
            base,
            Some(SentimentSignal {
                label: SentimentLabel::Positive,
                confidence: 0.2,
            }),
        );
        assert_eq!(weak.environmental, 52.0);
    }

    #[test]
    fn negative_sentiment_clamps_at_zero() {
        let base = Scores::from_pillars(2.0, 2.0, 2.0);
        let lowered = apply_sentiment(
            base,
            Some(SentimentSignal {
                label: SentimentLabel::Negative,
                confidence: 1.0,
            }),
        );
        assert_eq!(lowered.environmental, 0.0);
    }

    #[test]
    fn absent_sentiment_leaves_scores_untouched() {
        let base = Scores::from_pillars(40.0, 30.0, 20.0);
        assert_eq!(apply_sentiment(base, None), base);
    }

    #[test]
    fn top_phrases_rank_by_contribution() {
        let breakdown = score_text("net zero net zero carbon");
        let top = breakdown.top_phrases(2);
        assert_eq!(top[0], "net zero");
    }
}
