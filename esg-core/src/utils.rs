use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email) && !email.contains("..")
}

/// Normalizes disclosure text for keyword matching: lowercase, punctuation
/// stripped except `.%-`, whitespace collapsed to single spaces.
pub fn normalize_for_match(text: &str) -> String {
    let filtered: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | '%' | '-') {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Median of the given values, rounded to one decimal; 0.0 when empty.
pub fn median(values: &mut Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        round1((values[mid - 1] + values[mid]) / 2.0)
    } else {
        round1(values[mid])
    }
}

/// Truncates on a char boundary, never mid-codepoint.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        input.to_string()
    } else {
        input.chars().take(max_chars).collect()
    }
}

/// Serde adapter: UTC timestamps as RFC-3339 with millisecond precision.
pub mod ts_ms {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[test]
    fn sha256_hex_is_deterministic() {
        let a = sha256_hex(b"disclosure");
        let b = sha256_hex(b"disclosure");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn round1_rounds_half_away_from_zero() {
        assert_eq!(round1(30.769), 30.8);
        assert_eq!(round1(33.333), 33.3);
        assert_eq!(round1(0.05), 0.1);
    }

    #[test]
    fn validate_email_accepts_common_forms() {
        assert!(validate_email("jane@example.com"));
        assert!(validate_email("j.doe+esg@sub.domain.co.uk"));
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("jane@"));
        assert!(!validate_email("a..b@example.com"));
    }

    #[test]
    fn normalize_strips_punctuation_but_keeps_percent_dot_dash() {
        assert_eq!(
            normalize_for_match("Scope 1 emissions: 1,200 tCO2e (down 35%)!"),
            "scope 1 emissions 1 200 tco2e down 35%"
        );
        assert_eq!(normalize_for_match("  Net-Zero   by 2050. "), "net-zero by 2050.");
    }

    #[test]
    fn median_of_odd_even_and_empty_sets() {
        assert_eq!(median(&mut vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut vec![1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&mut vec![]), 0.0);
        assert_eq!(median(&mut vec![42.0]), 42.0);
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 3), "hél");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[derive(Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super::ts_ms")]
        at: DateTime<Utc>,
    }

    #[test]
    fn timestamps_serialize_with_millisecond_precision() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123)
            + chrono::Duration::microseconds(456);
        let json = serde_json::to_string(&Stamped { at }).unwrap();
        assert_eq!(json, "{\"at\":\"2024-03-01T12:30:45.123Z\"}");

        let back: Stamped = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.at.timestamp_millis(),
            at.timestamp_millis()
        );
    }
}
