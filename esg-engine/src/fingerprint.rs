//! Request fingerprints: lowercase hex SHA-256 digests summarizing the
//! inputs that determine an analysis result.

use esg_core::{sha256_hex, AnalysisKind, Framework};

fn suffix(kind: AnalysisKind, frameworks: &[Framework], industry: Option<&str>) -> String {
    let mut names: Vec<&str> = frameworks.iter().map(|f| f.as_str()).collect();
    names.sort_unstable();
    format!(
        "{}|{}|{}",
        kind.as_str(),
        names.join(","),
        industry.unwrap_or("")
    )
}

pub fn for_url(
    canonical_url: &str,
    kind: AnalysisKind,
    frameworks: &[Framework],
    industry: Option<&str>,
) -> String {
    sha256_hex(format!("{}|{}", canonical_url, suffix(kind, frameworks, industry)).as_bytes())
}

pub fn for_text(
    text: &str,
    kind: AnalysisKind,
    frameworks: &[Framework],
    industry: Option<&str>,
) -> String {
    let text_digest = sha256_hex(text.as_bytes());
    sha256_hex(format!("{}|{}", text_digest, suffix(kind, frameworks, industry)).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_order_does_not_change_the_fingerprint() {
        let a = for_text(
            "body",
            AnalysisKind::Full,
            &[Framework::Csrd, Framework::Tcfd],
            None,
        );
        let b = for_text(
            "body",
            AnalysisKind::Full,
            &[Framework::Tcfd, Framework::Csrd],
            None,
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn every_input_dimension_changes_the_fingerprint() {
        let base = for_text("body", AnalysisKind::Full, &[Framework::Csrd], None);
        assert_ne!(base, for_text("other", AnalysisKind::Full, &[Framework::Csrd], None));
        assert_ne!(base, for_text("body", AnalysisKind::Quick, &[Framework::Csrd], None));
        assert_ne!(base, for_text("body", AnalysisKind::Full, &[Framework::Gri], None));
        assert_ne!(
            base,
            for_text("body", AnalysisKind::Full, &[Framework::Csrd], Some("mining"))
        );
    }

    #[test]
    fn url_and_text_fingerprints_differ() {
        let url = for_url("https://example.com/r", AnalysisKind::Full, &[Framework::Csrd], None);
        let text = for_text("https://example.com/r", AnalysisKind::Full, &[Framework::Csrd], None);
        assert_ne!(url, text);
    }
}
