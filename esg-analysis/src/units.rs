//! Canonical unit tables and numeric parsing for the metric standardizer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitFamily {
    Emissions,
    Energy,
    Water,
    Monetary,
    Percentage,
    Count,
    Unknown,
}

impl UnitFamily {
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            UnitFamily::Emissions => "tCO2e",
            UnitFamily::Energy => "MWh",
            UnitFamily::Water => "m3",
            UnitFamily::Monetary => "USD",
            UnitFamily::Percentage => "%",
            UnitFamily::Count => "count",
            UnitFamily::Unknown => "",
        }
    }
}

struct UnitEntry {
    names: &'static [&'static str],
    family: UnitFamily,
    factor: f64,
    canonical: &'static str,
    synonym: bool,
}

/// Unit table. Exact spellings carry confidence 1.0, synonym spellings 0.8.
const UNIT_TABLE: &[UnitEntry] = &[
    // Emissions, base tCO2e
    UnitEntry { names: &["tco2e", "t co2e"], family: UnitFamily::Emissions, factor: 1.0, canonical: "tCO2e", synonym: false },
    UnitEntry { names: &["ktco2e"], family: UnitFamily::Emissions, factor: 1e3, canonical: "tCO2e", synonym: false },
    UnitEntry { names: &["mtco2e"], family: UnitFamily::Emissions, factor: 1e6, canonical: "tCO2e", synonym: false },
    UnitEntry { names: &["kg co2e", "kgco2e", "kg co2"], family: UnitFamily::Emissions, factor: 1e-3, canonical: "tCO2e", synonym: false },
    UnitEntry {
        names: &[
            "tco2", "t co2", "tonnes co2e", "tonnes of co2e", "tonnes co2", "tonnes of co2",
            "tonne co2", "tons co2", "tons of co2", "ton co2", "metric tons co2",
            "metric tons of co2", "tonnes", "tons co2e", "tons of co2e",
        ],
        family: UnitFamily::Emissions,
        factor: 1.0,
        canonical: "tCO2e",
        synonym: true,
    },
    // Energy, base MWh
    UnitEntry { names: &["mwh"], family: UnitFamily::Energy, factor: 1.0, canonical: "MWh", synonym: false },
    UnitEntry { names: &["gwh"], family: UnitFamily::Energy, factor: 1e3, canonical: "MWh", synonym: false },
    UnitEntry { names: &["twh"], family: UnitFamily::Energy, factor: 1e6, canonical: "MWh", synonym: false },
    UnitEntry { names: &["kwh"], family: UnitFamily::Energy, factor: 1e-3, canonical: "MWh", synonym: false },
    UnitEntry { names: &["gj"], family: UnitFamily::Energy, factor: 0.2778, canonical: "MWh", synonym: false },
    UnitEntry { names: &["tj"], family: UnitFamily::Energy, factor: 277.78, canonical: "MWh", synonym: false },
    UnitEntry { names: &["megawatt hours", "gigajoules"], family: UnitFamily::Energy, factor: 1.0, canonical: "MWh", synonym: true },
    // Water, base m3
    UnitEntry { names: &["m3", "m³"], family: UnitFamily::Water, factor: 1.0, canonical: "m3", synonym: false },
    UnitEntry {
        names: &["million m3", "million m³", "million cubic meters", "million cubic metres"],
        family: UnitFamily::Water,
        factor: 1e6,
        canonical: "m3",
        synonym: false,
    },
    UnitEntry { names: &["cubic meters", "cubic metres", "cubic meter", "cubic metre"], family: UnitFamily::Water, factor: 1.0, canonical: "m3", synonym: true },
    UnitEntry { names: &["megaliters", "megalitres"], family: UnitFamily::Water, factor: 1e3, canonical: "m3", synonym: true },
    UnitEntry { names: &["liters", "litres", "liter", "litre"], family: UnitFamily::Water, factor: 1e-3, canonical: "m3", synonym: true },
    UnitEntry { names: &["gallons", "gallon"], family: UnitFamily::Water, factor: 3.785e-3, canonical: "m3", synonym: true },
    // Monetary: pass-through with currency annotation, no FX conversion
    UnitEntry { names: &["usd", "$"], family: UnitFamily::Monetary, factor: 1.0, canonical: "USD", synonym: false },
    UnitEntry { names: &["dollars", "us dollars"], family: UnitFamily::Monetary, factor: 1.0, canonical: "USD", synonym: true },
    UnitEntry { names: &["eur", "€", "euros"], family: UnitFamily::Monetary, factor: 1.0, canonical: "EUR", synonym: true },
    UnitEntry { names: &["gbp", "£"], family: UnitFamily::Monetary, factor: 1.0, canonical: "GBP", synonym: true },
    // Percentage
    UnitEntry { names: &["%"], family: UnitFamily::Percentage, factor: 1.0, canonical: "%", synonym: false },
    UnitEntry { names: &["percent", "per cent", "pct"], family: UnitFamily::Percentage, factor: 1.0, canonical: "%", synonym: true },
    // Counts
    UnitEntry {
        names: &["employees", "workers", "fte", "people", "incidents", "injuries", "fatalities", "hours"],
        family: UnitFamily::Count,
        factor: 1.0,
        canonical: "count",
        synonym: false,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct ResolvedUnit {
    pub family: UnitFamily,
    pub factor: f64,
    pub canonical: &'static str,
    pub synonym: bool,
}

fn normalize_unit(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('.')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn resolve_unit(raw: &str) -> Option<ResolvedUnit> {
    let needle = normalize_unit(raw);
    if needle.is_empty() {
        return None;
    }
    for entry in UNIT_TABLE {
        if entry.names.contains(&needle.as_str()) {
            return Some(ResolvedUnit {
                family: entry.family,
                factor: entry.factor,
                canonical: entry.canonical,
                synonym: entry.synonym,
            });
        }
    }
    None
}

/// Family inference from surrounding text, used when the unit token itself
/// is unrecognized. Carries confidence 0.6.
pub fn infer_family_from_context(context: &str) -> Option<UnitFamily> {
    let lower = context.to_lowercase();
    if lower.contains("co2") || lower.contains("emission") || lower.contains("carbon") {
        Some(UnitFamily::Emissions)
    } else if lower.contains("energy") || lower.contains("electricity") {
        Some(UnitFamily::Energy)
    } else if lower.contains("water") {
        Some(UnitFamily::Water)
    } else if lower.contains("employee") || lower.contains("workforce") || lower.contains("headcount") {
        Some(UnitFamily::Count)
    } else {
        None
    }
}

/// Parses localized numerals: `1,234.5`, `1.234,5`, `1 234,5`, `1.2e3`.
/// The regex engine has no lookaround, so separator disambiguation runs as
/// a post-parse routine: with both separators present the last one is the
/// decimal mark; a lone comma followed by exactly three digits groups
/// thousands.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    // Scientific notation never carries grouping separators.
    if cleaned.contains('e') || cleaned.contains('E') {
        if cleaned.contains(',') {
            return None;
        }
        return cleaned.parse::<f64>().ok().filter(|v| v.is_finite());
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (None, None) => cleaned,
        // 1,234.5: comma groups, dot is decimal
        (Some(comma), Some(dot)) if dot > comma => cleaned.replace(',', ""),
        // 1.234,5: dot groups, comma is decimal
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (Some(comma), None) => {
            let after = cleaned.len() - comma - 1;
            if cleaned.matches(',').count() > 1 || after == 3 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        (None, Some(_)) => {
            if cleaned.matches('.').count() > 1 {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standardized {
    pub value: f64,
    pub unit: String,
    pub family: UnitFamily,
    pub confidence: f64,
}

/// Standardizes one (value, unit) candidate. `context` feeds family
/// inference when the unit token is unknown. Returns `None` for candidates
/// that fail parsing or range validation (confidence 0).
pub fn standardize(raw_value: &str, raw_unit: &str, context: &str) -> Option<Standardized> {
    let parsed = parse_number(raw_value)?;

    let (family, factor, canonical, mut confidence) = match resolve_unit(raw_unit) {
        Some(resolved) => {
            let confidence = if resolved.synonym { 0.8 } else { 1.0 };
            (resolved.family, resolved.factor, resolved.canonical.to_string(), confidence)
        }
        None => match infer_family_from_context(context) {
            Some(family) => (family, 1.0, family.canonical_unit().to_string(), 0.6),
            None => (UnitFamily::Unknown, 1.0, normalize_unit(raw_unit), 0.3),
        },
    };

    let mut value = parsed * factor;

    match family {
        UnitFamily::Percentage => {
            if !(0.0..=1000.0).contains(&value) {
                return None;
            }
            if value > 100.0 {
                value = 100.0;
                confidence *= 0.5;
            }
        }
        UnitFamily::Emissions | UnitFamily::Energy | UnitFamily::Water => {
            if value < 0.0 {
                return None;
            }
        }
        UnitFamily::Count => {
            if value < 0.0 {
                return None;
            }
            value = value.round();
        }
        UnitFamily::Monetary | UnitFamily::Unknown => {}
    }

    if !value.is_finite() {
        return None;
    }

    Some(Standardized {
        value,
        unit: canonical,
        family,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_locales() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1 234,5"), Some(1234.5));
        assert_eq!(parse_number("1.2e3"), Some(1200.0));
        assert_eq!(parse_number("50000"), Some(50000.0));
        assert_eq!(parse_number("3.5"), Some(3.5));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn exact_units_carry_full_confidence() {
        let out = standardize("1,200", "tCO2e", "").unwrap();
        assert_eq!(out.value, 1200.0);
        assert_eq!(out.unit, "tCO2e");
        assert_eq!(out.confidence, 1.0);
    }

    #[test]
    fn emissions_conversions_share_a_base() {
        let k = standardize("50", "ktCO2e", "").unwrap();
        let t = standardize("50000", "tons of CO2", "").unwrap();
        let plain = standardize("50000", "tCO2e", "").unwrap();
        assert_eq!(k.value, 50000.0);
        assert_eq!(t.value, 50000.0);
        assert_eq!(plain.value, 50000.0);
        assert_eq!(k.unit, "tCO2e");
        assert_eq!(t.unit, "tCO2e");
        assert!(t.confidence >= 0.8);
        assert_eq!(k.confidence, 1.0);
    }

    #[test]
    fn energy_conversions() {
        assert_eq!(standardize("2", "GWh", "").unwrap().value, 2000.0);
        assert_eq!(standardize("500", "kWh", "").unwrap().value, 0.5);
        let gj = standardize("1000", "GJ", "").unwrap();
        assert!((gj.value - 277.8).abs() < 0.1);
        assert_eq!(gj.unit, "MWh");
    }

    #[test]
    fn water_conversions() {
        assert_eq!(standardize("5", "million m3", "").unwrap().value, 5_000_000.0);
        assert_eq!(standardize("2000", "liters", "").unwrap().value, 2.0);
        let gal = standardize("1000", "gallons", "").unwrap();
        assert!((gal.value - 3.785).abs() < 1e-9);
        assert_eq!(gal.confidence, 0.8);
    }

    #[test]
    fn monetary_passes_through_with_currency_annotation() {
        let eur = standardize("3,000,000", "EUR", "").unwrap();
        assert_eq!(eur.value, 3_000_000.0);
        assert_eq!(eur.unit, "EUR");
        assert_eq!(eur.family, UnitFamily::Monetary);
    }

    #[test]
    fn percentage_validation_and_clamping() {
        let ok = standardize("35", "%", "").unwrap();
        assert_eq!(ok.value, 35.0);
        assert_eq!(ok.confidence, 1.0);

        let clamped = standardize("300", "%", "").unwrap();
        assert_eq!(clamped.value, 100.0);
        assert_eq!(clamped.confidence, 0.5);

        assert!(standardize("1500", "%", "").is_none());
        assert!(standardize("-5", "%", "").is_none());
    }

    #[test]
    fn negative_emissions_are_rejected() {
        assert!(standardize("-100", "tCO2e", "").is_none());
    }

    #[test]
    fn counts_round_to_integers() {
        let out = standardize("1,234.6", "employees", "").unwrap();
        assert_eq!(out.value, 1235.0);
        assert_eq!(out.unit, "count");
    }

    #[test]
    fn unknown_unit_keeps_low_confidence() {
        let out = standardize("42", "widgets", "").unwrap();
        assert_eq!(out.confidence, 0.3);
        assert_eq!(out.family, UnitFamily::Unknown);
        assert_eq!(out.unit, "widgets");
    }

    #[test]
    fn context_inference_raises_confidence() {
        let out = standardize("1200", "units", "total carbon emissions of 1200 units").unwrap();
        assert_eq!(out.family, UnitFamily::Emissions);
        assert_eq!(out.unit, "tCO2e");
        assert_eq!(out.confidence, 0.6);
    }
}
