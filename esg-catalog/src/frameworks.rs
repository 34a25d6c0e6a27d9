//! Requirement definitions for the four supported reporting frameworks.
//!
//! Keywords are matched as lowercase substrings of the normalized text;
//! metric patterns capture (value, unit) pairs handed to the standardizer.

use esg_core::Framework;

use crate::catalog::CatalogRequirement;

const EMISSIONS_UNITS: &str =
    r"ktco2e|mtco2e|t\s?co2e?|kg\s?co2e?|(?:metric\s+)?ton(?:ne)?s?\s+(?:of\s+)?co2e?";
const ENERGY_UNITS: &str = r"mwh|gwh|twh|kwh|gj|tj";
const WATER_UNITS: &str =
    r"million\s+(?:m3|m³|cubic\s+met(?:er|re)s?)|m3|m³|cubic\s+met(?:er|re)s?|megalit(?:er|re)s?|lit(?:er|re)s?|gallons?";

fn qty(units: &str) -> String {
    format!(r"(?i)\b([0-9][0-9,.\s]*?)\s*({})\b", units)
}

fn percent_of(context: &str) -> String {
    format!(r"(?i){}\s*([0-9][0-9,.]*)\s*(%|percent)", context)
}

pub fn csrd_requirements() -> Vec<CatalogRequirement> {
    vec![
        CatalogRequirement::new(
            Framework::Csrd,
            "ESRS2-GOV",
            "general",
            "General disclosures on governance, strategy and materiality assessment",
            true,
            &[
                "sustainability governance",
                "due diligence",
                "materiality assessment",
                "board diversity",
                "sustainability statement",
            ],
        )
        .with_pattern(
            "board_diversity",
            r"(?i)board\s+diversity\s+(?:to|of|at|reached)\s+([0-9][0-9,.]*)\s*(%|percent)",
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "E1-1",
            "climate",
            "Transition plan for climate change mitigation",
            true,
            &[
                "transition plan",
                "climate change mitigation",
                "net zero",
                "decarbonisation",
                "carbon emissions",
            ],
        )
        .with_pattern(
            "emissions_reduction",
            r"(?i)reduc\w*\s+(?:carbon\s+|ghg\s+|co2\s+)?emissions?\s+(?:by\s+)?([0-9][0-9,.]*)\s*(%|percent)",
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "E1-5",
            "climate",
            "Energy consumption and mix",
            true,
            &[
                "energy consumption",
                "energy mix",
                "renewable energy",
                "energy intensity",
            ],
        )
        .with_pattern("energy_consumption", &qty(ENERGY_UNITS)),
        CatalogRequirement::new(
            Framework::Csrd,
            "E1-6",
            "climate",
            "Gross Scope 1, 2 and 3 greenhouse gas emissions",
            true,
            &[
                "scope 1",
                "scope 2",
                "scope 3",
                "greenhouse gas",
                "ghg emissions",
            ],
        )
        .with_pattern("ghg_emissions", &qty(EMISSIONS_UNITS)),
        CatalogRequirement::new(
            Framework::Csrd,
            "E1-9",
            "climate",
            "Anticipated financial effects from climate-related risks",
            true,
            &[
                "physical risk",
                "transition risk",
                "financial effects",
                "climate-related risk",
            ],
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "E2-4",
            "pollution",
            "Pollution of air, water and soil",
            true,
            &[
                "pollution",
                "air pollutants",
                "water pollutants",
                "emissions to air",
            ],
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "E3-4",
            "water",
            "Water consumption and withdrawal",
            true,
            &[
                "water consumption",
                "water withdrawal",
                "water discharge",
                "water stress",
            ],
        )
        .with_pattern("water_consumption", &qty(WATER_UNITS)),
        CatalogRequirement::new(
            Framework::Csrd,
            "E4-2",
            "biodiversity",
            "Policies related to biodiversity and ecosystems",
            true,
            &["biodiversity", "ecosystems", "habitat", "nature-related"],
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "E5-5",
            "circular_economy",
            "Resource outflows, waste and circular economy",
            true,
            &[
                "circular economy",
                "waste generated",
                "recycling",
                "resource outflows",
            ],
        )
        .with_pattern(
            "waste_recycled",
            &percent_of(r"recycl\w*\s+(?:rate\s+)?(?:of|at|to|reached)?"),
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "S1-6",
            "workforce",
            "Characteristics of the undertaking's own workforce",
            true,
            &[
                "own workforce",
                "employees",
                "headcount",
                "collective bargaining",
            ],
        )
        .with_pattern(
            "workforce_headcount",
            r"(?i)\b([0-9][0-9,.\s]*?)\s*(employees|workers|fte)\b",
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "S1-14",
            "workforce",
            "Health and safety metrics for the own workforce",
            true,
            &[
                "health and safety",
                "work-related injuries",
                "accident rate",
                "lost time injury",
                "fatalities",
            ],
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "S3-4",
            "communities",
            "Material impacts on affected communities",
            true,
            &[
                "affected communities",
                "local communities",
                "human rights",
                "community engagement",
            ],
        ),
        CatalogRequirement::new(
            Framework::Csrd,
            "G1-4",
            "conduct",
            "Incidents of corruption or bribery and business conduct",
            true,
            &[
                "anti-corruption",
                "anti-bribery",
                "corruption",
                "whistleblower",
                "business conduct",
            ],
        ),
    ]
}

pub fn gri_requirements() -> Vec<CatalogRequirement> {
    vec![
        CatalogRequirement::new(
            Framework::Gri,
            "GRI2-1",
            "general",
            "Organizational details and reporting basis",
            true,
            &[
                "organizational details",
                "reporting period",
                "legal form",
                "headquarters",
            ],
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI3-3",
            "general",
            "Management of material topics",
            true,
            &["material topics", "materiality", "management approach"],
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI302-1",
            "energy",
            "Energy consumption within the organization",
            false,
            &[
                "energy consumption",
                "fuel consumption",
                "electricity consumption",
                "energy sold",
            ],
        )
        .with_pattern("energy_consumption", &qty(ENERGY_UNITS)),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI303-5",
            "water",
            "Water consumption",
            false,
            &["water consumption", "water stress", "megaliters", "water use"],
        )
        .with_pattern("water_consumption", &qty(WATER_UNITS)),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI305-1",
            "emissions",
            "Direct (Scope 1) GHG emissions",
            false,
            &[
                "scope 1",
                "direct ghg emissions",
                "direct greenhouse gas",
                "co2 equivalent",
            ],
        )
        .with_pattern("scope_1_emissions", &qty(EMISSIONS_UNITS)),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI305-2",
            "emissions",
            "Energy indirect (Scope 2) GHG emissions",
            false,
            &[
                "scope 2",
                "indirect ghg emissions",
                "energy indirect",
                "market-based",
            ],
        )
        .with_pattern("scope_2_emissions", &qty(EMISSIONS_UNITS)),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI306-3",
            "waste",
            "Waste generated",
            false,
            &[
                "waste generated",
                "hazardous waste",
                "waste composition",
                "landfill",
            ],
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI401-1",
            "workforce",
            "New employee hires and employee turnover",
            false,
            &[
                "employee turnover",
                "new employee hires",
                "turnover rate",
                "new hires",
            ],
        )
        .with_pattern(
            "turnover_rate",
            &percent_of(r"turnover\s+(?:rate\s+)?(?:of|at|was)?"),
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI403-9",
            "safety",
            "Work-related injuries",
            false,
            &[
                "work-related injuries",
                "recordable injuries",
                "injury rate",
                "fatalities",
            ],
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI405-1",
            "diversity",
            "Diversity of governance bodies and employees",
            false,
            &[
                "board diversity",
                "gender diversity",
                "women",
                "diversity of governance bodies",
            ],
        )
        .with_pattern(
            "board_diversity",
            r"(?i)board\s+diversity\s+(?:to|of|at|reached)\s+([0-9][0-9,.]*)\s*(%|percent)",
        )
        .with_pattern(
            "women_workforce",
            r"(?i)([0-9][0-9,.]*)\s*(%|percent)\s+(?:of\s+)?women",
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI205-2",
            "ethics",
            "Communication and training about anti-corruption",
            false,
            &[
                "anti-corruption policies",
                "anti-corruption training",
                "corruption risks",
                "code of conduct training",
            ],
        ),
        CatalogRequirement::new(
            Framework::Gri,
            "GRI207-1",
            "tax",
            "Approach to tax",
            false,
            &["approach to tax", "tax strategy", "tax governance", "tax transparency"],
        ),
    ]
}

pub fn sasb_requirements() -> Vec<CatalogRequirement> {
    vec![
        CatalogRequirement::new(
            Framework::Sasb,
            "GHG-EMISSIONS",
            "emissions",
            "Gross global Scope 1 emissions and reduction targets",
            false,
            &[
                "gross global emissions",
                "scope 1",
                "emissions reduction targets",
                "carbon emissions",
            ],
        )
        .with_pattern("ghg_emissions", &qty(EMISSIONS_UNITS)),
        CatalogRequirement::new(
            Framework::Sasb,
            "AIR-QUALITY",
            "pollution",
            "Air quality and significant air emissions",
            false,
            &["air quality", "nox", "sox", "particulate matter"],
        ),
        CatalogRequirement::new(
            Framework::Sasb,
            "ENERGY-MGMT",
            "energy",
            "Energy management and grid reliance",
            false,
            &[
                "energy management",
                "grid electricity",
                "total energy consumed",
                "renewable energy",
            ],
        )
        .with_pattern("energy_consumption", &qty(ENERGY_UNITS))
        .with_pattern(
            "renewable_share",
            &percent_of(r"renewable\w*\s+(?:energy\s+|electricity\s+)?(?:share\s+|mix\s+)?(?:of|at|to|was)?"),
        ),
        CatalogRequirement::new(
            Framework::Sasb,
            "WATER-MGMT",
            "water",
            "Water management in regions of water stress",
            false,
            &[
                "water management",
                "water recycled",
                "water withdrawn",
                "water stress",
            ],
        )
        .with_pattern("water_consumption", &qty(WATER_UNITS))
        .critical_for(&["utilities", "mining", "agriculture", "beverages"]),
        CatalogRequirement::new(
            Framework::Sasb,
            "WASTE-MGMT",
            "waste",
            "Waste and hazardous materials management",
            false,
            &["waste management", "hazardous waste", "recycled", "landfilled"],
        ),
        CatalogRequirement::new(
            Framework::Sasb,
            "WORKFORCE-HS",
            "safety",
            "Workforce health and safety performance",
            false,
            &[
                "health and safety",
                "total recordable incident rate",
                "trir",
                "safety training",
            ],
        )
        .critical_for(&["manufacturing", "construction", "mining"]),
        CatalogRequirement::new(
            Framework::Sasb,
            "LABOR-PRACTICES",
            "workforce",
            "Labor practices and fair working conditions",
            false,
            &[
                "labor practices",
                "collective bargaining",
                "fair labor",
                "working hours",
            ],
        ),
        CatalogRequirement::new(
            Framework::Sasb,
            "DATA-SECURITY",
            "governance",
            "Data security and customer privacy",
            false,
            &["data security", "data breaches", "cybersecurity", "personal data"],
        )
        .critical_for(&["technology", "finance", "healthcare"]),
        CatalogRequirement::new(
            Framework::Sasb,
            "BUSINESS-ETHICS",
            "ethics",
            "Business ethics and competitive behavior",
            false,
            &[
                "business ethics",
                "anti-competitive",
                "fraud",
                "legal proceedings",
            ],
        ),
    ]
}

pub fn tcfd_requirements() -> Vec<CatalogRequirement> {
    vec![
        CatalogRequirement::new(
            Framework::Tcfd,
            "GOV-A",
            "governance",
            "Board oversight of climate-related risks and opportunities",
            true,
            &[
                "board oversight",
                "board's oversight",
                "climate-related risks",
                "board committee",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "GOV-B",
            "governance",
            "Management's role in assessing and managing climate-related risks",
            true,
            &[
                "management's role",
                "management role",
                "assessing and managing",
                "climate responsibilities",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "STRAT-A",
            "strategy",
            "Climate-related risks and opportunities over time horizons",
            true,
            &[
                "climate-related risks and opportunities",
                "short term",
                "medium term",
                "long term",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "STRAT-B",
            "strategy",
            "Impact of climate-related risks on businesses, strategy and planning",
            true,
            &[
                "impact on strategy",
                "business strategy",
                "financial planning",
                "products and services",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "STRAT-C",
            "strategy",
            "Resilience of the strategy under climate scenarios",
            true,
            &[
                "scenario analysis",
                "2 degree",
                "resilience of the strategy",
                "climate scenarios",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "RISK-A",
            "risk_management",
            "Processes for identifying and assessing climate-related risks",
            true,
            &[
                "processes for identifying",
                "risk identification",
                "assessing climate-related risks",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "RISK-B",
            "risk_management",
            "Processes for managing climate-related risks",
            true,
            &[
                "managing climate-related risks",
                "risk management processes",
                "risk mitigation",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "RISK-C",
            "risk_management",
            "Integration into overall risk management",
            true,
            &[
                "integrated into the organization",
                "overall risk management",
                "enterprise risk management",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "MET-A",
            "metrics_targets",
            "Metrics used to assess climate-related risks and opportunities",
            true,
            &[
                "metrics used",
                "climate-related metrics",
                "internal carbon price",
                "key metrics",
            ],
        ),
        CatalogRequirement::new(
            Framework::Tcfd,
            "MET-B",
            "metrics_targets",
            "Scope 1, Scope 2 and Scope 3 greenhouse gas emissions",
            true,
            &["scope 1", "scope 2", "scope 3", "ghg emissions"],
        )
        .with_pattern("ghg_emissions", &qty(EMISSIONS_UNITS)),
        CatalogRequirement::new(
            Framework::Tcfd,
            "MET-C",
            "metrics_targets",
            "Targets used to manage climate-related risks and performance",
            true,
            &[
                "emissions targets",
                "net zero target",
                "science based targets",
                "performance against targets",
            ],
        )
        .with_pattern(
            "emissions_reduction",
            r"(?i)reduc\w*\s+(?:carbon\s+|ghg\s+|co2\s+)?emissions?\s+(?:by\s+)?([0-9][0-9,.]*)\s*(%|percent)",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emissions_pattern_matches_common_phrasings() {
        let req = &csrd_requirements()[3];
        assert_eq!(req.id, "E1-6");
        let pattern = &req.metric_patterns[0];
        for text in [
            "emitted 1,200 tCO2e in 2023",
            "totalling 50000 tons of CO2",
            "approximately 3.5 MtCO2e",
            "12 kg CO2e per unit",
        ] {
            assert!(pattern.regex.is_match(text), "no match in: {}", text);
        }
    }

    #[test]
    fn emissions_reduction_pattern_extracts_value_and_unit() {
        let reqs = csrd_requirements();
        let e1_1 = reqs.iter().find(|r| r.id == "E1-1").unwrap();
        let caps = e1_1.metric_patterns[0]
            .regex
            .captures("We reduced carbon emissions by 35% this year")
            .unwrap();
        assert_eq!(&caps[1], "35");
        assert_eq!(&caps[2], "%");
    }

    #[test]
    fn board_diversity_pattern() {
        let reqs = csrd_requirements();
        let gov = reqs.iter().find(|r| r.id == "ESRS2-GOV").unwrap();
        let caps = gov.metric_patterns[0]
            .regex
            .captures("increased board diversity to 40% women")
            .unwrap();
        assert_eq!(&caps[1], "40");
        assert_eq!(&caps[2], "%");
    }

    #[test]
    fn water_pattern_prefers_million_cubic_meters() {
        let reqs = csrd_requirements();
        let water = reqs.iter().find(|r| r.id == "E3-4").unwrap();
        let caps = water.metric_patterns[0]
            .regex
            .captures("withdrew 5 million m3 of water")
            .unwrap();
        assert_eq!(&caps[1], "5");
        assert_eq!(caps[2].to_lowercase(), "million m3");
    }

    #[test]
    fn sasb_industry_critical_defaults() {
        let reqs = sasb_requirements();
        let water = reqs.iter().find(|r| r.id == "WATER-MGMT").unwrap();
        assert!(water.industry_critical.contains(&"mining".to_string()));
        let ethics = reqs.iter().find(|r| r.id == "BUSINESS-ETHICS").unwrap();
        assert!(ethics.industry_critical.is_empty());
    }
}
