use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use esg_core::Framework;

pub const CATALOG_VERSION: &str = "2024.1";

/// A metric extraction hint attached to a requirement. The pattern captures
/// exactly two groups: the numeric token and the unit token.
#[derive(Debug, Clone)]
pub struct MetricPattern {
    pub metric_name: String,
    pub source: String,
    pub regex: Regex,
}

impl MetricPattern {
    pub fn new(metric_name: &str, source: &str) -> Self {
        // Static catalog data: a malformed pattern is fatal at startup.
        let regex = Regex::new(source).unwrap();
        Self {
            metric_name: metric_name.to_string(),
            source: source.to_string(),
            regex,
        }
    }
}

/// One disclosure requirement of a reporting framework.
#[derive(Debug, Clone)]
pub struct CatalogRequirement {
    pub framework: Framework,
    pub id: String,
    pub category: String,
    pub description: String,
    pub mandatory: bool,
    /// Lowercased phrases; any substring match counts.
    pub keywords: Vec<String>,
    pub metric_patterns: Vec<MetricPattern>,
    /// Sector slugs for which an unmet optional requirement escalates to high.
    pub industry_critical: Vec<String>,
}

impl CatalogRequirement {
    pub fn new(
        framework: Framework,
        id: &str,
        category: &str,
        description: &str,
        mandatory: bool,
        keywords: &[&str],
    ) -> Self {
        Self {
            framework,
            id: id.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            mandatory,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            metric_patterns: Vec::new(),
            industry_critical: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, metric_name: &str, source: &str) -> Self {
        self.metric_patterns.push(MetricPattern::new(metric_name, source));
        self
    }

    pub fn critical_for(mut self, sectors: &[&str]) -> Self {
        self.industry_critical = sectors.iter().map(|s| s.to_lowercase()).collect();
        self
    }

    pub fn key(&self) -> (Framework, String) {
        (self.framework, self.id.clone())
    }
}

/// Per-framework summary for the catalog endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSummary {
    pub name: String,
    pub total: u32,
    pub mandatory: u32,
    pub categories: Vec<String>,
}

/// Read-only requirement registry, loaded once per process. Reloads require
/// a restart.
#[derive(Debug)]
pub struct Catalog {
    version: String,
    requirements: Vec<CatalogRequirement>,
    by_key: HashMap<(Framework, String), usize>,
    by_framework: HashMap<Framework, Vec<usize>>,
}

static GLOBAL: Lazy<Catalog> = Lazy::new(Catalog::standard);

impl Catalog {
    pub fn standard() -> Self {
        let mut requirements = Vec::new();
        requirements.extend(crate::frameworks::csrd_requirements());
        requirements.extend(crate::frameworks::gri_requirements());
        requirements.extend(crate::frameworks::sasb_requirements());
        requirements.extend(crate::frameworks::tcfd_requirements());
        Self::from_requirements(CATALOG_VERSION, requirements)
    }

    pub fn from_requirements(version: &str, requirements: Vec<CatalogRequirement>) -> Self {
        let mut by_key = HashMap::new();
        let mut by_framework: HashMap<Framework, Vec<usize>> = HashMap::new();
        for (idx, req) in requirements.iter().enumerate() {
            by_key.insert(req.key(), idx);
            by_framework.entry(req.framework).or_default().push(idx);
        }
        Self {
            version: version.to_string(),
            requirements,
            by_key,
            by_framework,
        }
    }

    /// Process-wide shared instance.
    pub fn global() -> &'static Catalog {
        &GLOBAL
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn list_frameworks(&self) -> Vec<Framework> {
        Framework::ALL
            .iter()
            .copied()
            .filter(|fw| self.by_framework.contains_key(fw))
            .collect()
    }

    pub fn requirements(&self, framework: Framework) -> Vec<&CatalogRequirement> {
        self.by_framework
            .get(&framework)
            .map(|indexes| indexes.iter().map(|&i| &self.requirements[i]).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, framework: Framework, id: &str) -> Option<&CatalogRequirement> {
        self.by_key
            .get(&(framework, id.to_string()))
            .map(|&i| &self.requirements[i])
    }

    pub fn all(&self) -> &[CatalogRequirement] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn summary(&self) -> Vec<FrameworkSummary> {
        self.list_frameworks()
            .into_iter()
            .map(|fw| {
                let reqs = self.requirements(fw);
                let mut categories: Vec<String> =
                    reqs.iter().map(|r| r.category.clone()).collect();
                categories.sort();
                categories.dedup();
                FrameworkSummary {
                    name: fw.as_str().to_string(),
                    total: reqs.len() as u32,
                    mandatory: reqs.iter().filter(|r| r.mandatory).count() as u32,
                    categories,
                }
            })
            .collect()
    }
}

/// Categories whose unmet mandatory requirements are critical gaps.
pub fn is_critical_category(framework: Framework, category: &str) -> bool {
    matches!(
        (framework, category),
        (Framework::Csrd, "climate") | (Framework::Tcfd, "metrics_targets")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_population() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.requirements(Framework::Csrd).len(), 13);
        assert_eq!(catalog.requirements(Framework::Gri).len(), 12);
        assert_eq!(catalog.requirements(Framework::Sasb).len(), 9);
        assert_eq!(catalog.requirements(Framework::Tcfd).len(), 11);
        assert_eq!(catalog.len(), 45);
    }

    #[test]
    fn mandatory_flags_per_framework() {
        let catalog = Catalog::standard();
        assert!(catalog.requirements(Framework::Csrd).iter().all(|r| r.mandatory));
        assert!(catalog.requirements(Framework::Tcfd).iter().all(|r| r.mandatory));
        assert!(catalog.requirements(Framework::Sasb).iter().all(|r| !r.mandatory));
        let gri_mandatory = catalog
            .requirements(Framework::Gri)
            .iter()
            .filter(|r| r.mandatory)
            .count();
        assert_eq!(gri_mandatory, 2);
    }

    #[test]
    fn every_requirement_has_at_least_three_keywords() {
        for req in Catalog::standard().all() {
            assert!(
                req.keywords.len() >= 3,
                "{}/{} has {} keywords",
                req.framework,
                req.id,
                req.keywords.len()
            );
            assert!(req.keywords.iter().all(|k| *k == k.to_lowercase()));
        }
    }

    #[test]
    fn metric_patterns_capture_value_and_unit() {
        for req in Catalog::standard().all() {
            for pattern in &req.metric_patterns {
                assert_eq!(
                    pattern.regex.captures_len(),
                    3,
                    "{}/{} pattern {} must capture exactly (value, unit)",
                    req.framework,
                    req.id,
                    pattern.metric_name
                );
            }
        }
    }

    #[test]
    fn lookup_by_framework_and_id() {
        let catalog = Catalog::standard();
        let req = catalog.get(Framework::Csrd, "E1-6").unwrap();
        assert_eq!(req.category, "climate");
        assert!(catalog.get(Framework::Csrd, "NOPE").is_none());
        assert!(catalog.get(Framework::Gri, "E1-6").is_none());
    }

    #[test]
    fn catalog_queries_are_idempotent() {
        let catalog = Catalog::standard();
        let first: Vec<String> = catalog
            .requirements(Framework::Tcfd)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        let second: Vec<String> = catalog
            .requirements(Framework::Tcfd)
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(first, second);

        let summary = serde_json::to_string(&catalog.summary()).unwrap();
        assert_eq!(summary, serde_json::to_string(&catalog.summary()).unwrap());
    }

    #[test]
    fn critical_categories() {
        assert!(is_critical_category(Framework::Csrd, "climate"));
        assert!(is_critical_category(Framework::Tcfd, "metrics_targets"));
        assert!(!is_critical_category(Framework::Gri, "climate"));
        assert!(!is_critical_category(Framework::Csrd, "water"));
    }

    #[test]
    fn global_instance_is_shared() {
        let a = Catalog::global() as *const Catalog;
        let b = Catalog::global() as *const Catalog;
        assert_eq!(a, b);
        assert_eq!(Catalog::global().version(), CATALOG_VERSION);
    }
}
