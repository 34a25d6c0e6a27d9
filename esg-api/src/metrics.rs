//! Prometheus instrumentation with the platform's stable metric names.

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use esg_core::{EsgError, EsgResult};

pub struct ApiMetrics {
    registry: Registry,
    pub api_requests_total: IntCounterVec,
    pub api_request_duration_seconds: HistogramVec,
    pub analysis_by_framework_total: IntCounterVec,
    pub metrics_extracted_count: Histogram,
    pub cache_operations_total: IntCounterVec,
    pub credit_debits_total: IntCounterVec,
    pub rate_limit_hits_total: IntCounterVec,
}

fn registration(err: prometheus::Error) -> EsgError {
    EsgError::Internal {
        message: format!("metric registration failed: {}", err),
    }
}

impl ApiMetrics {
    pub fn new() -> EsgResult<Self> {
        let registry = Registry::new();

        let api_requests_total = IntCounterVec::new(
            Opts::new("api_requests_total", "API requests by endpoint and status"),
            &["endpoint", "status"],
        )
        .map_err(registration)?;
        let api_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "API request latency by endpoint",
            ),
            &["endpoint"],
        )
        .map_err(registration)?;
        let analysis_by_framework_total = IntCounterVec::new(
            Opts::new(
                "analysis_by_framework_total",
                "Analyses evaluated per framework and tier",
            ),
            &["framework", "tier"],
        )
        .map_err(registration)?;
        let metrics_extracted_count = Histogram::with_opts(
            HistogramOpts::new(
                "metrics_extracted_count",
                "Extracted metrics per analysis",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
        )
        .map_err(registration)?;
        let cache_operations_total = IntCounterVec::new(
            Opts::new("cache_operations_total", "Cache operations by outcome"),
            &["op", "outcome"],
        )
        .map_err(registration)?;
        let credit_debits_total = IntCounterVec::new(
            Opts::new("credit_debits_total", "Credit debit attempts by outcome"),
            &["outcome"],
        )
        .map_err(registration)?;
        let rate_limit_hits_total = IntCounterVec::new(
            Opts::new("rate_limit_hits_total", "Rate limit rejections"),
            &["endpoint", "tier"],
        )
        .map_err(registration)?;

        registry
            .register(Box::new(api_requests_total.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(api_request_duration_seconds.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(analysis_by_framework_total.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(metrics_extracted_count.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(cache_operations_total.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(credit_debits_total.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(rate_limit_hits_total.clone()))
            .map_err(registration)?;

        Ok(Self {
            registry,
            api_requests_total,
            api_request_duration_seconds,
            analysis_by_framework_total,
            metrics_extracted_count,
            cache_operations_total,
            credit_debits_total,
            rate_limit_hits_total,
        })
    }

    /// Text exposition of every registered collector.
    pub fn render(&self) -> EsgResult<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| EsgError::Internal {
                message: format!("metric encoding failed: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_the_exposition() {
        let metrics = ApiMetrics::new().unwrap();
        metrics
            .api_requests_total
            .with_label_values(&["/analyze", "200"])
            .inc();
        metrics.metrics_extracted_count.observe(3.0);
        metrics
            .rate_limit_hits_total
            .with_label_values(&["analyze", "free"])
            .inc();

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("api_requests_total"));
        assert!(rendered.contains("metrics_extracted_count"));
        assert!(rendered.contains("rate_limit_hits_total"));
        assert!(rendered.contains("endpoint=\"/analyze\""));
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = ApiMetrics::new().unwrap();
        let b = ApiMetrics::new().unwrap();
        a.api_requests_total.with_label_values(&["/health", "200"]).inc();
        assert!(!b.render().unwrap().contains("endpoint=\"/health\""));
    }
}
