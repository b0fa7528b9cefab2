use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub allowed: &'static str,
    pub patched: &'static str,
}

pub struct InjectorMetrics {
    pub admission_requests_total: Family<RequestLabels, Counter>,
    pub admission_responses_total: Family<ResponseLabels, Counter>,
    pub admission_request_duration_seconds: Histogram,
    /// Number of JSON Patch operations per admission response; zero when no
    /// patch was sent.
    pub patch_operations: Histogram,
}

const DURATION_BUCKETS: [f64; 14] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const PATCH_OPERATION_BUCKETS: [f64; 3] = [0.0, 1.0, 2.0];

impl InjectorMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let admission_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "injector_admission_requests",
            "Total number of admission requests received, by transport outcome",
            admission_requests_total.clone(),
        );

        let admission_responses_total = Family::<ResponseLabels, Counter>::default();
        registry.register(
            "injector_admission_responses",
            "Total number of admission responses sent",
            admission_responses_total.clone(),
        );

        let admission_request_duration_seconds = Histogram::new(DURATION_BUCKETS.iter().copied());
        registry.register(
            "injector_admission_request_duration_seconds",
            "Duration of admission request processing in seconds",
            admission_request_duration_seconds.clone(),
        );

        let patch_operations = Histogram::new(PATCH_OPERATION_BUCKETS.iter().copied());
        registry.register(
            "injector_patch_operations",
            "Number of JSON Patch operations returned per admission response",
            patch_operations.clone(),
        );

        Self {
            admission_requests_total,
            admission_responses_total,
            admission_request_duration_seconds,
            patch_operations,
        }
    }

    pub fn record_request(&self, outcome: &'static str) {
        self.admission_requests_total
            .get_or_create(&RequestLabels { outcome })
            .inc();
    }

    pub fn record_response(&self, allowed: bool, patched: bool) {
        self.admission_responses_total
            .get_or_create(&ResponseLabels {
                allowed: if allowed { "true" } else { "false" },
                patched: if patched { "true" } else { "false" },
            })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_recorded_series_are_exported() {
        let mut registry = Registry::default();
        let metrics = InjectorMetrics::new(&mut registry);
        metrics.record_request("ok");
        metrics.record_response(true, true);
        metrics.admission_request_duration_seconds.observe(0.002);
        metrics.patch_operations.observe(2.0);
        metrics.patch_operations.observe(0.0);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();
        assert!(out.contains(r#"injector_admission_requests_total{outcome="ok"} 1"#));
        assert!(out.contains(r#"injector_admission_responses_total{allowed="true",patched="true"} 1"#));
        assert!(out.contains("injector_admission_request_duration_seconds_count 1"));
        assert!(out.contains("injector_patch_operations_count 2"));
        assert!(out.contains("injector_patch_operations_sum 2.0"));
    }
}
