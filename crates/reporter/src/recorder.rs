use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, ObservableGauge};
use tracing::{info, warn};
use verdict_events::RunStats;
use verdict_telemetry::attributes::build_attributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Pass,
    Fail,
}

impl TestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

/// Accumulates counters and histograms from discrete test events, plus the
/// run summary gauge computed once at run end.
pub struct MetricSink {
    // Kept so the summary gauge can be created against the same scope at
    // run end.
    meter: Meter,
    test_total: Counter<u64>,
    test_results: Counter<u64>,
    test_duration: Histogram<u64>,
    run_summary: Option<ObservableGauge<u64>>,
}

impl MetricSink {
    pub fn new(meter: Meter) -> Self {
        info!("Initializing test run metrics");

        let test_total = meter
            .u64_counter("test.total")
            .with_description("Total number of tests run")
            .build();

        let test_results = meter
            .u64_counter("test.results")
            .with_description("Test results by status")
            .build();

        let test_duration = meter
            .u64_histogram("test.duration")
            .with_description("Test execution duration")
            .with_unit("ms")
            .build();

        MetricSink {
            meter,
            test_total,
            test_results,
            test_duration,
            run_summary: None,
        }
    }

    /// Increments the result counter tagged `{result, name, suite}`.
    pub fn record_test_outcome(&self, outcome: TestOutcome, test_name: &str, suite_name: &str) {
        let attributes = build_attributes(vec![
            ("result".to_string(), outcome.as_str().to_string()),
            ("name".to_string(), test_name.to_string()),
            ("suite".to_string(), suite_name.to_string()),
        ]);
        self.test_results.add(1, attributes.as_slice());
    }

    /// Records a test duration into the histogram tagged `{suite, test}`.
    pub fn record_test_duration(&self, duration_ms: u64, test_name: &str, suite_name: &str) {
        let attributes = build_attributes(vec![
            ("suite".to_string(), suite_name.to_string()),
            ("test".to_string(), test_name.to_string()),
        ]);
        self.test_duration.record(duration_ms, attributes.as_slice());
    }

    pub fn increment_test_total(&self) {
        self.test_total.add(1, &[]);
    }

    /// Registers the run summary gauge from the engine's own statistics
    /// snapshot. Must happen before the forced flush: the gauge is only
    /// evaluated during collection, so a late registration exports nothing.
    pub fn register_run_summary(&mut self, stats: RunStats) {
        if self.run_summary.is_some() {
            warn!("Run summary already registered, skipping");
            return;
        }

        let gauge = self
            .meter
            .u64_observable_gauge("test.summary")
            .with_description("Test suite summary metrics")
            .with_callback(move |observer| {
                observer.observe(stats.passes, &[KeyValue::new("metric", "passes")]);
                observer.observe(stats.failures, &[KeyValue::new("metric", "failures")]);
                observer.observe(stats.pending, &[KeyValue::new("metric", "pending")]);
                observer.observe(stats.duration_ms, &[KeyValue::new("metric", "duration_ms")]);
            })
            .build();

        self.run_summary = Some(gauge);
    }

    pub fn summary_registered(&self) -> bool {
        self.run_summary.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

    fn sink_with_exporter() -> (MetricSink, SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = provider.meter("recorder-test");
        (MetricSink::new(meter), provider, exporter)
    }

    fn exported_metric_names(exporter: &InMemoryMetricExporter) -> Vec<String> {
        let mut names = Vec::new();
        for resource_metrics in exporter.get_finished_metrics().unwrap() {
            for scope in resource_metrics.scope_metrics {
                for metric in scope.metrics {
                    names.push(metric.name.to_string());
                }
            }
        }
        names
    }

    #[test]
    fn instruments_are_exported_after_flush() {
        let (sink, provider, exporter) = sink_with_exporter();

        sink.record_test_outcome(TestOutcome::Pass, "T1", "S");
        sink.record_test_duration(5, "T1", "S");
        sink.increment_test_total();

        provider.force_flush().expect("flush");
        let names = exported_metric_names(&exporter);
        assert!(names.contains(&"test.results".to_string()));
        assert!(names.contains(&"test.duration".to_string()));
        assert!(names.contains(&"test.total".to_string()));
    }

    #[test]
    fn summary_gauge_only_registers_once() {
        let (mut sink, provider, exporter) = sink_with_exporter();
        assert!(!sink.summary_registered());

        let stats = RunStats {
            passes: 1,
            failures: 2,
            pending: 3,
            duration_ms: 4,
        };
        sink.register_run_summary(stats);
        assert!(sink.summary_registered());
        // Second registration must not create a duplicate instrument.
        sink.register_run_summary(stats);

        provider.force_flush().expect("flush");
        let summary_count = exported_metric_names(&exporter)
            .iter()
            .filter(|name| *name == "test.summary")
            .count();
        assert_eq!(summary_count, 1);
    }
}
