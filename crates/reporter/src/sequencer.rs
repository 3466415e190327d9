use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use verdict_events::{EventSubscriber, RunEvent, RunStats, TestCase};
use verdict_telemetry::TelemetryControl;

use crate::correlator::{SpanCorrelator, TestClose, TestClosed};
use crate::recorder::{MetricSink, TestOutcome};

/// Lifecycle of one reporting session. Single forward path, no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Flushing,
    ShutDown,
}

/// Per-run bookkeeping. The tallies are local cross-checks only; the
/// summary gauge always reports the engine's own snapshot.
struct RunContext {
    started_at: SystemTime,
    passes: u64,
    failures: u64,
}

/// Drives the correlator and recorder from the engine's event stream and
/// owns the shutdown/flush sequence. Telemetry faults never alter the run:
/// every failure on this path is logged and swallowed.
pub struct RunSequencer {
    state: RunState,
    ctx: Option<RunContext>,
    correlator: SpanCorrelator,
    sink: MetricSink,
    providers: Arc<dyn TelemetryControl>,
}

impl RunSequencer {
    pub fn new(providers: Arc<dyn TelemetryControl>) -> Self {
        Self {
            state: RunState::Idle,
            ctx: None,
            correlator: SpanCorrelator::new(providers.tracer()),
            sink: MetricSink::new(providers.meter()),
            providers,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Dispatches one lifecycle event. Events are delivered serially by the
    /// engine; anything arriving in the wrong state is a sequencing
    /// violation, logged and skipped.
    pub async fn handle_event(&mut self, event: RunEvent) {
        match (self.state, event) {
            (RunState::Idle, RunEvent::RunBegin) => {
                info!("Run started");
                self.ctx = Some(RunContext {
                    started_at: SystemTime::now(),
                    passes: 0,
                    failures: 0,
                });
                if let Err(e) = self.correlator.on_run_begin() {
                    warn!("Sequencing violation: {}, skipping", e);
                }
                self.state = RunState::Running;
            }
            (RunState::Running, RunEvent::SuiteBegin { name }) => {
                if let Err(e) = self.correlator.on_suite_begin(&name) {
                    warn!("Sequencing violation: {}, skipping", e);
                }
            }
            (RunState::Running, RunEvent::SuiteEnd { name }) => {
                if let Err(e) = self.correlator.on_suite_end(&name) {
                    warn!("Sequencing violation: {}, skipping", e);
                }
            }
            (RunState::Running, RunEvent::TestBegin { test }) => {
                if let Err(e) = self.correlator.on_test_begin(&test) {
                    warn!("Sequencing violation: {}, skipping", e);
                }
            }
            (RunState::Running, RunEvent::TestPass { test, duration_ms }) => {
                self.on_verdict(&test, TestOutcome::Pass, duration_ms, None);
            }
            (
                RunState::Running,
                RunEvent::TestFail {
                    test,
                    duration_ms,
                    error,
                },
            ) => {
                self.on_verdict(&test, TestOutcome::Fail, duration_ms, Some(error));
            }
            (RunState::Running, RunEvent::TestEnd { test, duration_ms }) => {
                // The verdict event usually closed the span already; this
                // only matters for tests that ended without one.
                match self.correlator.close_test(&test.title, TestClose::Ended { duration_ms }) {
                    Ok(TestClosed::Closed) => {
                        debug!("Test '{}' closed by end-event without a verdict", test.title);
                    }
                    Ok(TestClosed::AlreadyClosed) => {}
                    Err(e) => warn!("Sequencing violation: {}, skipping", e),
                }
            }
            (RunState::Running, RunEvent::RunEnd { stats }) => {
                self.finish_run(stats).await;
            }
            (RunState::ShutDown, event) => {
                debug!("Event after shutdown, skipping: {}", event);
            }
            (state, event) => {
                warn!(
                    "Sequencing violation: '{}' received in {:?} state, skipping",
                    event, state
                );
            }
        }
    }

    /// Subscribes to the engine's event stream and dispatches until the run
    /// shuts down or the channel closes.
    pub async fn run(mut self, mut events: EventSubscriber) -> Self {
        info!("Reporter listening for run events");
        loop {
            match events.recv().await {
                Ok(event_info) => {
                    self.handle_event(event_info.event).await;
                    if self.state == RunState::ShutDown {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Reporter lagged behind event stream, {} events lost", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Event channel closed, stopping reporter");
                    break;
                }
            }
        }
        self
    }

    /// A pass/fail verdict finalizes both metrics and the span. The
    /// end-event is not guaranteed to follow, so everything the test needs
    /// is recorded here.
    fn on_verdict(
        &mut self,
        test: &TestCase,
        outcome: TestOutcome,
        duration_ms: u64,
        error: Option<String>,
    ) {
        if let Some(ctx) = self.ctx.as_mut() {
            match outcome {
                TestOutcome::Pass => ctx.passes += 1,
                TestOutcome::Fail => ctx.failures += 1,
            }
        }

        self.sink.record_test_outcome(outcome, &test.title, &test.suite);
        self.sink.record_test_duration(duration_ms, &test.title, &test.suite);
        self.sink.increment_test_total();

        let close = match outcome {
            TestOutcome::Pass => TestClose::Passed { duration_ms },
            TestOutcome::Fail => TestClose::Failed {
                duration_ms,
                error: error.unwrap_or_default(),
            },
        };
        if let Err(e) = self.correlator.close_test(&test.title, close) {
            warn!("Sequencing violation: {}, skipping", e);
        }
    }

    /// The shutdown sequence. Order matters: a gauge registered after the
    /// flush, or a root span ended after the tracer shutdown, would be
    /// dropped by the one-shot exporters.
    async fn finish_run(&mut self, stats: RunStats) {
        self.state = RunState::Flushing;

        if let Some(ctx) = &self.ctx {
            if ctx.passes != stats.passes || ctx.failures != stats.failures {
                warn!(
                    "Engine snapshot ({} passed, {} failed) diverges from observed events \
                     ({} passed, {} failed); reporting the snapshot",
                    stats.passes, stats.failures, ctx.passes, ctx.failures
                );
            }
            if let Ok(elapsed) = ctx.started_at.elapsed() {
                info!(
                    "Run finished in {:?}: {} passed, {} failed, {} pending",
                    elapsed, stats.passes, stats.failures, stats.pending
                );
            }
        }

        self.sink.register_run_summary(stats);

        if let Err(e) = self.correlator.on_run_end() {
            error!("Sequencing violation at run end: {}", e);
        }

        if let Err(e) = self.providers.force_flush() {
            error!("Failed to flush metrics pipeline: {}", e);
        }

        if let Err(e) = self.providers.shutdown_traces() {
            error!("Failed to shut down tracer provider: {}", e);
        }

        match self.providers.shutdown().await {
            Ok(()) => info!("Telemetry shut down successfully"),
            Err(e) => error!("Telemetry shut down failed: {}", e),
        }

        self.ctx = None;
        self.state = RunState::ShutDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opentelemetry::global::BoxedTracer;
    use opentelemetry::metrics::{Meter, MeterProvider as _};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use parking_lot::Mutex;
    use verdict_telemetry::TelemetryError;

    /// Fake provider adapter that records the order of lifecycle calls.
    struct RecordingControl {
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingControl {
        fn new() -> Self {
            let tracer_provider = SdkTracerProvider::builder()
                .with_simple_exporter(InMemorySpanExporter::default())
                .build();
            let reader = PeriodicReader::builder(InMemoryMetricExporter::default()).build();
            let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
            Self {
                tracer_provider,
                meter_provider,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TelemetryControl for RecordingControl {
        fn tracer(&self) -> BoxedTracer {
            BoxedTracer::new(Box::new(self.tracer_provider.tracer("sequencer-test")))
        }

        fn meter(&self) -> Meter {
            self.meter_provider.meter("sequencer-test")
        }

        fn force_flush(&self) -> Result<(), TelemetryError> {
            self.calls.lock().push("force_flush");
            Ok(())
        }

        fn shutdown_traces(&self) -> Result<(), TelemetryError> {
            self.calls.lock().push("shutdown_traces");
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), TelemetryError> {
            self.calls.lock().push("shutdown");
            Ok(())
        }
    }

    fn stats(passes: u64, failures: u64) -> RunStats {
        RunStats {
            passes,
            failures,
            pending: 0,
            duration_ms: 5,
        }
    }

    #[tokio::test]
    async fn flush_precedes_tracer_and_full_shutdown() {
        let control = Arc::new(RecordingControl::new());
        let mut sequencer = RunSequencer::new(control.clone());

        sequencer.handle_event(RunEvent::RunBegin).await;
        sequencer
            .handle_event(RunEvent::RunEnd { stats: stats(0, 0) })
            .await;

        assert_eq!(sequencer.state(), RunState::ShutDown);
        assert_eq!(
            control.calls(),
            vec!["force_flush", "shutdown_traces", "shutdown"]
        );
    }

    #[tokio::test]
    async fn duplicate_run_end_does_not_reflush() {
        let control = Arc::new(RecordingControl::new());
        let mut sequencer = RunSequencer::new(control.clone());

        sequencer.handle_event(RunEvent::RunBegin).await;
        sequencer
            .handle_event(RunEvent::RunEnd { stats: stats(0, 0) })
            .await;
        sequencer
            .handle_event(RunEvent::RunEnd { stats: stats(0, 0) })
            .await;

        assert_eq!(
            control.calls(),
            vec!["force_flush", "shutdown_traces", "shutdown"],
            "second run-end must not re-run the shutdown sequence"
        );
    }

    #[tokio::test]
    async fn events_before_run_begin_are_skipped() {
        let control = Arc::new(RecordingControl::new());
        let mut sequencer = RunSequencer::new(control);

        sequencer
            .handle_event(RunEvent::SuiteBegin {
                name: "S".to_string(),
            })
            .await;
        assert_eq!(sequencer.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn mismatched_suite_end_keeps_running() {
        let control = Arc::new(RecordingControl::new());
        let mut sequencer = RunSequencer::new(control);

        sequencer.handle_event(RunEvent::RunBegin).await;
        sequencer
            .handle_event(RunEvent::SuiteEnd {
                name: "S".to_string(),
            })
            .await;
        assert_eq!(sequencer.state(), RunState::Running);
    }
}
