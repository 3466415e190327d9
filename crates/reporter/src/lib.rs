//! # Verdict Reporter
//!
//! Correlates the lifecycle events of a hierarchical test-execution engine
//! (run, suite, test, interleaved verdicts) into a tree of OpenTelemetry
//! spans and a set of aggregated metrics, and guarantees that everything is
//! flushed before the host process exits.
//!
//! The reporter is purely reactive: the engine delivers events serially,
//! the [`RunSequencer`] dispatches them to the [`SpanCorrelator`] and
//! [`MetricSink`], and at run end it drives the strict flush-then-shutdown
//! sequence through the injected
//! [`TelemetryControl`](verdict_telemetry::TelemetryControl) adapter.
//! Telemetry is best-effort throughout: no fault on this path ever changes
//! a test result.

mod correlator;
mod recorder;
mod sequencer;

pub use correlator::{CorrelationError, SpanCorrelator, TestClose, TestClosed};
pub use recorder::{MetricSink, TestOutcome};
pub use sequencer::{RunSequencer, RunState};
