use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanBuilder, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use verdict_events::TestCase;

/// Sequencing violations in the event stream. These are reported by the
/// caller and the offending event is skipped; the run itself continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("run-begin while a run is already active")]
    RunAlreadyActive,
    #[error("run-end before run-begin")]
    RunNotActive,
    #[error("{kind}-begin for '{name}' before run-begin")]
    BeginBeforeRun { kind: &'static str, name: String },
    #[error("suite-end for '{name}' without a matching suite-begin")]
    MismatchedSuiteEnd { name: String },
    #[error("close for test '{title}' does not match the active span")]
    TestNotActive { title: String },
    #[error("run-end with {count} unclosed child span(s)")]
    UnclosedFrames { count: usize },
}

/// How a test span is being closed.
#[derive(Debug, Clone)]
pub enum TestClose {
    Passed { duration_ms: u64 },
    Failed { duration_ms: u64, error: String },
    /// End-event for a test that never received a verdict.
    Ended { duration_ms: u64 },
}

/// Whether a close actually ended a span. `AlreadyClosed` is the benign
/// case where the pass/fail event closed the span and the (optional)
/// end-event arrives afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestClosed {
    Closed,
    AlreadyClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Run,
    Suite,
    Test,
}

impl FrameKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Suite => "suite",
            Self::Test => "test",
        }
    }
}

/// One open span. The context owns the span; the parent is whatever sits
/// below this frame on the stack, never an owning reference.
struct SpanFrame {
    name: String,
    kind: FrameKind,
    cx: Context,
    started_at: SystemTime,
}

/// Maintains the span stack implied by nested suite/test boundaries and
/// opens/closes spans in proper nesting order.
pub struct SpanCorrelator {
    tracer: BoxedTracer,
    stack: Vec<SpanFrame>,
    /// Tests whose span is still open, by title. Removed when the span is
    /// closed, so a decoupled end-event cannot close twice.
    open_tests: HashMap<String, ()>,
}

impl SpanCorrelator {
    pub fn new(tracer: BoxedTracer) -> Self {
        Self {
            tracer,
            stack: Vec::new(),
            open_tests: HashMap::new(),
        }
    }

    /// Current nesting depth: suite depth, +1 while a test is active.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn open_frame(&mut self, name: String, kind: FrameKind, builder: SpanBuilder) {
        let parent_cx = self
            .stack
            .last()
            .map_or_else(Context::new, |frame| frame.cx.clone());
        let span = self.tracer.build_with_context(builder, &parent_cx);
        self.stack.push(SpanFrame {
            name,
            kind,
            cx: parent_cx.with_span(span),
            started_at: SystemTime::now(),
        });
    }

    pub fn on_run_begin(&mut self) -> Result<(), CorrelationError> {
        if !self.stack.is_empty() {
            return Err(CorrelationError::RunAlreadyActive);
        }
        let builder = SpanBuilder::from_name("run")
            .with_attributes(vec![KeyValue::new("test.type", FrameKind::Run.as_str())]);
        self.open_frame("run".to_string(), FrameKind::Run, builder);
        Ok(())
    }

    pub fn on_suite_begin(&mut self, name: &str) -> Result<(), CorrelationError> {
        if self.stack.is_empty() {
            return Err(CorrelationError::BeginBeforeRun {
                kind: "suite",
                name: name.to_string(),
            });
        }
        let builder = SpanBuilder::from_name(format!("suite: {}", name)).with_attributes(vec![
            KeyValue::new("test.type", FrameKind::Suite.as_str()),
            KeyValue::new("test.suite", name.to_string()),
        ]);
        self.open_frame(name.to_string(), FrameKind::Suite, builder);
        Ok(())
    }

    pub fn on_suite_end(&mut self, name: &str) -> Result<(), CorrelationError> {
        // Peek before popping: a mismatched end must not disturb the stack.
        match self.stack.last() {
            Some(frame) if frame.kind == FrameKind::Suite => {}
            _ => {
                return Err(CorrelationError::MismatchedSuiteEnd {
                    name: name.to_string(),
                });
            }
        }
        let frame = self.stack.pop().expect("peeked above");
        frame.cx.span().end();
        if let Ok(elapsed) = frame.started_at.elapsed() {
            debug!("Suite '{}' span closed after {:?}", frame.name, elapsed);
        }
        Ok(())
    }

    pub fn on_test_begin(&mut self, test: &TestCase) -> Result<(), CorrelationError> {
        if self.stack.is_empty() {
            return Err(CorrelationError::BeginBeforeRun {
                kind: "test",
                name: test.title.clone(),
            });
        }
        let builder = SpanBuilder::from_name(format!("test: {}", test.title)).with_attributes(vec![
            KeyValue::new("test.type", FrameKind::Test.as_str()),
            KeyValue::new("test.case", test.title.clone()),
            KeyValue::new("test.suite", test.suite.clone()),
        ]);
        self.open_frame(test.title.clone(), FrameKind::Test, builder);
        self.open_tests.insert(test.title.clone(), ());
        Ok(())
    }

    /// Closes the span for `title`. The upstream engine does not guarantee
    /// an end-event for every test, so the span is closed at pass/fail time
    /// and a later end-event becomes a no-op.
    pub fn close_test(
        &mut self,
        title: &str,
        close: TestClose,
    ) -> Result<TestClosed, CorrelationError> {
        if !self.open_tests.contains_key(title) {
            return Ok(TestClosed::AlreadyClosed);
        }

        // Validate before consuming the record: a rejected close must leave
        // the test closable by a later event.
        match self.stack.last() {
            Some(frame) if frame.kind == FrameKind::Test && frame.name == title => {}
            _ => {
                return Err(CorrelationError::TestNotActive {
                    title: title.to_string(),
                });
            }
        }
        self.open_tests.remove(title);

        let frame = self.stack.pop().expect("peeked above");
        let span = frame.cx.span();
        let (outcome, duration_ms) = match close {
            TestClose::Passed { duration_ms } => {
                span.set_status(Status::Ok);
                ("pass", duration_ms)
            }
            TestClose::Failed { duration_ms, error } => {
                span.add_event(
                    "exception",
                    vec![KeyValue::new("exception.message", error.clone())],
                );
                span.set_status(Status::error(error));
                ("fail", duration_ms)
            }
            TestClose::Ended { duration_ms } => ("ended", duration_ms),
        };
        span.set_attribute(KeyValue::new("test.outcome", outcome));
        span.set_attribute(KeyValue::new("test.duration_ms", duration_ms as i64));
        span.end();
        Ok(TestClosed::Closed)
    }

    /// Ends the root span and clears the stack. Any child frame still open
    /// at this point is a caller contract violation: the spans are ended so
    /// they are not leaked, and the violation is returned for loud
    /// reporting.
    pub fn on_run_end(&mut self) -> Result<(), CorrelationError> {
        if self.stack.is_empty() {
            return Err(CorrelationError::RunNotActive);
        }

        let dangling = self.stack.len() - 1;
        while self.stack.len() > 1 {
            let frame = self.stack.pop().expect("len checked");
            debug!(
                "Ending dangling {} span '{}' at run end",
                frame.kind.as_str(),
                frame.name
            );
            frame.cx.span().end();
        }

        let root = self.stack.pop().expect("root frame");
        root.cx.span().end();
        if let Ok(elapsed) = root.started_at.elapsed() {
            debug!("Run span closed after {:?}", elapsed);
        }
        self.open_tests.clear();

        if dangling > 0 {
            return Err(CorrelationError::UnclosedFrames { count: dangling });
        }
        Ok(())
    }
}
