use core::fmt;
use serde::Serialize;
use std::time::SystemTime;

/// A single test case as reported by the execution engine: its title plus
/// the title of the suite it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub title: String,
    pub suite: String,
}

impl TestCase {
    pub fn new(title: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            suite: suite.into(),
        }
    }
}

/// The statistics snapshot the engine attaches to its run-end event. This is
/// the source of truth for the run summary; local tallies are only used for
/// cross-checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub passes: u64,
    pub failures: u64,
    pub pending: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// Sent once when the engine starts executing the run.
    RunBegin,
    /// Sent once when the run finishes, with the engine's own statistics.
    RunEnd { stats: RunStats },
    /// Sent when a suite (possibly nested) starts.
    SuiteBegin { name: String },
    /// Sent when the innermost open suite ends.
    SuiteEnd { name: String },
    /// Sent when an individual test starts.
    TestBegin { test: TestCase },
    /// Sent when a test ends. Not guaranteed to fire: some engines skip it
    /// for failed tests, so consumers must be able to finalize a test from
    /// the pass/fail event alone.
    TestEnd { test: TestCase, duration_ms: u64 },
    /// Sent when a test passes.
    TestPass { test: TestCase, duration_ms: u64 },
    /// Sent when a test fails, with the failure message.
    TestFail {
        test: TestCase,
        duration_ms: u64,
        error: String,
    },
}

impl RunEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::TestFail { .. })
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunBegin => {
                write!(f, "Run started")
            }
            Self::RunEnd { stats } => {
                write!(
                    f,
                    "Run finished: {} passed, {} failed, {} pending in {}ms",
                    stats.passes, stats.failures, stats.pending, stats.duration_ms
                )
            }
            Self::SuiteBegin { name } => {
                write!(f, "Suite '{}' started", name)
            }
            Self::SuiteEnd { name } => {
                write!(f, "Suite '{}' ended", name)
            }
            Self::TestBegin { test } => {
                write!(f, "Test '{}' started in suite '{}'", test.title, test.suite)
            }
            Self::TestEnd { test, duration_ms } => {
                write!(f, "Test '{}' ended after {}ms", test.title, duration_ms)
            }
            Self::TestPass { test, duration_ms } => {
                write!(f, "Test '{}' passed after {}ms", test.title, duration_ms)
            }
            Self::TestFail {
                test,
                duration_ms,
                error,
            } => {
                write!(
                    f,
                    "Test '{}' failed after {}ms: {}",
                    test.title, duration_ms, error
                )
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventInfo {
    pub event: RunEvent,
    pub time: SystemTime,
    pub formatted_log: String,
}

impl EventInfo {
    pub fn is_error(&self) -> bool {
        self.event.is_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats_outcomes() {
        let test = TestCase::new("T1", "S");
        let pass = RunEvent::TestPass {
            test: test.clone(),
            duration_ms: 5,
        };
        assert_eq!(pass.to_string(), "Test 'T1' passed after 5ms");

        let fail = RunEvent::TestFail {
            test,
            duration_ms: 7,
            error: "boom".to_string(),
        };
        assert_eq!(fail.to_string(), "Test 'T1' failed after 7ms: boom");
        assert!(fail.is_error());
        assert!(!pass.is_error());
    }

    #[test]
    fn run_end_display_includes_stats() {
        let event = RunEvent::RunEnd {
            stats: RunStats {
                passes: 1,
                failures: 0,
                pending: 2,
                duration_ms: 5,
            },
        };
        assert_eq!(
            event.to_string(),
            "Run finished: 1 passed, 0 failed, 2 pending in 5ms"
        );
    }
}
