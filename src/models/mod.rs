//! Result models
//!
//! Node execution results, per-level totals, and the run summary hosts
//! map to exit codes.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Terminal status of an executed node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Successful,
    Failed,
    Aborted,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Successful => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Aborted => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Successful)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Successful => write!(f, "SUCCESSFUL"),
            TestStatus::Failed => write!(f, "FAILED"),
            TestStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Result of executing one node of the descriptor tree.
///
/// The carried error is shared: the same failure appears in the node's
/// listener event and in the run summary.
#[derive(Clone, Debug)]
pub enum TestExecutionResult {
    Successful,
    Failed(Arc<anyhow::Error>),
    Aborted(Option<String>),
}

impl TestExecutionResult {
    pub fn failed(error: Arc<anyhow::Error>) -> Self {
        TestExecutionResult::Failed(error)
    }

    pub fn aborted(reason: Option<String>) -> Self {
        TestExecutionResult::Aborted(reason)
    }

    pub fn status(&self) -> TestStatus {
        match self {
            TestExecutionResult::Successful => TestStatus::Successful,
            TestExecutionResult::Failed(_) => TestStatus::Failed,
            TestExecutionResult::Aborted(_) => TestStatus::Aborted,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, TestExecutionResult::Successful)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TestExecutionResult::Failed(_))
    }

    pub fn throwable(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            TestExecutionResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for TestExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestExecutionResult::Successful => write!(f, "SUCCESSFUL"),
            TestExecutionResult::Failed(error) => write!(f, "FAILED - {error}"),
            TestExecutionResult::Aborted(Some(reason)) => write!(f, "ABORTED - {reason}"),
            TestExecutionResult::Aborted(None) => write!(f, "ABORTED"),
        }
    }
}

/// Counts for one level of the tree (classes, arguments, or tests).
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct LevelTotals {
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub skipped: usize,
}

impl LevelTotals {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.aborted + self.skipped
    }

    pub(crate) fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Successful => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Aborted => self.aborted += 1,
        }
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

impl fmt::Display for LevelTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {} | pass: {} | fail: {} | abort: {} | skip: {}",
            self.total(),
            self.passed,
            self.failed,
            self.aborted,
            self.skipped
        )
    }
}

/// A failed node, flattened for reports.
#[derive(Clone, Debug, Serialize)]
pub struct FailureRecord {
    /// Rendered unique id of the failed node.
    pub node: String,
    pub message: String,
}

/// Structured summary of one engine run.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub classes: LevelTotals,
    pub arguments: LevelTotals,
    pub tests: LevelTotals,
    pub failures: Vec<FailureRecord>,
}

impl ExecutionSummary {
    /// Whether the run had no failed node at any level. Aborted and
    /// skipped nodes do not count against success.
    pub fn is_success(&self) -> bool {
        self.classes.failed == 0 && self.arguments.failed == 0 && self.tests.failed == 0
    }

    /// Conventional process exit code: 0 when every test was successful
    /// or aborted, non-zero otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "Classes   | {}", self.classes)?;
        writeln!(f, "Arguments | {}", self.arguments)?;
        writeln!(f, "Tests     | {}", self.tests)?;
        for failure in &self.failures {
            writeln!(f, "  ✗ {} - {}", failure.node, failure.message)?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Result: {} | Duration: {}ms",
            if self.is_success() { "PASSED" } else { "FAILED" },
            self.duration_ms
        )
    }
}
