//! Execution listeners
//!
//! The engine streams node events to an [`ExecutionListener`]. Per node
//! the order is `started`, then exactly one terminal event: `skipped`
//! or `finished`. A parent's terminal event always follows the terminal
//! events of all of its descendants.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::descriptor::{NodeLevel, UniqueId};
use crate::models::{ExecutionSummary, FailureRecord, LevelTotals, TestExecutionResult, TestStatus};

/// Receives node execution events. Implementations must tolerate
/// concurrent calls for unrelated nodes.
pub trait ExecutionListener: Send + Sync {
    fn started(&self, unique_id: &UniqueId);

    fn skipped(&self, unique_id: &UniqueId, reason: &str);

    fn finished(&self, unique_id: &UniqueId, result: &TestExecutionResult);
}

/// Logs every event through `tracing`.
#[derive(Default)]
pub struct TracingListener;

impl TracingListener {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionListener for TracingListener {
    fn started(&self, unique_id: &UniqueId) {
        tracing::trace!("started {unique_id}");
    }

    fn skipped(&self, unique_id: &UniqueId, reason: &str) {
        tracing::debug!("skipped {unique_id} - {reason}");
    }

    fn finished(&self, unique_id: &UniqueId, result: &TestExecutionResult) {
        match result {
            TestExecutionResult::Failed(error) => {
                tracing::debug!("finished {unique_id} FAILED - {error}")
            }
            _ => tracing::trace!("finished {unique_id} {result}"),
        }
    }
}

/// A recorded event, for embedders asserting event order.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionEvent {
    Started {
        unique_id: UniqueId,
    },
    Skipped {
        unique_id: UniqueId,
        reason: String,
    },
    Finished {
        unique_id: UniqueId,
        status: TestStatus,
        message: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn unique_id(&self) -> &UniqueId {
        match self {
            ExecutionEvent::Started { unique_id }
            | ExecutionEvent::Skipped { unique_id, .. }
            | ExecutionEvent::Finished { unique_id, .. } => unique_id,
        }
    }

    /// Compact single-line rendering, e.g.
    /// `finished(SUCCESSFUL) [engine=verifyica]/[class=A]`.
    pub fn render(&self) -> String {
        match self {
            ExecutionEvent::Started { unique_id } => format!("started {unique_id}"),
            ExecutionEvent::Skipped { unique_id, reason } => {
                format!("skipped({reason}) {unique_id}")
            }
            ExecutionEvent::Finished {
                unique_id, status, ..
            } => format!("finished({status}) {unique_id}"),
        }
    }
}

/// Thread-safe event log.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// All events rendered as compact lines, in emission order.
    pub fn rendered(&self) -> Vec<String> {
        self.events.lock().iter().map(ExecutionEvent::render).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ExecutionListener for RecordingListener {
    fn started(&self, unique_id: &UniqueId) {
        self.events.lock().push(ExecutionEvent::Started {
            unique_id: unique_id.clone(),
        });
    }

    fn skipped(&self, unique_id: &UniqueId, reason: &str) {
        self.events.lock().push(ExecutionEvent::Skipped {
            unique_id: unique_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn finished(&self, unique_id: &UniqueId, result: &TestExecutionResult) {
        let message = match result {
            TestExecutionResult::Failed(error) => Some(error.to_string()),
            TestExecutionResult::Aborted(reason) => reason.clone(),
            TestExecutionResult::Successful => None,
        };
        self.events.lock().push(ExecutionEvent::Finished {
            unique_id: unique_id.clone(),
            status: result.status(),
            message,
        });
    }
}

/// Fans events out to several listeners in order.
pub struct CompositeListener {
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl CompositeListener {
    pub fn new(listeners: Vec<Arc<dyn ExecutionListener>>) -> Self {
        Self { listeners }
    }
}

impl ExecutionListener for CompositeListener {
    fn started(&self, unique_id: &UniqueId) {
        for listener in &self.listeners {
            listener.started(unique_id);
        }
    }

    fn skipped(&self, unique_id: &UniqueId, reason: &str) {
        for listener in &self.listeners {
            listener.skipped(unique_id, reason);
        }
    }

    fn finished(&self, unique_id: &UniqueId, result: &TestExecutionResult) {
        for listener in &self.listeners {
            listener.finished(unique_id, result);
        }
    }
}

/// Aggregates events into an [`ExecutionSummary`].
#[derive(Default)]
pub(crate) struct SummaryCollector {
    inner: Mutex<SummaryInner>,
}

#[derive(Default)]
struct SummaryInner {
    classes: LevelTotals,
    arguments: LevelTotals,
    tests: LevelTotals,
    failures: Vec<FailureRecord>,
}

impl SummaryCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn summary(
        &self,
        started_at: DateTime<Utc>,
        duration: std::time::Duration,
    ) -> ExecutionSummary {
        let inner = self.inner.lock();
        ExecutionSummary {
            started_at,
            duration_ms: duration.as_millis() as u64,
            classes: inner.classes,
            arguments: inner.arguments,
            tests: inner.tests,
            failures: inner.failures.clone(),
        }
    }
}

impl SummaryCollector {
    fn totals<'a>(inner: &'a mut SummaryInner, level: NodeLevel) -> Option<&'a mut LevelTotals> {
        match level {
            NodeLevel::Engine => None,
            NodeLevel::Class => Some(&mut inner.classes),
            NodeLevel::Argument => Some(&mut inner.arguments),
            NodeLevel::TestMethod => Some(&mut inner.tests),
        }
    }
}

impl ExecutionListener for SummaryCollector {
    fn started(&self, _unique_id: &UniqueId) {}

    fn skipped(&self, unique_id: &UniqueId, _reason: &str) {
        let mut inner = self.inner.lock();
        if let Some(totals) = Self::totals(&mut inner, unique_id.level()) {
            totals.record_skipped();
        }
    }

    fn finished(&self, unique_id: &UniqueId, result: &TestExecutionResult) {
        let mut inner = self.inner.lock();
        if let Some(totals) = Self::totals(&mut inner, unique_id.level()) {
            totals.record(result.status());
        }
        if let TestExecutionResult::Failed(error) = result {
            inner.failures.push(FailureRecord {
                node: unique_id.to_string(),
                message: error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_listener_orders_events() {
        let listener = RecordingListener::new();
        let class = UniqueId::engine().class("A");
        let method = class.argument(0).method("t");

        listener.started(&class);
        listener.started(&method);
        listener.finished(&method, &TestExecutionResult::Successful);
        listener.finished(&class, &TestExecutionResult::Successful);

        assert_eq!(
            listener.rendered(),
            vec![
                "started [engine=verifyica]/[class=A]",
                "started [engine=verifyica]/[class=A]/[argument=0]/[method=t]",
                "finished(SUCCESSFUL) [engine=verifyica]/[class=A]/[argument=0]/[method=t]",
                "finished(SUCCESSFUL) [engine=verifyica]/[class=A]",
            ]
        );
    }

    #[test]
    fn test_summary_collector_counts_by_level() {
        let collector = SummaryCollector::new();
        let class = UniqueId::engine().class("A");
        let argument = class.argument(0);
        let method = argument.method("t");

        collector.finished(&method, &TestExecutionResult::Successful);
        collector.finished(
            &method,
            &TestExecutionResult::failed(Arc::new(anyhow::anyhow!("boom"))),
        );
        collector.skipped(&method, "later");
        collector.finished(&argument, &TestExecutionResult::Successful);
        collector.finished(&class, &TestExecutionResult::Successful);

        let summary = collector.summary(Utc::now(), std::time::Duration::from_millis(5));
        assert_eq!(summary.tests.passed, 1);
        assert_eq!(summary.tests.failed, 1);
        assert_eq!(summary.tests.skipped, 1);
        assert_eq!(summary.arguments.passed, 1);
        assert_eq!(summary.classes.passed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].node.contains("[method=t]"));
        assert_eq!(summary.exit_code(), 1);
    }
}
