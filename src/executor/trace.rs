//! State traces
//!
//! Each lifecycle machine records its transitions as
//! `(state, failure?)` pairs; the first recorded failure determines the
//! node's reported result.

use crate::api::Failure;
use crate::models::TestExecutionResult;

#[derive(Debug)]
pub(crate) struct StateTrace<S> {
    results: Vec<(S, Option<Failure>)>,
}

impl<S: Copy + std::fmt::Debug> StateTrace<S> {
    pub(crate) fn new() -> Self {
        Self {
            results: Vec::new(),
        }
    }

    /// Record a successful transition into `state`.
    pub(crate) fn ok(&mut self, state: S) -> S {
        self.results.push((state, None));
        state
    }

    /// Record a failed transition into `state`.
    pub(crate) fn fail(&mut self, state: S, failure: Failure) -> S {
        self.results.push((state, Some(failure)));
        state
    }

    pub(crate) fn first_failure(&self) -> Option<&Failure> {
        self.results
            .iter()
            .find_map(|(_, failure)| failure.as_ref())
    }

    /// Node result: the first failure wins; a skip request reports the
    /// node as aborted rather than failed.
    pub(crate) fn result(&self) -> TestExecutionResult {
        match self.first_failure() {
            None => TestExecutionResult::Successful,
            Some(Failure::Skip(reason)) => TestExecutionResult::aborted(reason.clone()),
            Some(Failure::Error(error)) => TestExecutionResult::failed(error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum State {
        A,
        B,
        C,
    }

    #[test]
    fn test_no_failure_is_successful() {
        let mut trace = StateTrace::new();
        trace.ok(State::A);
        trace.ok(State::B);
        assert!(trace.result().is_successful());
    }

    #[test]
    fn test_first_failure_wins() {
        let mut trace = StateTrace::new();
        trace.ok(State::A);
        trace.fail(State::B, Failure::message("first"));
        trace.fail(State::C, Failure::message("second"));

        assert_eq!(trace.result().throwable().unwrap().to_string(), "first");
    }

    #[test]
    fn test_skip_reports_aborted() {
        let mut trace = StateTrace::new();
        trace.fail(State::A, Failure::skip_because("not today"));
        trace.fail(State::B, Failure::message("later error"));

        match trace.result() {
            TestExecutionResult::Aborted(reason) => {
                assert_eq!(reason.as_deref(), Some("not today"))
            }
            other => panic!("expected aborted, got {other:?}"),
        }
    }
}
