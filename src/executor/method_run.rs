//! Per-test-method execution
//!
//! Sequences `beforeEach → test → afterEach` through the interceptor
//! chain. `afterEach` always runs, even when `beforeEach` or the test
//! body failed. A skip request anywhere in the chain marks the method as
//! aborted, not failed.

use std::sync::Arc;

use crate::api::{ArgumentContext, Instance};
use crate::descriptor::TestMethodDescriptor;
use crate::interceptor::InterceptorChain;
use crate::listener::ExecutionListener;
use crate::models::TestExecutionResult;

use super::trace::StateTrace;

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Start,
    BeforeEachSuccess,
    BeforeEachFailure,
    TestSuccess,
    TestFailure,
    AfterEachSuccess,
    AfterEachFailure,
    End,
}

pub(crate) struct MethodRun {
    pub(crate) descriptor: Arc<TestMethodDescriptor>,
    pub(crate) argument_context: ArgumentContext,
    pub(crate) instance: Instance,
    pub(crate) chain: Arc<InterceptorChain>,
    pub(crate) listener: Arc<dyn ExecutionListener>,
}

impl MethodRun {
    pub(crate) async fn execute(self) -> TestExecutionResult {
        let unique_id = self.descriptor.unique_id();
        tracing::trace!("executing {unique_id}");

        self.listener.started(unique_id);

        let mut trace = StateTrace::new();
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => {
                    match self
                        .chain
                        .before_each(
                            &self.argument_context,
                            &self.instance,
                            &self.descriptor.before_each,
                        )
                        .await
                    {
                        Ok(()) => trace.ok(State::BeforeEachSuccess),
                        Err(failure) => trace.fail(State::BeforeEachFailure, failure),
                    }
                }
                State::BeforeEachSuccess => {
                    match self
                        .chain
                        .test(&self.argument_context, &self.instance, &self.descriptor.test)
                        .await
                    {
                        Ok(()) => trace.ok(State::TestSuccess),
                        Err(failure) => trace.fail(State::TestFailure, failure),
                    }
                }
                State::BeforeEachFailure | State::TestSuccess | State::TestFailure => {
                    match self
                        .chain
                        .after_each(
                            &self.argument_context,
                            &self.instance,
                            &self.descriptor.after_each,
                        )
                        .await
                    {
                        Ok(()) => trace.ok(State::AfterEachSuccess),
                        Err(failure) => trace.fail(State::AfterEachFailure, failure),
                    }
                }
                State::AfterEachSuccess | State::AfterEachFailure => trace.ok(State::End),
                State::End => break,
            };
        }

        tracing::trace!("state trace {trace:?}");

        let result = trace.result();
        match &result {
            TestExecutionResult::Aborted(reason) => {
                self.listener
                    .skipped(unique_id, reason.as_deref().unwrap_or("execution skipped"));
            }
            _ => self.listener.finished(unique_id, &result),
        }

        result
    }
}
