//! Per-argument execution
//!
//! The heart of the engine: sequences
//! `beforeAll → tests → afterAll → close argument → close store`
//! for one argument subtree. Teardown always runs; the first failure on
//! any path determines the argument's reported result.

use std::sync::Arc;

use crate::api::{ArgumentContext, ClassContext, Failure, Instance};
use crate::descriptor::ArgumentDescriptor;
use crate::interceptor::InterceptorChain;
use crate::listener::ExecutionListener;
use crate::models::TestExecutionResult;

use super::method_run::MethodRun;
use super::trace::StateTrace;
use super::ShutdownToken;

/// Reason attached to child skips when `beforeAll` failed.
const BEFORE_ALL_FAILED: &str = "before-all failed";

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Start,
    BeforeAllSuccess,
    BeforeAllFailure,
    ExecuteSuccess,
    ExecuteFailure,
    SkipSuccess,
    /// Unreachable here: skip announcements cannot fail. Kept so the
    /// trace renders the full transition vocabulary.
    #[allow(dead_code)]
    SkipFailure,
    AfterAllSuccess,
    AfterAllFailure,
    AutoCloseArgumentSuccess,
    AutoCloseArgumentFailure,
    AutoCloseStoreSuccess,
    AutoCloseStoreFailure,
    End,
}

pub(crate) struct ArgumentRun {
    pub(crate) descriptor: Arc<ArgumentDescriptor>,
    pub(crate) class_context: ClassContext,
    pub(crate) instance: Instance,
    pub(crate) scenario: bool,
    pub(crate) chain: Arc<InterceptorChain>,
    pub(crate) listener: Arc<dyn ExecutionListener>,
    pub(crate) shutdown: ShutdownToken,
}

impl ArgumentRun {
    pub(crate) async fn execute(self) -> TestExecutionResult {
        let unique_id = self.descriptor.unique_id();
        tracing::trace!("executing {unique_id}");

        self.listener.started(unique_id);

        let argument_context = ArgumentContext::new(
            self.class_context.clone(),
            self.descriptor.index,
            self.descriptor.argument.clone(),
        );

        let mut trace = StateTrace::new();
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => {
                    match self
                        .chain
                        .before_all(&argument_context, &self.instance, &self.descriptor.before_all)
                        .await
                    {
                        Ok(()) => trace.ok(State::BeforeAllSuccess),
                        Err(failure) => trace.fail(State::BeforeAllFailure, failure),
                    }
                }
                State::BeforeAllSuccess => match self.run_tests(&argument_context).await {
                    None => trace.ok(State::ExecuteSuccess),
                    Some(failure) => trace.fail(State::ExecuteFailure, failure),
                },
                State::BeforeAllFailure => {
                    for test in &self.descriptor.tests {
                        self.listener.started(test.unique_id());
                        self.listener.skipped(test.unique_id(), BEFORE_ALL_FAILED);
                    }
                    trace.ok(State::SkipSuccess)
                }
                State::ExecuteSuccess
                | State::ExecuteFailure
                | State::SkipSuccess
                | State::SkipFailure => {
                    match self
                        .chain
                        .after_all(&argument_context, &self.instance, &self.descriptor.after_all)
                        .await
                    {
                        Ok(()) => trace.ok(State::AfterAllSuccess),
                        Err(failure) => trace.fail(State::AfterAllFailure, failure),
                    }
                }
                State::AfterAllSuccess | State::AfterAllFailure => {
                    match argument_context.close_argument() {
                        Ok(()) => trace.ok(State::AutoCloseArgumentSuccess),
                        Err(error) => {
                            trace.fail(State::AutoCloseArgumentFailure, error.into())
                        }
                    }
                }
                State::AutoCloseArgumentSuccess | State::AutoCloseArgumentFailure => {
                    let mut errors = argument_context.store().close_all().into_iter();
                    match errors.next() {
                        None => trace.ok(State::AutoCloseStoreSuccess),
                        Some(error) => trace.fail(State::AutoCloseStoreFailure, error.into()),
                    }
                }
                State::AutoCloseStoreSuccess | State::AutoCloseStoreFailure => {
                    trace.ok(State::End)
                }
                State::End => break,
            };
        }

        tracing::trace!("state trace {trace:?}");

        let result = trace.result();
        self.listener.finished(unique_id, &result);
        result
    }

    /// Run test methods sequentially in stable order. Returns the first
    /// failure, if any. In scenario mode the remaining tests after a
    /// failure are announced as aborted without running.
    async fn run_tests(&self, argument_context: &ArgumentContext) -> Option<Failure> {
        let mut first_failure: Option<Failure> = None;

        for test in &self.descriptor.tests {
            if self.scenario && first_failure.is_some() {
                self.listener.started(test.unique_id());
                self.listener.finished(
                    test.unique_id(),
                    &TestExecutionResult::aborted(Some("previous test failed".to_string())),
                );
                continue;
            }

            if self.shutdown.is_shutdown() {
                self.listener.started(test.unique_id());
                self.listener.skipped(test.unique_id(), super::SHUTDOWN_REASON);
                continue;
            }

            let result = MethodRun {
                descriptor: test.clone(),
                argument_context: argument_context.clone(),
                instance: self.instance.clone(),
                chain: self.chain.clone(),
                listener: self.listener.clone(),
            }
            .execute()
            .await;

            if let TestExecutionResult::Failed(error) = &result {
                if first_failure.is_none() {
                    first_failure = Some(Failure::Error(error.clone()));
                }
            }
        }

        first_failure
    }
}

/// Announce an argument subtree as skipped without executing it: the
/// argument and each of its tests emit `started` then `skipped`.
pub(crate) fn skip_announce(
    listener: &Arc<dyn ExecutionListener>,
    descriptor: &ArgumentDescriptor,
    reason: &str,
) {
    listener.started(descriptor.unique_id());
    for test in &descriptor.tests {
        listener.started(test.unique_id());
        listener.skipped(test.unique_id(), reason);
    }
    listener.skipped(descriptor.unique_id(), reason);
}
