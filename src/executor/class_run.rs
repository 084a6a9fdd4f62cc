//! Per-class execution
//!
//! Instantiates the test class once through the interceptor pipeline,
//! runs `prepare`, fans the argument subtrees out under the class's
//! argument-parallelism gate, then runs `conclude` and tears the class
//! store down. Argument results do not affect the class's own result.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::api::{ClassContext, EngineContext, Failure, Instance};
use crate::descriptor::ClassDescriptor;
use crate::interceptor::{ClassInterceptor, InterceptorChain};
use crate::listener::ExecutionListener;
use crate::models::TestExecutionResult;

use super::argument_run::{skip_announce, ArgumentRun};
use super::trace::StateTrace;
use super::{ShutdownToken, SHUTDOWN_REASON};

/// Reason attached to child skips when instantiation or `prepare`
/// failed.
const PREPARE_FAILED: &str = "prepare failed";

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Start,
    PrepareSuccess,
    PrepareFailure,
    ArgumentsComplete,
    ConcludeSuccess,
    ConcludeFailure,
    StoreCloseSuccess,
    StoreCloseFailure,
    End,
}

pub(crate) struct ClassRun {
    pub(crate) descriptor: Arc<ClassDescriptor>,
    pub(crate) engine_context: EngineContext,
    pub(crate) built_in: Vec<Arc<dyn ClassInterceptor>>,
    pub(crate) listener: Arc<dyn ExecutionListener>,
    pub(crate) shutdown: ShutdownToken,
}

impl ClassRun {
    pub(crate) async fn execute(self) -> TestExecutionResult {
        let unique_id = self.descriptor.unique_id();
        tracing::trace!("executing {unique_id}");

        self.listener.started(unique_id);

        // A throwing argument supplier was recorded at discovery: the
        // class is failed with no children.
        if let Some(failure) = &self.descriptor.supplier_failure {
            let result = match failure {
                Failure::Skip(reason) => TestExecutionResult::aborted(reason.clone()),
                Failure::Error(error) => TestExecutionResult::failed(error.clone()),
            };
            self.listener.finished(unique_id, &result);
            return result;
        }

        // Observed shutdown before any work: announce the subtree as
        // skipped.
        if self.shutdown.is_shutdown() {
            for argument in self.descriptor.arguments() {
                skip_announce(&self.listener, argument, SHUTDOWN_REASON);
            }
            self.listener.skipped(unique_id, SHUTDOWN_REASON);
            return TestExecutionResult::aborted(Some(SHUTDOWN_REASON.to_string()));
        }

        let chain = Arc::new(InterceptorChain::new(
            &self.built_in,
            &self.descriptor.interceptors,
        ));

        let class_context = ClassContext::new(
            self.engine_context.clone(),
            self.descriptor.class_name(),
            self.descriptor.display_name(),
            self.descriptor.argument_parallelism(),
        );

        let mut instance: Option<Instance> = None;
        let mut trace = StateTrace::new();
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => {
                    match chain
                        .instantiate(&class_context, &self.descriptor.instance_factory)
                        .await
                    {
                        Ok(created) => {
                            class_context.set_test_instance(created.clone());
                            instance = Some(created);

                            match chain.prepare(&class_context, &self.descriptor.prepare).await {
                                Ok(()) => trace.ok(State::PrepareSuccess),
                                Err(failure) => trace.fail(State::PrepareFailure, failure),
                            }
                        }
                        Err(failure) => trace.fail(State::PrepareFailure, failure),
                    }
                }
                State::PrepareSuccess => {
                    // The instance exists on this path.
                    let instance = instance.clone().unwrap();
                    self.run_arguments(&class_context, instance, chain.clone())
                        .await;
                    trace.ok(State::ArgumentsComplete)
                }
                State::PrepareFailure => {
                    for argument in self.descriptor.arguments() {
                        skip_announce(&self.listener, argument, PREPARE_FAILED);
                    }
                    trace.ok(State::ArgumentsComplete)
                }
                State::ArgumentsComplete => {
                    match chain.conclude(&class_context, &self.descriptor.conclude).await {
                        Ok(()) => trace.ok(State::ConcludeSuccess),
                        Err(failure) => trace.fail(State::ConcludeFailure, failure),
                    }
                }
                State::ConcludeSuccess | State::ConcludeFailure => {
                    let mut errors = class_context.store().close_all().into_iter();
                    match errors.next() {
                        None => trace.ok(State::StoreCloseSuccess),
                        Some(error) => trace.fail(State::StoreCloseFailure, error.into()),
                    }
                }
                State::StoreCloseSuccess | State::StoreCloseFailure => {
                    chain.on_destroy(&class_context);
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

    /// Submit argument subtrees in stable order, bounded by the class's
    /// argument parallelism. The shutdown signal stops further
    /// submissions; remaining subtrees are announced as skipped.
    async fn run_arguments(
        &self,
        class_context: &ClassContext,
        instance: Instance,
        chain: Arc<InterceptorChain>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.descriptor.argument_parallelism()));
        let mut handles = Vec::new();

        for argument in self.descriptor.arguments() {
            if self.shutdown.is_shutdown() {
                skip_announce(&self.listener, argument, SHUTDOWN_REASON);
                continue;
            }

            let run = ArgumentRun {
                descriptor: argument.clone(),
                class_context: class_context.clone(),
                instance: instance.clone(),
                scenario: self.descriptor.is_scenario(),
                chain: chain.clone(),
                listener: self.listener.clone(),
                shutdown: self.shutdown.clone(),
            };

            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                run.execute().await
            }));
        }

        join_all(handles).await;
    }
}
