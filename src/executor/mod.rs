//! Engine and two-level scheduler
//!
//! One task per class subtree, gated by `engine.class.parallelism`;
//! within a class, one task per argument subtree, gated by the class's
//! clamped argument parallelism. Task submission follows the resolver's
//! stable order; tokio semaphores queue waiters FIFO, which keeps
//! subtree starts fair. Test methods inside one argument run
//! sequentially on the argument's task.

mod argument_run;
mod class_run;
mod method_run;
mod trace;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::api::EngineContext;
use crate::config::Configuration;
use crate::descriptor::ClassDescriptor;
use crate::error::EngineError;
use crate::interceptor::ClassInterceptor;
use crate::listener::{
    CompositeListener, ExecutionListener, SummaryCollector, TracingListener,
};
use crate::models::{ExecutionSummary, TestExecutionResult};
use crate::registry::{TestClassDefinition, TestClassIntrospector};
use crate::resolver::{self, DiscoveryRequest};

use class_run::ClassRun;

/// Reason attached to skip announcements caused by engine shutdown.
pub(crate) const SHUTDOWN_REASON: &str = "shutdown";

/// Cooperative shutdown signal. Tasks check it before submitting
/// children and between phases; in-flight user code runs to completion.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The test engine: registered classes, built-in interceptors, and
/// listeners, executed against a discovery request.
///
/// Engines are plain values; tests can spin up isolated engines side by
/// side.
pub struct Engine {
    configuration: Configuration,
    definitions: Vec<TestClassDefinition>,
    interceptors: Vec<Arc<dyn ClassInterceptor>>,
    listeners: Vec<Arc<dyn ExecutionListener>>,
    shutdown: ShutdownToken,
}

impl Engine {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            definitions: Vec::new(),
            interceptors: Vec::new(),
            listeners: Vec::new(),
            shutdown: ShutdownToken::new(),
        }
    }

    /// Register one test class.
    pub fn register(mut self, definition: TestClassDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register every class produced by an introspector.
    pub fn register_all(mut self, introspector: &dyn TestClassIntrospector) -> Self {
        self.definitions.extend(introspector.test_classes());
        self
    }

    /// Add a built-in interceptor wrapping every class.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn ClassInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Add an execution listener.
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The engine's cooperative shutdown signal.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Resolve the request and execute the resulting tree.
    ///
    /// Discovery errors return `Err` and emit no events. Everything
    /// observed during execution is folded into listener events and the
    /// returned summary; user failures never propagate out of the
    /// engine.
    pub async fn execute(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<ExecutionSummary, EngineError> {
        let class_parallelism = self.configuration.class_parallelism()?;

        let engine_context = EngineContext::new(self.configuration.clone());
        let tree = resolver::resolve(&engine_context, &self.definitions, request)?;

        let collector = Arc::new(SummaryCollector::new());
        let mut fan_out: Vec<Arc<dyn ExecutionListener>> =
            vec![Arc::new(TracingListener::new()), collector.clone()];
        fan_out.extend(self.listeners.iter().cloned());
        let listener: Arc<dyn ExecutionListener> = Arc::new(CompositeListener::new(fan_out));

        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(
            "executing {} test class(es), class parallelism {class_parallelism}",
            tree.classes().len()
        );

        listener.started(tree.unique_id());

        let semaphore = Arc::new(Semaphore::new(class_parallelism));
        let mut handles = Vec::new();

        for class in tree.classes() {
            if self.shutdown.is_shutdown() {
                skip_announce_class(&listener, class, SHUTDOWN_REASON);
                continue;
            }

            let run = ClassRun {
                descriptor: class.clone(),
                engine_context: engine_context.clone(),
                built_in: self.interceptors.clone(),
                listener: listener.clone(),
                shutdown: self.shutdown.clone(),
            };

            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                run.execute().await
            }));
        }

        join_all(handles).await;

        listener.finished(tree.unique_id(), &TestExecutionResult::Successful);

        // Engine-scope store teardown; the engine node has already
        // reported, so close errors are only logged.
        for error in engine_context.store().close_all() {
            tracing::warn!("failed to close engine store entry: {error}");
        }

        let summary = collector.summary(started_at, started.elapsed());
        tracing::info!(
            "execution complete - classes [{}] arguments [{}] tests [{}]",
            summary.classes,
            summary.arguments,
            summary.tests
        );

        Ok(summary)
    }
}

/// Announce a whole class subtree as skipped.
fn skip_announce_class(
    listener: &Arc<dyn ExecutionListener>,
    descriptor: &Arc<ClassDescriptor>,
    reason: &str,
) {
    listener.started(descriptor.unique_id());
    for argument in descriptor.arguments() {
        argument_run::skip_announce(listener, argument, reason);
    }
    listener.skipped(descriptor.unique_id(), reason);
}
