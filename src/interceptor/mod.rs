//! Interceptor pipeline
//!
//! Every user-visible invocation is wrapped: pre hooks run in
//! registration order, then the body, then post hooks in reverse order.
//! Post hooks receive the body's failure (or `None`). A pre-hook failure
//! aborts the body; post hooks still run. A post-hook failure is captured
//! but never masks an earlier failure and never stops remaining post
//! hooks.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::api::{
    ArgumentContext, ClassContext, EngineContext, Failure, HookResult, Instance,
    InstanceFactoryFn,
};
use crate::descriptor::{NamedArgumentHook, NamedClassHook};

/// Supplies class-specific interceptors for one test class.
pub type InterceptorSupplierFn =
    Arc<dyn Fn() -> Vec<Arc<dyn ClassInterceptor>> + Send + Sync>;

/// Pre/post hooks around every user-visible invocation of a test class.
///
/// All hooks default to no-ops; implement only the ones needed. Built-in
/// interceptors run first (sorted by [`order`](Self::order)), then
/// class-specific interceptors in registration order.
#[allow(unused_variables)]
pub trait ClassInterceptor: Send + Sync {
    /// Ordering among built-in interceptors; lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    fn pre_instantiate(&self, context: &EngineContext) -> HookResult {
        Ok(())
    }

    fn post_instantiate(&self, context: &EngineContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn pre_prepare(&self, context: &ClassContext) -> HookResult {
        Ok(())
    }

    fn post_prepare(&self, context: &ClassContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn pre_before_all(&self, context: &ArgumentContext) -> HookResult {
        Ok(())
    }

    fn post_before_all(&self, context: &ArgumentContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn pre_before_each(&self, context: &ArgumentContext) -> HookResult {
        Ok(())
    }

    fn post_before_each(&self, context: &ArgumentContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn pre_test(&self, context: &ArgumentContext) -> HookResult {
        Ok(())
    }

    fn post_test(&self, context: &ArgumentContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn post_after_each(&self, context: &ArgumentContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn post_after_all(&self, context: &ArgumentContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    fn pre_conclude(&self, context: &ClassContext) -> HookResult {
        Ok(())
    }

    fn post_conclude(&self, context: &ClassContext, failure: Option<&Failure>) -> HookResult {
        Ok(())
    }

    /// Called once when the class subtree is torn down. Errors are
    /// logged, never reported.
    fn on_destroy(&self, context: &ClassContext) -> HookResult {
        Ok(())
    }
}

/// Run a user future, converting panics into failures so a panicking
/// test cannot take down a worker.
pub(crate) async fn call_user(future: BoxFuture<'_, HookResult>) -> HookResult {
    match std::panic::AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Failure::Error(Arc::new(anyhow::anyhow!(
            "panicked: {}",
            panic_message(&panic)
        )))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The resolved interceptor pipeline for one test class.
pub(crate) struct InterceptorChain {
    interceptors: Vec<Arc<dyn ClassInterceptor>>,
}

impl InterceptorChain {
    /// Built-in interceptors first (stable-sorted by declared order),
    /// then class-specific interceptors in registration order.
    pub(crate) fn new(
        built_in: &[Arc<dyn ClassInterceptor>],
        class_specific: &[Arc<dyn ClassInterceptor>],
    ) -> Self {
        let mut interceptors: Vec<Arc<dyn ClassInterceptor>> = built_in.to_vec();
        interceptors.sort_by_key(|interceptor| interceptor.order());
        interceptors.extend(class_specific.iter().cloned());
        Self { interceptors }
    }

    /// pre hooks in order, body, post hooks in reverse. Returns the
    /// first failure observed on any of the three stages.
    async fn wrapped<B, Fut>(
        &self,
        phase: &str,
        pre: impl Fn(&dyn ClassInterceptor) -> HookResult,
        body: B,
        post: impl Fn(&dyn ClassInterceptor, Option<&Failure>) -> HookResult,
    ) -> HookResult
    where
        B: FnOnce() -> Fut,
        Fut: Future<Output = HookResult>,
    {
        let mut first: Option<Failure> = None;

        for interceptor in &self.interceptors {
            if let Err(failure) = pre(interceptor.as_ref()) {
                tracing::warn!("pre-{phase} interceptor failed: {failure}");
                first = Some(failure);
                break;
            }
        }

        if first.is_none() {
            if let Err(failure) = body().await {
                first = Some(failure);
            }
        }

        for interceptor in self.interceptors.iter().rev() {
            if let Err(failure) = post(interceptor.as_ref(), first.as_ref()) {
                tracing::warn!("post-{phase} interceptor failed: {failure}");
                if first.is_none() {
                    first = Some(failure);
                }
            }
        }

        match first {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    /// The instantiation pipeline:
    /// `pre_instantiate → factory → post_instantiate`.
    pub(crate) async fn instantiate(
        &self,
        class_context: &ClassContext,
        factory: &InstanceFactoryFn,
    ) -> Result<Instance, Failure> {
        let engine_context = class_context.engine_context();
        let mut instance: Option<Instance> = None;

        let result = self
            .wrapped(
                "instantiate",
                |interceptor| interceptor.pre_instantiate(engine_context),
                || async {
                    instance = Some(factory(class_context)?);
                    Ok(())
                },
                |interceptor, failure| interceptor.post_instantiate(engine_context, failure),
            )
            .await;

        match result {
            Ok(()) => instance.ok_or_else(|| Failure::message("instance factory produced nothing")),
            Err(failure) => Err(failure),
        }
    }

    pub(crate) async fn prepare(
        &self,
        context: &ClassContext,
        hooks: &[NamedClassHook],
    ) -> HookResult {
        self.wrapped(
            "prepare",
            |interceptor| interceptor.pre_prepare(context),
            || Self::run_class_hooks(context, hooks),
            |interceptor, failure| interceptor.post_prepare(context, failure),
        )
        .await
    }

    pub(crate) async fn conclude(
        &self,
        context: &ClassContext,
        hooks: &[NamedClassHook],
    ) -> HookResult {
        self.wrapped(
            "conclude",
            |interceptor| interceptor.pre_conclude(context),
            || Self::run_class_hooks(context, hooks),
            |interceptor, failure| interceptor.post_conclude(context, failure),
        )
        .await
    }

    pub(crate) async fn before_all(
        &self,
        context: &ArgumentContext,
        instance: &Instance,
        hooks: &[NamedArgumentHook],
    ) -> HookResult {
        self.wrapped(
            "beforeAll",
            |interceptor| interceptor.pre_before_all(context),
            || Self::run_argument_hooks(context, instance, hooks),
            |interceptor, failure| interceptor.post_before_all(context, failure),
        )
        .await
    }

    pub(crate) async fn before_each(
        &self,
        context: &ArgumentContext,
        instance: &Instance,
        hooks: &[NamedArgumentHook],
    ) -> HookResult {
        self.wrapped(
            "beforeEach",
            |interceptor| interceptor.pre_before_each(context),
            || Self::run_argument_hooks(context, instance, hooks),
            |interceptor, failure| interceptor.post_before_each(context, failure),
        )
        .await
    }

    pub(crate) async fn test(
        &self,
        context: &ArgumentContext,
        instance: &Instance,
        test: &NamedArgumentHook,
    ) -> HookResult {
        self.wrapped(
            "test",
            |interceptor| interceptor.pre_test(context),
            || Self::run_argument_hooks(context, instance, std::slice::from_ref(test)),
            |interceptor, failure| interceptor.post_test(context, failure),
        )
        .await
    }

    pub(crate) async fn after_each(
        &self,
        context: &ArgumentContext,
        instance: &Instance,
        hooks: &[NamedArgumentHook],
    ) -> HookResult {
        self.wrapped(
            "afterEach",
            |_| Ok(()),
            || Self::run_argument_hooks(context, instance, hooks),
            |interceptor, failure| interceptor.post_after_each(context, failure),
        )
        .await
    }

    pub(crate) async fn after_all(
        &self,
        context: &ArgumentContext,
        instance: &Instance,
        hooks: &[NamedArgumentHook],
    ) -> HookResult {
        self.wrapped(
            "afterAll",
            |_| Ok(()),
            || Self::run_argument_hooks(context, instance, hooks),
            |interceptor, failure| interceptor.post_after_all(context, failure),
        )
        .await
    }

    /// Reverse-order destroy notification. Errors are logged only.
    pub(crate) fn on_destroy(&self, context: &ClassContext) {
        for interceptor in self.interceptors.iter().rev() {
            if let Err(failure) = interceptor.on_destroy(context) {
                tracing::warn!(
                    "onDestroy interceptor failed for [{}]: {failure}",
                    context.test_class_name()
                );
            }
        }
    }

    async fn run_class_hooks(context: &ClassContext, hooks: &[NamedClassHook]) -> HookResult {
        for hook in hooks {
            tracing::trace!("invoking [{}]", hook.name());
            call_user((hook.hook)(context.clone())).await?;
        }
        Ok(())
    }

    async fn run_argument_hooks(
        context: &ArgumentContext,
        instance: &Instance,
        hooks: &[NamedArgumentHook],
    ) -> HookResult {
        for hook in hooks {
            tracing::trace!("invoking [{}]", hook.name());
            call_user((hook.hook)(instance.clone(), context.clone())).await?;
        }
        Ok(())
    }
}
