//! Test class registration
//!
//! Code-driven replacement for annotation discovery: a
//! [`TestClassDefinition`] declares the argument supplier, lifecycle
//! hooks, and test methods of one test class as plain async closures.
//! [`TestClassIntrospector`] is the plugin interface for sources that
//! produce definitions in bulk.

use std::future::Future;
use std::sync::Arc;

use crate::api::{
    ArgumentContext, ArgumentHookFn, ArgumentSupplierFn, Arguments, ClassContext, ClassHookFn,
    EngineContext, Failure, HookResult, Instance, InstanceFactoryFn,
};
use crate::descriptor::{NamedArgumentHook, NamedClassHook};
use crate::interceptor::{ClassInterceptor, InterceptorSupplierFn};

/// Produces test class definitions, e.g. from a generated registration
/// table or a plugin mechanism.
pub trait TestClassIntrospector: Send + Sync {
    fn test_classes(&self) -> Vec<TestClassDefinition>;
}

fn class_hook<F, Fut>(f: F) -> ClassHookFn
where
    F: Fn(ClassContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |context| Box::pin(f(context)))
}

fn argument_hook<F, Fut>(f: F) -> ArgumentHookFn
where
    F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |instance, context| Box::pin(f(instance, context)))
}

/// One test method of a test class.
#[derive(Clone)]
pub struct TestMethodDefinition {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) order: i32,
    pub(crate) tags: Vec<String>,
    pub(crate) disabled: bool,
    pub(crate) test: ArgumentHookFn,
}

impl TestMethodDefinition {
    pub fn new<F, Fut>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            display_name: None,
            order: 0,
            tags: Vec::new(),
            disabled: false,
            test: argument_hook(test),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A registered test class: metadata, argument supplier, lifecycle
/// hooks, test methods, and class-specific interceptors.
///
/// Each lifecycle role holds a list of named hooks (the analogue of one
/// annotated method per declaring class in a type hierarchy); hooks run
/// in registration order. Two hooks with the same name in one role is a
/// definition error reported at discovery.
#[derive(Clone)]
pub struct TestClassDefinition {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) order: i32,
    pub(crate) tags: Vec<String>,
    pub(crate) disabled: bool,
    pub(crate) scenario: bool,
    pub(crate) argument_parallelism: usize,
    pub(crate) argument_supplier: Option<ArgumentSupplierFn>,
    pub(crate) instance_factory: InstanceFactoryFn,
    pub(crate) prepare: Vec<NamedClassHook>,
    pub(crate) conclude: Vec<NamedClassHook>,
    pub(crate) before_all: Vec<NamedArgumentHook>,
    pub(crate) after_all: Vec<NamedArgumentHook>,
    pub(crate) before_each: Vec<NamedArgumentHook>,
    pub(crate) after_each: Vec<NamedArgumentHook>,
    pub(crate) tests: Vec<TestMethodDefinition>,
    pub(crate) interceptor_suppliers: Vec<InterceptorSupplierFn>,
}

impl TestClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            order: 0,
            tags: Vec::new(),
            disabled: false,
            scenario: false,
            argument_parallelism: 1,
            argument_supplier: None,
            instance_factory: Arc::new(|_| Ok(Arc::new(()) as Instance)),
            prepare: Vec::new(),
            conclude: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            tests: Vec::new(),
            interceptor_suppliers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Scenario mode: the first test failure skips the argument's
    /// remaining tests.
    pub fn scenario(mut self, scenario: bool) -> Self {
        self.scenario = scenario;
        self
    }

    /// Declared cap on concurrently executing argument subtrees. The
    /// engine clamps this to the `engine.argument.parallelism` ceiling.
    pub fn argument_parallelism(mut self, argument_parallelism: usize) -> Self {
        self.argument_parallelism = argument_parallelism.max(1);
        self
    }

    /// The argument supplier. Returning `Ok(None)` prunes the class.
    pub fn argument_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&EngineContext) -> Result<Option<Arguments>, Failure> + Send + Sync + 'static,
    {
        self.argument_supplier = Some(Arc::new(supplier));
        self
    }

    /// Factory for the test instance, run once per class through the
    /// interceptor-wrapped instantiation pipeline.
    pub fn instance_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ClassContext) -> Result<Instance, Failure> + Send + Sync + 'static,
    {
        self.instance_factory = Arc::new(factory);
        self
    }

    pub fn prepare<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(ClassContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.prepare.push(NamedClassHook::new(name, class_hook(hook)));
        self
    }

    pub fn conclude<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(ClassContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.conclude
            .push(NamedClassHook::new(name, class_hook(hook)));
        self
    }

    pub fn before_all<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.before_all
            .push(NamedArgumentHook::new(name, argument_hook(hook)));
        self
    }

    pub fn after_all<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.after_all
            .push(NamedArgumentHook::new(name, argument_hook(hook)));
        self
    }

    pub fn before_each<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.before_each
            .push(NamedArgumentHook::new(name, argument_hook(hook)));
        self
    }

    pub fn after_each<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.after_each
            .push(NamedArgumentHook::new(name, argument_hook(hook)));
        self
    }

    pub fn test<F, Fut>(self, name: impl Into<String>, test: F) -> Self
    where
        F: Fn(Instance, ArgumentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.test_method(TestMethodDefinition::new(name, test))
    }

    pub fn test_method(mut self, test: TestMethodDefinition) -> Self {
        self.tests.push(test);
        self
    }

    /// Register a supplier of class-specific interceptors. Suppliers run
    /// at discovery; their interceptors wrap every invocation of this
    /// class, after the engine's built-in interceptors.
    pub fn interceptor_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn ClassInterceptor>> + Send + Sync + 'static,
    {
        self.interceptor_suppliers.push(Arc::new(supplier));
        self
    }
}

impl std::fmt::Debug for TestClassDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClassDefinition")
            .field("name", &self.name)
            .field("tests", &self.tests.len())
            .field("argument_parallelism", &self.argument_parallelism)
            .field("scenario", &self.scenario)
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let definition = TestClassDefinition::new("CacheTest")
            .display_name("Cache")
            .order(3)
            .tag("integration")
            .scenario(true)
            .argument_parallelism(4)
            .argument_supplier(|_| Ok(Some(Arguments::values([1u8, 2u8]))))
            .before_all("connect", |_, _| async { Ok(()) })
            .test("get", |_, _| async { Ok(()) })
            .test("put", |_, _| async { Ok(()) })
            .after_all("disconnect", |_, _| async { Ok(()) });

        assert_eq!(definition.name(), "CacheTest");
        assert_eq!(definition.tests.len(), 2);
        assert_eq!(definition.before_all.len(), 1);
        assert_eq!(definition.argument_parallelism, 4);
        assert!(definition.scenario);
    }

    #[test]
    fn test_argument_parallelism_floor() {
        let definition = TestClassDefinition::new("T").argument_parallelism(0);
        assert_eq!(definition.argument_parallelism, 1);
    }

    #[test]
    fn test_method_metadata() {
        let test = TestMethodDefinition::new("get", |_, _| async { Ok(()) })
            .display_name("get entry")
            .order(-1)
            .tag("fast")
            .disabled(true);

        assert_eq!(test.name(), "get");
        assert_eq!(test.display_name.as_deref(), Some("get entry"));
        assert_eq!(test.order, -1);
        assert!(test.disabled);
    }
}
