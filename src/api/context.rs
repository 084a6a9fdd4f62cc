//! Execution contexts
//!
//! Cloneable handles scoped to the engine, a class, or an argument.
//! A child context owns a handle to its parent; the backing state lives
//! in `Arc`s owned by the engine for the duration of the scope.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::config::Configuration;
use crate::locks::LockManager;

use super::{Argument, Instance, SharedMap, Store};

/// Process-scoped context shared by every test class in one engine run.
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<EngineShared>,
}

struct EngineShared {
    configuration: Configuration,
    store: Store,
    map: SharedMap,
    locks: LockManager,
}

impl EngineContext {
    pub(crate) fn new(configuration: Configuration) -> Self {
        Self {
            inner: Arc::new(EngineShared {
                configuration,
                store: Store::new(),
                map: SharedMap::new(),
                locks: LockManager::new(),
            }),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn map(&self) -> &SharedMap {
        &self.inner.map
    }

    /// The engine-scoped keyed lock manager.
    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }
}

/// Context for one test class, alive for the class's whole execution.
#[derive(Clone)]
pub struct ClassContext {
    engine: EngineContext,
    inner: Arc<ClassShared>,
}

struct ClassShared {
    class_name: String,
    display_name: String,
    argument_parallelism: usize,
    instance: OnceLock<Instance>,
    store: Store,
    map: SharedMap,
    rw_lock: RwLock<()>,
}

impl ClassContext {
    pub(crate) fn new(
        engine: EngineContext,
        class_name: impl Into<String>,
        display_name: impl Into<String>,
        argument_parallelism: usize,
    ) -> Self {
        Self {
            engine,
            inner: Arc::new(ClassShared {
                class_name: class_name.into(),
                display_name: display_name.into(),
                argument_parallelism,
                instance: OnceLock::new(),
                store: Store::new(),
                map: SharedMap::new(),
                rw_lock: RwLock::new(()),
            }),
        }
    }

    pub fn engine_context(&self) -> &EngineContext {
        &self.engine
    }

    pub fn test_class_name(&self) -> &str {
        &self.inner.class_name
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// Effective argument parallelism for this class (declared value
    /// clamped to the engine-wide ceiling).
    pub fn argument_parallelism(&self) -> usize {
        self.inner.argument_parallelism
    }

    /// The test instance, once the instantiation pipeline has run.
    pub fn test_instance(&self) -> Option<Instance> {
        self.inner.instance.get().cloned()
    }

    /// The test instance downcast to `T`.
    pub fn test_instance_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.test_instance()
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    pub(crate) fn set_test_instance(&self, instance: Instance) {
        // One instantiation per class; the executor runs the pipeline once.
        let _ = self.inner.instance.set(instance);
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn map(&self) -> &SharedMap {
        &self.inner.map
    }

    /// Lock for user-level coordination across argument workers.
    /// Readers proceed concurrently; writers are exclusive.
    pub fn read_write_lock(&self) -> &RwLock<()> {
        &self.inner.rw_lock
    }
}

/// Context for one argument subtree.
#[derive(Clone)]
pub struct ArgumentContext {
    class: ClassContext,
    inner: Arc<ArgumentShared>,
}

struct ArgumentShared {
    index: usize,
    argument: Arc<Argument>,
    store: Store,
    map: SharedMap,
}

impl ArgumentContext {
    pub(crate) fn new(class: ClassContext, index: usize, argument: Arc<Argument>) -> Self {
        Self {
            class,
            inner: Arc::new(ArgumentShared {
                index,
                argument,
                store: Store::new(),
                map: SharedMap::new(),
            }),
        }
    }

    pub fn class_context(&self) -> &ClassContext {
        &self.class
    }

    pub fn argument_index(&self) -> usize {
        self.inner.index
    }

    pub fn argument(&self) -> &Argument {
        &self.inner.argument
    }

    /// Borrow the argument payload as `T`.
    pub fn payload<T: Any>(&self) -> Option<parking_lot::MappedMutexGuard<'_, T>> {
        self.inner.argument.payload::<T>()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn map(&self) -> &SharedMap {
        &self.inner.map
    }

    pub(crate) fn close_argument(&self) -> anyhow::Result<()> {
        self.inner.argument.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_context() -> EngineContext {
        EngineContext::new(Configuration::new())
    }

    #[test]
    fn test_context_hierarchy() {
        let engine = engine_context();
        let class = ClassContext::new(engine.clone(), "ExampleTest", "ExampleTest", 2);
        let argument = ArgumentContext::new(class.clone(), 0, Arc::new(Argument::new("a", 1u8)));

        assert_eq!(argument.class_context().test_class_name(), "ExampleTest");
        assert_eq!(argument.argument_index(), 0);
        assert_eq!(argument.argument().name(), "a");
        assert_eq!(class.argument_parallelism(), 2);
    }

    #[test]
    fn test_instance_set_once() {
        let class = ClassContext::new(engine_context(), "T", "T", 1);
        assert!(class.test_instance().is_none());

        class.set_test_instance(Arc::new(42u32));
        class.set_test_instance(Arc::new(7u32));

        assert_eq!(*class.test_instance_as::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_read_write_lock() {
        let class = ClassContext::new(engine_context(), "T", "T", 1);

        {
            let _first = class.read_write_lock().read();
            let _second = class.read_write_lock().read();
        }

        let _writer = class.read_write_lock().write();
    }

    #[test]
    fn test_stores_are_scoped() {
        let engine = engine_context();
        let class = ClassContext::new(engine.clone(), "T", "T", 1);

        engine.store().put("k", 1u8);
        class.store().put("k", 2u8);

        assert_eq!(*engine.store().get::<u8>("k").unwrap(), 1);
        assert_eq!(*class.store().get::<u8>("k").unwrap(), 2);
    }
}
