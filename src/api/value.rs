//! Type-erased value cells shared by arguments and stores.

use std::any::Any;

/// A resource the engine closes when its owning scope ends.
///
/// Argument payloads and store values implementing this trait are closed
/// automatically: the argument payload after `afterAll`, store entries in
/// reverse insertion order when the scope's store is torn down.
pub trait AutoClose: Send {
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Object-safe bridge between `Any` and [`AutoClose`].
pub(crate) trait CloseableAny: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
    fn close_value(&mut self) -> anyhow::Result<()>;
}

impl<T: Any + AutoClose + Send + Sync> CloseableAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn close_value(&mut self) -> anyhow::Result<()> {
        AutoClose::close(self)
    }
}

/// A stored value: either a plain payload or one carrying a close
/// capability.
pub(crate) enum Slot {
    Plain(Box<dyn Any + Send + Sync>),
    Closeable(Box<dyn CloseableAny>),
}

impl Slot {
    pub(crate) fn plain<T: Any + Send + Sync>(value: T) -> Self {
        Slot::Plain(Box::new(value))
    }

    pub(crate) fn closeable<T: Any + AutoClose + Send + Sync>(value: T) -> Self {
        Slot::Closeable(Box::new(value))
    }

    pub(crate) fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Slot::Plain(value) => value.downcast_ref::<T>(),
            Slot::Closeable(value) => value.as_any().downcast_ref::<T>(),
        }
    }

    pub(crate) fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        match self {
            Slot::Plain(value) => value.downcast_mut::<T>(),
            Slot::Closeable(value) => value.as_any_mut().downcast_mut::<T>(),
        }
    }

    pub(crate) fn into_any(self) -> Box<dyn Any + Send + Sync> {
        match self {
            Slot::Plain(value) => value,
            Slot::Closeable(value) => value.into_any(),
        }
    }

    /// Close the value if it carries a close capability.
    pub(crate) fn close(&mut self) -> anyhow::Result<()> {
        match self {
            Slot::Plain(_) => Ok(()),
            Slot::Closeable(value) => value.close_value(),
        }
    }
}
