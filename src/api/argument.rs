//! Test arguments
//!
//! An argument is a named payload produced by a class's argument
//! supplier. Each argument is consumed by exactly one argument-level
//! subtree of the execution.

use std::any::Any;
use std::fmt;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use super::value::Slot;
use super::AutoClose;

/// A named, type-erased test argument payload.
pub struct Argument {
    name: String,
    payload: Mutex<Option<Slot>>,
}

impl Argument {
    /// Create an argument from a plain payload.
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, payload: T) -> Self {
        Self::from_slot(name, Slot::plain(payload))
    }

    /// Create an argument whose payload is closed by the engine after
    /// `afterAll` for the argument has run.
    pub fn closeable<T: Any + AutoClose + Send + Sync>(name: impl Into<String>, payload: T) -> Self {
        Self::from_slot(name, Slot::closeable(payload))
    }

    fn from_slot(name: impl Into<String>, slot: Slot) -> Self {
        Self {
            name: name.into(),
            payload: Mutex::new(Some(slot)),
        }
    }

    pub(crate) fn from_boxed(name: impl Into<String>, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self::from_slot(name, Slot::Plain(payload))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the payload as `T`. Returns `None` if the payload has a
    /// different type or has already been closed.
    pub fn payload<T: Any>(&self) -> Option<MappedMutexGuard<'_, T>> {
        let guard = self.payload.lock();
        MutexGuard::try_map(guard, |slot| {
            slot.as_mut().and_then(|slot| slot.downcast_mut::<T>())
        })
        .ok()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.lock().is_some()
    }

    /// Take the payload out and close it if it is closeable. Idempotent.
    pub(crate) fn close(&self) -> anyhow::Result<()> {
        let slot = self.payload.lock().take();
        match slot {
            Some(mut slot) => slot.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("has_payload", &self.has_payload())
            .finish()
    }
}

/// The shapes an argument supplier may return.
///
/// Raw values are normalized by the resolver: a non-`Argument` element at
/// index `i` becomes `Argument("argument[i]", value)`.
pub enum Arguments {
    Single(Argument),
    List(Vec<Argument>),
    Values(Vec<Box<dyn Any + Send + Sync>>),
}

impl Arguments {
    pub fn single(argument: Argument) -> Self {
        Arguments::Single(argument)
    }

    pub fn list(arguments: impl IntoIterator<Item = Argument>) -> Self {
        Arguments::List(arguments.into_iter().collect())
    }

    /// Raw payloads, named `argument[i]` during normalization.
    pub fn values<T: Any + Send + Sync>(values: impl IntoIterator<Item = T>) -> Self {
        Arguments::Values(
            values
                .into_iter()
                .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
                .collect(),
        )
    }

    /// Normalize to a flat list of named arguments.
    pub(crate) fn normalize(self) -> Vec<Argument> {
        match self {
            Arguments::Single(argument) => vec![argument],
            Arguments::List(arguments) => arguments,
            Arguments::Values(values) => values
                .into_iter()
                .enumerate()
                .map(|(index, value)| match value.downcast::<Argument>() {
                    Ok(argument) => *argument,
                    Err(value) => Argument::from_boxed(format!("argument[{index}]"), value),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Closer {
        closed: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl AutoClose for Closer {
        fn close(&mut self) -> anyhow::Result<()> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_payload_downcast() {
        let argument = Argument::new("a", 42u32);
        assert_eq!(*argument.payload::<u32>().unwrap(), 42);
        assert!(argument.payload::<String>().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let argument = Argument::closeable(
            "resource",
            Closer {
                closed: closed.clone(),
            },
        );

        argument.close().unwrap();
        argument.close().unwrap();

        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!argument.has_payload());
    }

    #[test]
    fn test_values_are_named_by_index() {
        let arguments = Arguments::values(["x", "y"]).normalize();
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[0].name(), "argument[0]");
        assert_eq!(arguments[1].name(), "argument[1]");
        assert_eq!(*arguments[1].payload::<&str>().unwrap(), "y");
    }

    #[test]
    fn test_raw_argument_element_keeps_its_name() {
        let arguments = Arguments::Values(vec![
            Box::new(Argument::new("named", 1u8)),
            Box::new(2u8),
        ])
        .normalize();

        assert_eq!(arguments[0].name(), "named");
        assert_eq!(arguments[1].name(), "argument[1]");
    }
}
