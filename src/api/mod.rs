//! User-facing API surface
//!
//! Types a test class author interacts with: arguments, failures,
//! stores, contexts, and the function shapes the engine invokes.

mod argument;
mod context;
mod failure;
mod store;
mod value;

pub use argument::{Argument, Arguments};
pub use context::{ArgumentContext, ClassContext, EngineContext};
pub use failure::Failure;
pub use store::{SharedMap, Store};
pub use value::AutoClose;

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;

/// A test class instance, created once per class by the instantiation
/// pipeline and shared by every argument worker.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Result of a single user hook or test body.
pub type HookResult = Result<(), Failure>;

/// A class-scoped lifecycle hook (`prepare` / `conclude`). These run
/// without a test instance.
pub type ClassHookFn = Arc<dyn Fn(ClassContext) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// An argument-scoped lifecycle hook or test body
/// (`beforeAll` / `beforeEach` / test / `afterEach` / `afterAll`).
pub type ArgumentHookFn =
    Arc<dyn Fn(Instance, ArgumentContext) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// The argument supplier for a test class. Returning `Ok(None)` prunes
/// the class from the descriptor tree.
pub type ArgumentSupplierFn =
    Arc<dyn Fn(&EngineContext) -> Result<Option<Arguments>, Failure> + Send + Sync>;

/// Factory for the per-class test instance.
pub type InstanceFactoryFn =
    Arc<dyn Fn(&ClassContext) -> Result<Instance, Failure> + Send + Sync>;
