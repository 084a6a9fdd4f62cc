//! Verifyica - a parameterized test engine
//!
//! A test class declares a supplier of test arguments; for each argument
//! the engine runs lifecycle hooks and test methods, with configurable
//! parallelism across classes and across arguments within a class.
//! Results stream to an [`ExecutionListener`] and fold into an
//! [`ExecutionSummary`] hosts map to exit codes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use verifyica::{
//!     Arguments, Configuration, DiscoveryRequest, Engine, TestClassDefinition,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let definition = TestClassDefinition::new("CacheTest")
//!     .argument_parallelism(4)
//!     .argument_supplier(|_| Ok(Some(Arguments::values(["local", "remote"]))))
//!     .before_all("connect", |_, context| async move {
//!         context.store().put("connected", true);
//!         Ok(())
//!     })
//!     .test("get", |_, context| async move {
//!         let backend = context.payload::<&str>().unwrap();
//!         tracing::info!("testing against {}", *backend);
//!         Ok(())
//!     })
//!     .after_all("disconnect", |_, _| async { Ok(()) });
//!
//! let engine = Engine::new(Configuration::load()?).register(definition);
//! let summary = engine.execute(&DiscoveryRequest::all()).await?;
//! std::process::exit(summary.exit_code());
//! # }
//! ```

pub mod api;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod listener;
pub mod locks;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod utils;

pub use api::{
    Argument, ArgumentContext, Arguments, AutoClose, ClassContext, EngineContext, Failure,
    HookResult, Instance, SharedMap, Store,
};
pub use config::Configuration;
pub use descriptor::UniqueId;
pub use error::EngineError;
pub use executor::{Engine, ShutdownToken};
pub use interceptor::ClassInterceptor;
pub use listener::{
    CompositeListener, ExecutionEvent, ExecutionListener, RecordingListener, TracingListener,
};
pub use models::{ExecutionSummary, TestExecutionResult, TestStatus};
pub use registry::{TestClassDefinition, TestClassIntrospector, TestMethodDefinition};
pub use resolver::{DiscoveryRequest, DiscoverySelector};
