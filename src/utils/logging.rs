//! Logging bootstrap
//!
//! Optional tracing setup for hosts and tests embedding the engine.
//! The engine itself only emits `tracing` events and never installs a
//! subscriber on its own.

use tracing_subscriber::EnvFilter;

/// Initialize compact tracing output. The level acts as the default for
/// this crate's events; `RUST_LOG` still overrides. Safe to call more
/// than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("verifyica={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug");
        init_logging("trace");
    }
}
