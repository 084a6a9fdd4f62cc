//! Fatal engine errors.
//!
//! Failures raised by user code during execution are carried as
//! [`Failure`](crate::api::Failure) values and folded into node results;
//! the variants here abort discovery before any test event is emitted.

use thiserror::Error;

/// Errors that abort discovery. No test events are emitted when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad selectors or an unresolvable discovery request.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A test class definition violates a structural rule, e.g. two
    /// hooks with the same name registered for one lifecycle role.
    #[error("invalid test class definition for [{class}]: {message}")]
    Definition { class: String, message: String },

    /// A configuration value failed validation.
    #[error("configuration error for [{key}]: {message}")]
    Configuration { key: String, message: String },

    /// The filter file could not be read or parsed.
    #[error("filter file error: {0}")]
    FilterParse(String),
}

impl EngineError {
    pub fn definition(class: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Definition {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }
}
