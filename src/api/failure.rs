//! Failure values surfaced by user lifecycle and test code.

use std::fmt;
use std::sync::Arc;

/// Outcome of a user hook or test body that did not complete normally.
///
/// A skip request is data, not an error: it marks the surrounding test
/// as aborted rather than failed, and teardown still runs.
#[derive(Clone, Debug)]
pub enum Failure {
    /// Abort-not-fail request raised by user code.
    Skip(Option<String>),

    /// A user error. Shared so the same failure can appear in the state
    /// trace, the listener event, and the summary.
    Error(Arc<anyhow::Error>),
}

impl Failure {
    /// Skip the current test without a reason.
    pub fn skip() -> Self {
        Failure::Skip(None)
    }

    /// Skip the current test with a reason.
    pub fn skip_because(reason: impl Into<String>) -> Self {
        Failure::Skip(Some(reason.into()))
    }

    /// A failure carrying a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Failure::Error(Arc::new(anyhow::anyhow!(message.into())))
    }

    /// Skip if `condition` holds, otherwise continue.
    pub fn skip_if(condition: bool, reason: impl Into<String>) -> Result<(), Failure> {
        if condition {
            Err(Failure::skip_because(reason))
        } else {
            Ok(())
        }
    }

    /// Skip unless `condition` holds.
    pub fn skip_unless(condition: bool, reason: impl Into<String>) -> Result<(), Failure> {
        Failure::skip_if(!condition, reason)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Failure::Skip(_))
    }

    /// The skip reason, if this is a skip request.
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Failure::Skip(reason) => reason.as_deref(),
            Failure::Error(_) => None,
        }
    }

    /// The underlying error, if this is an error.
    pub fn error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            Failure::Skip(_) => None,
            Failure::Error(error) => Some(error),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Skip(Some(reason)) => write!(f, "skipped: {reason}"),
            Failure::Skip(None) => write!(f, "skipped"),
            Failure::Error(error) => write!(f, "{error}"),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Failure::Error(Arc::new(error))
    }
}
