//! Error types shared by every coworkers crate.
//!
//! [`CoworkersError`] is the single error enum the rest of the framework
//! returns. It does not carry an HTTP status mapping -- there is no HTTP
//! surface here -- but it otherwise follows the same shape as the error
//! type the rest of this codebase uses: named variants, constructor
//! functions, and a `#[source]` chain for anything wrapping a collaborator
//! failure.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`CoworkersError`].
pub type CoworkersResult<T> = Result<T, CoworkersError>;

/// Standard error type for the coworkers framework.
///
/// `Clone` via `Arc`-wrapped sources (rather than `Box`) so the lifecycle
/// coordinator can hand the same outcome to every caller awaiting a shared
/// `connect`/`close` in flight (see `coworkers-app`), not just the one that
/// happened to drive the operation to completion.
#[derive(Error, Debug, Clone)]
pub enum CoworkersError {
    /// An argument to `use`/`queue`/`connect` failed synchronous validation.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description of what was invalid.
        message: String,
    },

    /// A queue name was registered more than once.
    #[error("queue '{name}' is already registered")]
    AlreadyExists {
        /// The duplicate queue name.
        name: String,
    },

    /// The queue registry's schema collaborator rejected a queue entry.
    #[error("schema violation for queue '{name}': {message}")]
    SchemaViolation {
        /// The offending queue name.
        name: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The broker transport collaborator failed.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// A `connect`/`close` call was interrupted by the opposite operation.
    #[error("{message}")]
    CancelledByPeer {
        /// Human-readable description, e.g. naming which peer operation cancelled this one.
        message: String,
        /// The peer operation's own error, if it failed.
        #[source]
        peer_error: Option<Arc<CoworkersError>>,
    },

    /// A middleware invoked its `next` continuation more than once.
    #[error("middleware '{middleware}' invoked next() more than once")]
    PipelineMisuse {
        /// The name of the offending middleware.
        middleware: &'static str,
    },
}

impl CoworkersError {
    /// Creates a validation error with a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an "already exists" error for a queue name.
    #[must_use]
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Creates a schema violation error.
    #[must_use]
    pub fn schema_violation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error with no underlying source.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping a collaborator failure.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a `CancelledByPeer` error for a `connect` cancelled by a pending `close`.
    #[must_use]
    pub fn connect_cancelled_by_close(close_err: Option<Self>) -> Self {
        Self::CancelledByPeer {
            message: match &close_err {
                Some(err) => format!("Connect cancelled because pending close failed ({err})"),
                None => "Connect cancelled because pending close failed".to_string(),
            },
            peer_error: close_err.map(Arc::new),
        }
    }

    /// Creates a `CancelledByPeer` error for a `close` cancelled by a pending `connect`.
    #[must_use]
    pub fn close_cancelled_by_connect(connect_err: Option<Self>) -> Self {
        Self::CancelledByPeer {
            message: match &connect_err {
                Some(err) => format!("Close cancelled because pending connect failed ({err})"),
                None => "Close cancelled because pending connect failed".to_string(),
            },
            peer_error: connect_err.map(Arc::new),
        }
    }

    /// Creates a `PipelineMisuse` error naming the offending middleware.
    #[must_use]
    pub const fn pipeline_misuse(middleware: &'static str) -> Self {
        Self::PipelineMisuse { middleware }
    }

    /// Returns a short machine-readable kind name, used in `tracing` fields and tests.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::AlreadyExists { .. } => "already_exists",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Transport { .. } => "transport_error",
            Self::CancelledByPeer { .. } => "cancelled_by_peer",
            Self::PipelineMisuse { .. } => "pipeline_misuse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_message() {
        let err = CoworkersError::validation("queue name must not be empty");
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("queue name must not be empty"));
    }

    #[test]
    fn already_exists_names_the_queue() {
        let err = CoworkersError::already_exists("orders");
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn connect_cancelled_by_close_embeds_peer_message() {
        let close_err = CoworkersError::transport("socket reset");
        let err = CoworkersError::connect_cancelled_by_close(Some(close_err));
        assert_eq!(err.kind(), "cancelled_by_peer");
        assert!(err.to_string().contains("socket reset"));
    }

    #[test]
    fn pipeline_misuse_names_the_middleware() {
        let err = CoworkersError::pipeline_misuse("auth_guard");
        assert!(err.to_string().contains("auth_guard"));
    }
}
