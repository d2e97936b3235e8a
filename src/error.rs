//! Error types for the Whirl timer wheel.
//!
//! Whirl follows a report-and-continue model: bad arguments and unknown ids
//! are logged and surfaced as errors, over-range delays are clamped rather
//! than rejected, and nothing in the crate retries internally.

use crate::record::TimerId;

/// Result type alias for Whirl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for timer wheel operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A registration or mutation was called with an invalid argument
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Descriptive error message
        message: String,
    },

    /// A mutator referenced an id that is not (or no longer) registered
    #[error("unknown timer id {id}")]
    UnknownTimer {
        /// The offending timer id
        id: TimerId,
    },

    /// A registration collided with an already-registered id
    #[error("timer id {id} is already registered")]
    DuplicateTimer {
        /// The colliding timer id
        id: TimerId,
    },

    /// A capacity limit was reached
    #[error("resource exhausted: {resource}")]
    ResourceExhausted {
        /// The exhausted resource type
        resource: String,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config {
        /// Descriptive error message
        message: String,
    },

    /// The scheduler side of a [`TimerHandle`](crate::handle::TimerHandle) is gone
    #[error("timer wheel disconnected")]
    Disconnected,

    /// A timer callback reported a failure
    #[error("callback error: {message}")]
    Callback {
        /// Descriptive error message
        message: String,
    },
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unknown-timer error
    pub fn unknown_timer(id: TimerId) -> Self {
        Self::UnknownTimer { id }
    }

    /// Create a duplicate-timer error
    pub fn duplicate_timer(id: TimerId) -> Self {
        Self::DuplicateTimer { id }
    }

    /// Create a resource exhaustion error
    pub fn resource_exhausted<S: Into<String>>(resource: S) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a callback error
    pub fn callback<S: Into<String>>(message: S) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Get error category for logging and monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "argument",
            Self::UnknownTimer { .. } => "unknown",
            Self::DuplicateTimer { .. } => "duplicate",
            Self::ResourceExhausted { .. } => "resource",
            Self::Config { .. } => "config",
            Self::Disconnected => "disconnected",
            Self::Callback { .. } => "callback",
        }
    }
}
