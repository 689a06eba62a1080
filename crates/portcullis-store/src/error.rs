//! Store error types.
//!
//! Every failure reaching the shared store is reported through [`StoreError`].
//! Callers on the admission path treat all of them as "store unavailable":
//! the rate limiter fails open and the authentication cache falls back to
//! direct validation.

/// Errors that can occur while talking to the shared state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No connection could be obtained (pool exhausted, server down).
    #[error("Store connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The store accepted the connection but the command failed.
    #[error("Store command error: {message}")]
    Command {
        /// Description of the command failure.
        message: String,
    },

    /// The operation did not complete within the configured bound.
    #[error("Store operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// The bound that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The store returned a value of an unexpected shape.
    #[error("Store value error: {message}")]
    Value {
        /// Description of the value problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Command` error.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates a new `Value` error.
    #[must_use]
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the store could not be reached at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::connection(err.to_string())
        } else if err.is_timeout() {
            Self::connection(format!("redis timeout: {err}"))
        } else {
            Self::command(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::connection(err.to_string())
    }
}

/// Type alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = StoreError::Timeout {
            operation: "incr_with_expiry",
            timeout_ms: 250,
        };
        assert_eq!(
            err.to_string(),
            "Store operation 'incr_with_expiry' timed out after 250ms"
        );
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_command_error_is_not_unavailable() {
        let err = StoreError::command("WRONGTYPE");
        assert!(!err.is_unavailable());
        assert!(StoreError::connection("refused").is_unavailable());
    }
}
