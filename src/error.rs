//! Error types for the bridge
//!
//! Every failure a caller can observe flows through [`BridgeError`]. The
//! taxonomy separates caller faults (rejected before any work is queued)
//! from backpressure signals and backend faults, because the HTTP boundary
//! and the retry machinery both branch on that distinction.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed payload: bad UTF-8, control characters, oversized raw body
    /// or wrong JSON shape. Always the caller's fault, never retried.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Empty message. A benign denial rather than a hard failure; callers
    /// branch on this variant instead of a boolean result.
    #[error("Empty message")]
    EmptyMessage,

    /// Message exceeds the configured maximum, checked before any queueing.
    #[error("Message size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    MessageTooLarge { size: usize, max: usize },

    /// Task queue at capacity. Backpressure; the caller should try later.
    #[error("Task queue is full")]
    QueueFull,

    /// Circuit breaker is open. Backpressure; the caller should try later.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Client exceeded its rate-limit window.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Broker connection could not be established or never became ready.
    #[error("Broker connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Send/receive failure mid-exchange.
    #[error("Broker transport error: {message}")]
    Transport { message: String },

    /// Delivered to completion handles outstanding past shutdown so no
    /// caller hangs on a drained task.
    #[error("Gateway is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BridgeError {
    /// Create an invalid-input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a connection-failed error
    pub fn connection_failed<S: Into<String>>(message: S) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether the worker pool may retry the failed exchange. Only backend
    /// faults qualify; caller faults and backpressure are surfaced as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed { .. } | BridgeError::Transport { .. }
        )
    }

    /// Stable machine-readable code for the HTTP error payload.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidInput { .. } => "invalid_input",
            BridgeError::EmptyMessage => "empty_message",
            BridgeError::MessageTooLarge { .. } => "message_too_large",
            BridgeError::QueueFull => "queue_full",
            BridgeError::CircuitOpen => "circuit_open",
            BridgeError::RateLimited => "rate_limited",
            BridgeError::ConnectionFailed { .. } => "connection_failed",
            BridgeError::Transport { .. } => "transport_error",
            BridgeError::ShuttingDown => "shutting_down",
            BridgeError::Config(_) => "config_error",
        }
    }

    /// HTTP status the boundary reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            BridgeError::InvalidInput { .. } | BridgeError::EmptyMessage => 400,
            BridgeError::MessageTooLarge { .. } => 413,
            BridgeError::RateLimited => 429,
            BridgeError::QueueFull | BridgeError::CircuitOpen | BridgeError::ShuttingDown => 503,
            BridgeError::ConnectionFailed { .. } | BridgeError::Transport { .. } => 502,
            BridgeError::Config(_) => 500,
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::connection_failed("refused").is_retryable());
        assert!(BridgeError::transport("recv timed out").is_retryable());

        assert!(!BridgeError::invalid_input("bad json").is_retryable());
        assert!(!BridgeError::EmptyMessage.is_retryable());
        assert!(!BridgeError::QueueFull.is_retryable());
        assert!(!BridgeError::CircuitOpen.is_retryable());
        assert!(!BridgeError::RateLimited.is_retryable());
        assert!(!BridgeError::ShuttingDown.is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(BridgeError::EmptyMessage.http_status(), 400);
        assert_eq!(
            BridgeError::MessageTooLarge { size: 2, max: 1 }.http_status(),
            413
        );
        assert_eq!(BridgeError::RateLimited.http_status(), 429);
        assert_eq!(BridgeError::QueueFull.http_status(), 503);
        assert_eq!(BridgeError::CircuitOpen.http_status(), 503);
        assert_eq!(BridgeError::connection_failed("x").http_status(), 502);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = BridgeError::MessageTooLarge {
            size: 2_097_152,
            max: 1_048_576,
        };
        let text = err.to_string();
        assert!(text.contains("2097152"));
        assert!(text.contains("1048576"));

        let err = BridgeError::invalid_input("missing required 'message' field");
        assert_eq!(
            err.to_string(),
            "Invalid input: missing required 'message' field"
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::QueueFull.code(), "queue_full");
        assert_eq!(BridgeError::CircuitOpen.code(), "circuit_open");
        assert_eq!(BridgeError::ShuttingDown.code(), "shutting_down");
    }
}
