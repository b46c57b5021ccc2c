//! Mock implementations for testing
//!
//! `MockBrokerTransport` scripts exchange outcomes so unit and integration
//! tests can drive the pool, breaker, and gateway deterministically.

use crate::broker::BrokerTransport;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

enum Behavior {
    /// Reply with the fixed text on every exchange.
    AlwaysReply(String),
    /// Fail every exchange with a transport error.
    AlwaysFail,
    /// Fail the first `n` exchanges, then reply with the fixed text.
    FailThenReply(usize, String),
}

/// Scripted broker transport with call counting
pub struct MockBrokerTransport {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl MockBrokerTransport {
    pub fn always_reply<S: Into<String>>(reply: S) -> Self {
        Self {
            behavior: Behavior::AlwaysReply(reply.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always_fail() -> Self {
        Self {
            behavior: Behavior::AlwaysFail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_then_reply<S: Into<String>>(failures: usize, reply: S) -> Self {
        Self {
            behavior: Behavior::FailThenReply(failures, reply.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared exchange counter; clone before moving the mock into the
    /// gateway.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl BrokerTransport for MockBrokerTransport {
    async fn exchange(&self, _payload: Bytes) -> BridgeResult<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::AlwaysReply(reply) => Ok(Bytes::from(reply.clone())),
            Behavior::AlwaysFail => Err(BridgeError::transport("mock exchange failure")),
            Behavior::FailThenReply(failures, reply) => {
                if call < *failures {
                    Err(BridgeError::transport("mock exchange failure"))
                } else {
                    Ok(Bytes::from(reply.clone()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_then_reply_script() {
        let mock = MockBrokerTransport::fail_then_reply(2, "ok");
        assert!(mock.exchange(Bytes::new()).await.is_err());
        assert!(mock.exchange(Bytes::new()).await.is_err());
        assert_eq!(mock.exchange(Bytes::new()).await.unwrap(), Bytes::from("ok"));
        assert_eq!(mock.call_count().load(Ordering::SeqCst), 3);
    }
}
