//! Broker gateway and the TCP transport behind it
//!
//! `send_and_wait` is the caller-facing operation: validate the message's
//! admission-time properties, wrap one exchange attempt as a pool task, and
//! await the completion handle. The handle carries a cancellation guard, so
//! a caller that abandons the future stops further attempts at the next
//! attempt boundary.

use crate::broker::codec;
use crate::config::{BrokerSection, LimitsSection};
use crate::error::{BridgeError, BridgeResult};
use crate::pool::{AttemptFn, Task, WorkerPool};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One request/reply exchange against the broker. The seam the tests mock.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn exchange(&self, payload: Bytes) -> BridgeResult<Bytes>;
}

/// Production transport: a fresh framed TCP connection per exchange.
pub struct TcpBrokerTransport {
    addr: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    ready_timeout: Duration,
}

impl TcpBrokerTransport {
    pub fn new(
        addr: String,
        connect_timeout: Duration,
        io_timeout: Duration,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            addr,
            connect_timeout,
            io_timeout,
            ready_timeout,
        }
    }

    pub fn from_config(config: &BrokerSection) -> BridgeResult<Self> {
        Ok(Self::new(
            config.socket_addr()?,
            config.connect_timeout(),
            config.io_timeout(),
            config.ready_timeout(),
        ))
    }

    /// Poll until the socket reports writability. A connect that lands on a
    /// dead peer still fails within the bounded interval.
    async fn wait_until_ready(&self, stream: &TcpStream) -> BridgeResult<()> {
        let deadline = Instant::now() + self.ready_timeout;
        while Instant::now() < deadline {
            match timeout(READY_POLL_INTERVAL, stream.writable()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    return Err(BridgeError::connection_failed(format!(
                        "socket error while waiting for readiness: {e}"
                    )))
                }
                Err(_) => continue,
            }
        }
        Err(BridgeError::connection_failed(
            "connection never became ready",
        ))
    }
}

#[async_trait]
impl BrokerTransport for TcpBrokerTransport {
    async fn exchange(&self, payload: Bytes) -> BridgeResult<Bytes> {
        debug!(addr = %self.addr, "connecting to broker");
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| BridgeError::connection_failed("connect timed out"))?
            .map_err(|e| BridgeError::connection_failed(format!("{}: {e}", self.addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| BridgeError::connection_failed(format!("set_nodelay failed: {e}")))?;
        self.wait_until_ready(&stream).await?;

        // Connection is scoped to this exchange; dropped on every exit path.
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        timeout(self.io_timeout, framed.send(payload))
            .await
            .map_err(|_| BridgeError::transport("send timed out"))?
            .map_err(|e| BridgeError::transport(format!("send failed: {e}")))?;

        let reply = timeout(self.io_timeout, framed.next())
            .await
            .map_err(|_| BridgeError::transport("receive timed out"))?
            .ok_or_else(|| BridgeError::transport("connection closed before reply"))?
            .map_err(|e| BridgeError::transport(format!("receive failed: {e}")))?;

        Ok(reply.freeze())
    }
}

/// Caller-facing bridge: validates, dispatches to the pool, and blocks the
/// calling task on the completion handle. Explicitly constructed at the
/// composition root and injected where needed.
pub struct BrokerGateway {
    transport: Arc<dyn BrokerTransport>,
    pool: Arc<WorkerPool>,
    max_message_size: usize,
}

impl BrokerGateway {
    pub fn new(
        transport: Arc<dyn BrokerTransport>,
        pool: Arc<WorkerPool>,
        limits: &LimitsSection,
    ) -> Self {
        Self {
            transport,
            pool,
            max_message_size: limits.max_message_size,
        }
    }

    /// Send a message to the broker and wait for the reply.
    ///
    /// Fails without dispatching on `EmptyMessage` (benign) and
    /// `MessageTooLarge`; propagates `QueueFull`/`CircuitOpen` backpressure
    /// from submission; otherwise resolves once a worker finishes the
    /// exchange or exhausts the retry budget. Dropping the returned future
    /// cancels the in-flight task at its next attempt boundary.
    pub async fn send_and_wait(&self, message: &str) -> BridgeResult<String> {
        if message.is_empty() {
            debug!("rejecting empty message");
            return Err(BridgeError::EmptyMessage);
        }
        if message.len() > self.max_message_size {
            warn!(
                size = message.len(),
                max = self.max_message_size,
                "rejecting oversized message"
            );
            return Err(BridgeError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }

        let request_id = Uuid::new_v4();
        let payload = codec::encode_request(message)?;
        let transport = self.transport.clone();
        let attempt: AttemptFn = Box::new(move || {
            let transport = transport.clone();
            let payload = payload.clone();
            Box::pin(async move {
                let reply = transport.exchange(payload).await?;
                codec::decode_reply(&reply)
            })
        });

        let cancel = CancellationToken::new();
        let _abandon_guard = cancel.clone().drop_guard();
        let (done_tx, done_rx) = oneshot::channel();

        debug!(%request_id, size = message.len(), "dispatching message to pool");
        self.pool.submit(Task::new(attempt, done_tx, cancel))?;

        match done_rx.await {
            Ok(result) => {
                match &result {
                    Ok(_) => debug!(%request_id, "broker exchange completed"),
                    Err(e) => debug!(%request_id, error = %e, "broker exchange failed"),
                }
                result
            }
            // Sender dropped without a result: the pool tore down mid-task.
            Err(_) => Err(BridgeError::ShuttingDown),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}
