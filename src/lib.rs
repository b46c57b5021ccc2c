//! agent-bridge: a resilient HTTP-to-broker gateway
//!
//! Accepts inbound HTTP requests and forwards each as a synchronous round
//! trip to a backend worker reachable only through a request/reply broker
//! socket. Many concurrent callers are multiplexed onto a bounded worker
//! pool; a circuit breaker and per-client rate limiter protect the backend
//! from overload and absorb transient failures.
//!
//! # Pipeline
//!
//! ```text
//! caller → RateLimiter::check → validate_message
//!        → BrokerGateway::send_and_wait
//!        → WorkerPool (bounded queue, retry/backoff, breaker reporting)
//!        → framed TCP exchange with the broker
//!        → reply delivered to the caller's completion handle
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agent_bridge::breaker::CircuitBreaker;
//! use agent_bridge::broker::{BrokerGateway, TcpBrokerTransport};
//! use agent_bridge::config::BridgeConfig;
//! use agent_bridge::pool::{RetryPolicy, WorkerPool};
//! use std::sync::Arc;
//!
//! # async fn run() -> agent_bridge::BridgeResult<()> {
//! let config = BridgeConfig::default();
//! let breaker = Arc::new(CircuitBreaker::from_config(&config.breaker));
//! let pool = Arc::new(WorkerPool::new(
//!     config.pool.effective_workers(),
//!     config.pool.effective_queue_capacity(),
//!     RetryPolicy::from_config(&config.pool),
//!     breaker,
//! ));
//! let transport = Arc::new(TcpBrokerTransport::from_config(&config.broker)?);
//! let gateway = BrokerGateway::new(transport, pool, &config.limits);
//!
//! let reply = gateway.send_and_wait("hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod broker;
pub mod config;
pub mod error;
pub mod limiter;
pub mod observability;
pub mod pool;
pub mod server;
pub mod testing;
pub mod validate;

pub use breaker::CircuitBreaker;
pub use broker::{BrokerGateway, BrokerTransport, TcpBrokerTransport};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use limiter::RateLimiter;
pub use pool::{RetryPolicy, Task, WorkerPool};
