//! Broker gateway: the request/reply bridge to the backend worker
//!
//! One exchange per connection. A request is framed, sent, and answered on a
//! fresh socket that is torn down when the attempt ends, whatever the
//! outcome. Retries happen one level up, in the worker pool.

pub mod client;
pub mod codec;

pub use client::{BrokerGateway, BrokerTransport, TcpBrokerTransport};
