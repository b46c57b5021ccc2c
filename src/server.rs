//! HTTP boundary for the bridge
//!
//! Thin by design: admission (rate limit), validation, dispatch, and a
//! structured reply. Every failure maps through the error taxonomy to a
//! JSON payload and a status code; nothing propagates as an unhandled
//! rejection. Probe endpoints follow the usual orchestration conventions.

use crate::broker::BrokerGateway;
use crate::error::BridgeError;
use crate::limiter::RateLimiter;
use crate::observability::metrics::metrics;
use crate::validate::validate_message;
use bytes::Bytes;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::Filter;

/// Shared state injected into every handler
pub struct AppState {
    pub gateway: Arc<BrokerGateway>,
    pub limiter: Arc<RateLimiter>,
    pub max_message_size: usize,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    queue_depth: usize,
    breaker_failures: u32,
    breaker_open: bool,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
}

/// Build the full route tree.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let message_state = state.clone();
    // Body cap is a coarse guard; the validator enforces the exact limit
    // with a structured error.
    let body_limit = (state.max_message_size as u64).saturating_mul(2);
    let message_route = warp::path!("api" / "message")
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::addr::remote())
        .and(warp::body::bytes())
        .and_then(move |addr: Option<SocketAddr>, body: Bytes| {
            let state = message_state.clone();
            async move { handle_message(state, addr, body).await }
        });

    let health_state = state.clone();
    let health_route = warp::path("health").and(warp::get()).and_then(move || {
        let state = health_state.clone();
        async move {
            let pool = state.gateway.pool();
            let breaker = pool.breaker();
            let response = HealthResponse {
                status: "ok",
                queue_depth: pool.queue_depth(),
                breaker_failures: breaker.failure_count(),
                breaker_open: breaker.is_open(),
            };
            Ok::<_, Infallible>(warp::reply::json(&response))
        }
    });

    let live_route = warp::path("live").and(warp::get()).and_then(|| async {
        Ok::<_, Infallible>(warp::reply::json(&LivenessResponse { alive: true }))
    });

    let metrics_route = warp::path("metrics").and(warp::get()).and_then(|| async {
        Ok::<_, Infallible>(warp::reply::json(&metrics().snapshot()))
    });

    message_route
        .or(health_route)
        .or(live_route)
        .or(metrics_route)
}

async fn handle_message(
    state: Arc<AppState>,
    addr: Option<SocketAddr>,
    body: Bytes,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, Infallible> {
    metrics().record_request();
    let client_id = addr
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.limiter.check(&client_id) {
        metrics().record_rate_limited();
        debug!(client_id, "request denied by rate limiter");
        return Ok(error_reply(&BridgeError::RateLimited));
    }

    let message = match validate_message(&body, state.max_message_size) {
        Ok(message) => message,
        Err(e) => {
            metrics().record_validation_failure();
            debug!(client_id, error = %e, "request failed validation");
            return Ok(error_reply(&e));
        }
    };

    match state.gateway.send_and_wait(&message).await {
        Ok(response) => {
            metrics().record_success();
            Ok(warp::reply::with_status(
                warp::reply::json(&MessageResponse { response }),
                StatusCode::OK,
            ))
        }
        Err(e) => {
            metrics().record_rejected();
            match &e {
                // Benign denial; the caller branches on this differently.
                BridgeError::EmptyMessage => debug!(client_id, "empty message denied"),
                other => warn!(client_id, error = %other, "dispatch failed"),
            }
            Ok(error_reply(&e))
        }
    }
}

fn error_reply(error: &BridgeError) -> warp::reply::WithStatus<warp::reply::Json> {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            error: error.to_string(),
            code: error.code(),
        }),
        status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitBreaker;
    use crate::config::LimitsSection;
    use crate::pool::{RetryPolicy, WorkerPool};
    use crate::testing::mocks::MockBrokerTransport;
    use std::time::Duration;

    fn test_state(transport: MockBrokerTransport, rate_cap: usize) -> Arc<AppState> {
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(30)));
        let pool = Arc::new(WorkerPool::new(
            2,
            4,
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            breaker,
        ));
        let limits = LimitsSection {
            max_message_size: 1024,
        };
        Arc::new(AppState {
            gateway: Arc::new(BrokerGateway::new(Arc::new(transport), pool, &limits)),
            limiter: Arc::new(RateLimiter::new(rate_cap, Duration::from_secs(1), 100)),
            max_message_size: limits.max_message_size,
        })
    }

    #[tokio::test]
    async fn test_message_round_trip() {
        let state = test_state(MockBrokerTransport::always_reply("Received message: hello"), 100);
        let filter = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/message")
            .body(r#"{"message":"hello"}"#)
            .reply(&filter)
            .await;

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["response"], "Received message: hello");
    }

    #[tokio::test]
    async fn test_invalid_json_rejected_with_400() {
        let state = test_state(MockBrokerTransport::always_reply("unused"), 100);
        let filter = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/message")
            .body("{not json")
            .reply(&filter)
            .await;

        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "invalid_input");
    }

    #[tokio::test]
    async fn test_missing_message_field_rejected() {
        let state = test_state(MockBrokerTransport::always_reply("unused"), 100);
        let filter = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/message")
            .body(r#"{"msg":"hello"}"#)
            .reply(&filter)
            .await;

        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_rate_limit_denies_with_429() {
        let state = test_state(MockBrokerTransport::always_reply("Received message: hi"), 2);
        let filter = routes(state);

        for _ in 0..2 {
            let resp = warp::test::request()
                .method("POST")
                .path("/api/message")
                .body(r#"{"message":"hi"}"#)
                .reply(&filter)
                .await;
            assert_eq!(resp.status(), 200);
        }

        let resp = warp::test::request()
            .method("POST")
            .path("/api/message")
            .body(r#"{"message":"hi"}"#)
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), 429);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "rate_limited");
    }

    #[tokio::test]
    async fn test_broker_failure_maps_to_502() {
        let state = test_state(MockBrokerTransport::always_fail(), 100);
        let filter = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/message")
            .body(r#"{"message":"hi"}"#)
            .reply(&filter)
            .await;

        assert_eq!(resp.status(), 502);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "transport_error");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = test_state(MockBrokerTransport::always_reply("unused"), 100);
        let filter = routes(state);

        let resp = warp::test::request().path("/health").reply(&filter).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["breaker_open"], false);
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let state = test_state(MockBrokerTransport::always_reply("unused"), 100);
        let filter = routes(state);

        let resp = warp::test::request().path("/live").reply(&filter).await;
        assert_eq!(resp.status(), 200);
    }
}
