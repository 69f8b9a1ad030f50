//! The HTTP relay in front of a live in-memory worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use courier_bridge::{
    Bridge, ConsumerLoop, GatewayState, ProcessContext, Processor, ProcessorError,
    ProcessorResponse, router,
};
use courier_nats::{Broker, MemoryBroker};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const QUEUE: &str = "copilot-api";
const TOKEN: &str = "test-token";

/// Echoes what the worker saw back to the caller.
struct Mirror;

#[async_trait]
impl Processor for Mirror {
    async fn process(
        &self,
        ctx: &ProcessContext,
        body: Bytes,
    ) -> Result<ProcessorResponse, ProcessorError> {
        ProcessorResponse::json(
            200,
            &serde_json::json!({
                "method": ctx.method,
                "path": ctx.path,
                "authorization": ctx.header("authorization"),
                "x-team": ctx.header("x-team"),
                "body": String::from_utf8_lossy(&body),
            }),
        )
    }
}

fn app(broker: &MemoryBroker, token: Option<&str>, timeout: Duration) -> axum::Router {
    let bridge = Bridge::new(broker.clone(), timeout);
    router(GatewayState::new(bridge, QUEUE, token.map(String::from)))
}

fn start_worker(broker: &MemoryBroker) -> CancellationToken {
    let cancel = CancellationToken::new();
    let consumer = ConsumerLoop::new(
        broker.clone(),
        QUEUE,
        "workers",
        Arc::new(Mirror),
        Duration::from_secs(5),
    );
    tokio::spawn(consumer.run(cancel.clone()));
    cancel
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn authorized_request_is_relayed() {
    let broker = MemoryBroker::new();
    let cancel = start_worker(&broker);

    let response = app(&broker, Some(TOKEN), Duration::from_secs(5))
        .oneshot(
            Request::post("/api/v1/orgs/acme/teams")
                .header("authorization", format!("Bearer {TOKEN}"))
                .header("x-team", "platform")
                .body(Body::from("{\"name\":\"platform\"}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = json_body(response).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/api/v1/orgs/acme/teams");
    assert_eq!(body["x-team"], "platform");
    assert_eq!(body["authorization"], serde_json::Value::Null);
    assert_eq!(body["body"], "{\"name\":\"platform\"}");
    assert_eq!(broker.live_temporaries(), 0);
    cancel.cancel();
}

#[tokio::test]
async fn missing_or_wrong_token_is_401() {
    let broker = MemoryBroker::new();
    let app = app(&broker, Some(TOKEN), Duration::from_secs(5));

    let missing = app
        .clone()
        .oneshot(Request::get("/api/v1/orgs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let wrong = app
        .oneshot(
            Request::get("/api/v1/orgs")
                .header("authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong).await["error"], "invalid API token");
    assert_eq!(broker.temporaries_declared(), 0);
}

#[tokio::test]
async fn unconfigured_token_is_500() {
    let broker = MemoryBroker::new();

    let response = app(&broker, None, Duration::from_secs(5))
        .oneshot(
            Request::get("/api/v1/orgs")
                .header("authorization", "Bearer anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn no_worker_is_a_gateway_timeout() {
    let broker = MemoryBroker::new();

    let response = app(&broker, Some(TOKEN), Duration::from_secs(30))
        .oneshot(
            Request::get("/api/v1/orgs")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(json_body(response).await["error"].is_string());
    assert_eq!(broker.live_temporaries(), 0);
}

#[tokio::test]
async fn publish_failure_is_500() {
    let broker = MemoryBroker::new();
    broker.fail_next_publishes(1);

    let response = app(&broker, Some(TOKEN), Duration::from_secs(5))
        .oneshot(
            Request::get("/api/v1/orgs")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(broker.live_temporaries(), 0);
}

#[tokio::test]
async fn health_needs_no_token_and_reflects_the_broker() {
    let broker = MemoryBroker::new();
    let app = app(&broker, Some(TOKEN), Duration::from_secs(5));

    let up = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(up.status(), StatusCode::OK);

    broker.close().await;
    let down = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_paths_outside_the_api_are_404() {
    let broker = MemoryBroker::new();

    let response = app(&broker, Some(TOKEN), Duration::from_secs(5))
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
