//! Gateway and worker over a real NATS server.
//!
//! Requires Docker:
//!   cargo test -p courier-copilot --test nats_round_trip -- --ignored

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use courier_bridge::{Bridge, GatewayState, ProcessorRegistry, WorkerPool, router};
use courier_copilot::{CopilotApi, GithubClient, LicenseError, LicenseMirror, LicenseSource};
use courier_nats::{Broker, NatsBroker, NatsConfig, connect};
use http_body_util::BodyExt;
use testcontainers_modules::nats::Nats;
use testcontainers_modules::testcontainers::{ImageExt, runners::AsyncRunner};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct NoLicenses;

impl LicenseSource for NoLicenses {
    async fn fetch(&self) -> Result<HashMap<String, i64>, LicenseError> {
        Ok(HashMap::new())
    }

    async fn write(&self, _org: &str, _count: i64) -> Result<(), LicenseError> {
        Ok(())
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn healthcheck_round_trips_over_jetstream() {
    let container = Nats::default()
        .with_cmd(["--jetstream"])
        .start()
        .await
        .expect("failed to start NATS container, is Docker running?");
    let port = container.get_host_port_ipv4(4222).await.unwrap();
    let client = connect(
        &NatsConfig::from_url(format!("localhost:{port}")),
        Duration::from_secs(10),
    )
    .await
    .expect("connect");
    let broker = NatsBroker::new(client, "courier-e2e");

    let github = GithubClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "unused").unwrap();
    let api = CopilotApi::new(github, Arc::new(LicenseMirror::new(NoLicenses)));
    let mut registry = ProcessorRegistry::new();
    registry.register("copilot-api", Arc::new(api)).unwrap();

    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(broker.clone(), registry, "e2e-workers", Duration::from_secs(5))
        .spawn(cancel.clone());

    let app = router(GatewayState::new(
        Bridge::new(broker.clone(), Duration::from_secs(10)),
        "copilot-api",
        Some("token".to_string()),
    ));
    let response = app
        .oneshot(
            Request::get("/api/v1/healthcheck")
                .header("authorization", "Bearer token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({ "status": "healthy" })
    );

    cancel.cancel();
    pool.join().await.unwrap();
    broker.close().await;
}
