//! Worker binary.
//!
//! Consumes the work queue with the Copilot invite API and publishes each
//! response to the reply channel named in the request.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NATS_URL` | `localhost:4222` | NATS server address(es) |
//! | `COURIER_PREFIX` | `courier` | Subject prefix |
//! | `COURIER_WORK_QUEUE` | `copilot-api` | Queue to consume |
//! | `COURIER_CONSUMER_NAME` | `courier-workers` | Durable consumer name |
//! | `COURIER_PROCESSOR_TIMEOUT_SECS` | `25` | Budget per request |
//! | `COURIER_HEALTH_INTERVAL_SECS` | `10` | Broker probe interval |
//! | `COURIER_KEY_FILE` | `.encryption_key` | Key for `ENC[...]` values |
//! | `GITHUB_TOKEN` / `GITHUB_API_URL` | / `https://api.github.com` | GitHub access |
//! | `SMARTSHEET_TOKEN` / `SMARTSHEET_SHEET_ID` / `SMARTSHEET_API_URL` | | License sheet |
//! | `RUST_LOG` | `info` | Log filter |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use courier_bridge::{ProcessorRegistry, WorkerPool};
use courier_copilot::{
    CopilotApi, GithubClient, HealthTicker, LicenseMirror, SmartsheetSource, WorkerConfig, signal,
    telemetry,
};
use courier_nats::{Broker, NatsBroker, connect};
use courier_secrets::{Cipher, SecretStore, load_or_generate};
use courier_std::{SystemEnv, SystemFs};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);
/// Added to the processor budget to get the broker's redelivery window.
const ACK_WAIT_MARGIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let tracer_provider = telemetry::init_tracing("courier-worker");

    let config = WorkerConfig::from_env(&SystemEnv);

    let key = load_or_generate(&SystemFs, &config.key_file)
        .with_context(|| format!("loading encryption key {}", config.key_file.display()))?;
    let secrets = SecretStore::new(SystemEnv, Cipher::new(key));
    let github_token = secrets.require("GITHUB_TOKEN")?;
    let smartsheet_token = secrets.require("SMARTSHEET_TOKEN")?;
    let sheet_id = config
        .sheet_id
        .clone()
        .context("SMARTSHEET_SHEET_ID is not set")?;

    let http = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .context("building HTTP client")?;
    let github = GithubClient::new(http.clone(), &config.github_api_url, github_token)?;
    let source = SmartsheetSource::new(http, &config.smartsheet_api_url, &sheet_id, smartsheet_token)?;
    let licenses = Arc::new(LicenseMirror::new(source));
    if let Err(error) = licenses.refresh().await {
        warn!(%error, "initial license refresh failed; counts load on first use");
    }

    let mut registry = ProcessorRegistry::new();
    registry.register(
        config.bridge.work_queue.clone(),
        Arc::new(CopilotApi::new(github, licenses)),
    )?;

    info!(servers = ?config.nats.servers, "connecting to NATS");
    let client = connect(&config.nats, CONNECT_TIMEOUT)
        .await
        .context("connecting to NATS")?;
    let broker = NatsBroker::new(client, config.bridge.prefix.clone())
        .with_ack_wait(config.bridge.processor_timeout + ACK_WAIT_MARGIN);

    let cancel = CancellationToken::new();
    let shutdown = signal::cancel_on_shutdown(cancel.clone());
    let health = HealthTicker::new(config.health_interval).spawn(broker.clone(), cancel.clone());

    info!(
        prefix = %config.bridge.prefix,
        queue = %config.bridge.work_queue,
        consumer = %config.bridge.consumer_name,
        "worker starting"
    );
    let pool = WorkerPool::new(
        broker.clone(),
        registry,
        config.bridge.consumer_name.clone(),
        config.bridge.processor_timeout,
    )
    .spawn(cancel.clone());

    let consumed = pool.join().await;

    cancel.cancel();
    let _ = shutdown.await;
    if let Ok(report) = health.await {
        info!(probes = report.probes, failures = report.failures, "health ticker stopped");
    }
    broker.close().await;
    info!("worker stopped");
    telemetry::shutdown_tracing(&tracer_provider);

    consumed.context("consuming work queue")
}
