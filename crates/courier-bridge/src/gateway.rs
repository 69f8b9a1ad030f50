//! HTTP front door: authenticates callers and relays `/api/v1/*` requests
//! over the bridge.

use crate::bridge::Bridge;
use crate::envelope::{ResponseEnvelope, flatten_headers};
use crate::error::BridgeError;
use crate::publisher::OutboundRequest;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use courier_nats::Broker;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, instrument, warn};

const BEARER_SCHEME: &str = "Bearer";

#[derive(Clone)]
pub struct GatewayState<B> {
    bridge: Bridge<B>,
    queue: Arc<str>,
    api_token: Option<Arc<str>>,
}

impl<B: Broker> GatewayState<B> {
    /// Without an `api_token` every `/api/v1` request is refused with a 500.
    pub fn new(bridge: Bridge<B>, queue: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            bridge,
            queue: Arc::from(queue.into()),
            api_token: api_token.map(Arc::from),
        }
    }
}

pub fn router<B: Broker>(state: GatewayState<B>) -> Router {
    let api = Router::new()
        .route("/api/v1/{*path}", any(relay::<B>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer::<B>,
        ));

    Router::new()
        .route("/health", get(health::<B>))
        .merge(api)
        .with_state(state)
}

async fn health<B: Broker>(State(state): State<GatewayState<B>>) -> Response {
    if state.bridge.broker().is_connected() {
        (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "broker disconnected" })),
        )
            .into_response()
    }
}

#[instrument(name = "gateway.relay", skip_all, fields(method = %method, path = %uri.path()))]
async fn relay<B: Broker>(
    State(state): State<GatewayState<B>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BridgeError> {
    let mut headers = flatten_headers(&headers);
    // The gateway credential stays at the gateway.
    headers.remove(AUTHORIZATION.as_str());

    let request = OutboundRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body,
    };

    let response = state.bridge.call(&state.queue, request).await?;
    Ok(to_http(response))
}

fn to_http(envelope: ResponseEnvelope) -> Response {
    let status = StatusCode::from_u16(envelope.status_code).unwrap_or_else(|_| {
        warn!(status = envelope.status_code, "worker returned an invalid status code");
        StatusCode::BAD_GATEWAY
    });

    let mut response = Response::new(Body::from(envelope.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}

async fn require_bearer<B: Broker>(
    State(state): State<GatewayState<B>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        error!("API token is not configured, refusing request");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "API token not configured");
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match provided {
        Some(token) if token_matches(token, expected) => {
            next.run(request).await
        }
        Some(_) => {
            warn!("rejected request with invalid API token");
            error_response(StatusCode::UNAUTHORIZED, "invalid API token")
        }
        None => error_response(StatusCode::UNAUTHORIZED, "missing bearer token"),
    }
}

/// `Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_SCHEME) && !token.is_empty()).then_some(token)
}

/// Compares SHA-256 digests in constant time, so neither the content nor the
/// length of the expected token shows in the timing.
fn token_matches(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ReplyChannelClosed { .. } => StatusCode::BAD_GATEWAY,
            Self::Declaration(_) | Self::Publish(_) | Self::Serialize(_) | Self::Decode { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        error!(error = %self, status = status.as_u16(), "bridged call failed");
        error_response(status, &self.to_string())
    }
}
