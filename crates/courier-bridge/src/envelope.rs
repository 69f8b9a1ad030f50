//! Wire messages exchanged over the broker, encoded as JSON.
//!
//! Bodies are carried as standard base64 strings so arbitrary bytes survive.

use axum::http::HeaderMap;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Published to a work queue. The worker answers on `reply_channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub correlation_id: String,
    #[serde(alias = "response_queue")]
    pub reply_channel: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

/// Published by the worker to the request's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, with = "base64_body")]
    pub body: Bytes,
}

impl ResponseEnvelope {
    /// A 500 carrying `{"error": message}`.
    pub fn internal_error(correlation_id: impl Into<String>, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            correlation_id: correlation_id.into(),
            status_code: 500,
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: Bytes::from(body),
        }
    }
}

/// Collapse HTTP headers to one value per name.
///
/// Only the first value of a repeated header is kept, and values that are not
/// valid UTF-8 are skipped. Names are lowercase.
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::with_capacity(headers.keys_len());
    for name in headers.keys() {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            flat.insert(name.as_str().to_string(), value.to_string());
        }
    }
    flat
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn body_is_base64_on_the_wire() {
        let envelope = ResponseEnvelope {
            correlation_id: "abc".into(),
            status_code: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(b"{\"ok\":true}"),
        };

        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["body"], "eyJvayI6dHJ1ZX0=");
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["correlation_id"], "abc");
    }

    #[test]
    fn binary_bodies_survive() {
        let request = RequestEnvelope {
            correlation_id: "1".into(),
            reply_channel: "response-1".into(),
            method: "POST".into(),
            path: "/upload".into(),
            headers: HashMap::new(),
            body: Bytes::from_static(&[0, 159, 146, 150, 255]),
        };

        let decoded: RequestEnvelope =
            serde_json::from_slice(&serde_json::to_vec(&request).unwrap()).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn missing_headers_and_body_default_to_empty() {
        let decoded: RequestEnvelope = serde_json::from_str(
            r#"{"correlation_id":"1","reply_channel":"response-1","method":"GET","path":"/x"}"#,
        )
        .unwrap();

        assert!(decoded.headers.is_empty());
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn response_queue_is_accepted_as_reply_channel() {
        let decoded: RequestEnvelope = serde_json::from_str(
            r#"{"correlation_id":"1","response_queue":"response-1","method":"GET","path":"/x","extra":1}"#,
        )
        .unwrap();

        assert_eq!(decoded.reply_channel, "response-1");
    }

    #[test]
    fn invalid_base64_body_is_rejected() {
        let result: Result<ResponseEnvelope, _> = serde_json::from_str(
            r#"{"correlation_id":"1","status_code":200,"body":"not base64!"}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn internal_error_is_a_json_500() {
        let envelope = ResponseEnvelope::internal_error("abc", "processor failed");

        assert_eq!(envelope.status_code, 500);
        assert_eq!(envelope.headers["content-type"], "application/json");
        let body: serde_json::Value = serde_json::from_slice(&envelope.body).unwrap();
        assert_eq!(body, serde_json::json!({"error": "processor failed"}));
    }

    #[test]
    fn flatten_keeps_first_value_and_skips_binary() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.append("accept", HeaderValue::from_static("text/plain"));
        headers.insert("x-binary", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        headers.insert("X-Request-Id", HeaderValue::from_static("r-1"));

        let flat = flatten_headers(&headers);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat["accept"], "application/json");
        assert_eq!(flat["x-request-id"], "r-1");
    }
}
