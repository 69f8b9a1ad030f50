//! Application callbacks invoked by the worker loop, keyed by queue name.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a processor knows about the request it is handling.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub correlation_id: String,
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub deadline: Instant,
    /// Cancelled when the processor's time budget runs out or the worker
    /// shuts down.
    pub cancel: CancellationToken,
}

impl ProcessContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ProcessorResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self, ProcessorError> {
        let body = serde_json::to_vec(value).map_err(|e| ProcessorError::new(e.to_string()))?;
        Ok(Self::new(status, body).with_header("content-type", "application/json"))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A processor failure. The worker turns it into a 500 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorError {
    message: String,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProcessorError {}

/// Invoked concurrently from worker tasks.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        ctx: &ProcessContext,
        body: Bytes,
    ) -> Result<ProcessorResponse, ProcessorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateProcessor(pub String);

impl fmt::Display for DuplicateProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a processor is already registered for queue '{}'", self.0)
    }
}

impl std::error::Error for DuplicateProcessor {}

/// Queue name to processor. Filled at startup; the worker pool takes it by
/// value, after which it can no longer change.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        queue: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> Result<(), DuplicateProcessor> {
        let queue = queue.into();
        if self.processors.contains_key(&queue) {
            return Err(DuplicateProcessor(queue));
        }
        self.processors.insert(queue, processor);
        Ok(())
    }

    pub fn get(&self, queue: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(queue).cloned()
    }

    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
