use courier_std::env::ReadEnv;
use std::time::Duration;

const DEFAULT_PREFIX: &str = "courier";
const DEFAULT_WORK_QUEUE: &str = "copilot-api";
const DEFAULT_CONSUMER_NAME: &str = "courier-workers";
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_secs(25);

/// Upper bound for any configured timeout. Deadlines are computed as
/// `now + timeout`, which must not overflow.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Broker-facing settings shared by the gateway and the worker.
///
/// | Variable | Default |
/// |----------|---------|
/// | `COURIER_PREFIX` | `courier` |
/// | `COURIER_WORK_QUEUE` | `copilot-api` |
/// | `COURIER_CONSUMER_NAME` | `courier-workers` |
/// | `COURIER_REPLY_TIMEOUT_SECS` | `30` |
/// | `COURIER_PROCESSOR_TIMEOUT_SECS` | `25` |
///
/// Timeouts are capped at [`MAX_TIMEOUT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub prefix: String,
    pub work_queue: String,
    pub consumer_name: String,
    pub reply_timeout: Duration,
    pub processor_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            work_queue: DEFAULT_WORK_QUEUE.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            processor_timeout: DEFAULT_PROCESSOR_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            prefix: env.var_or("COURIER_PREFIX", DEFAULT_PREFIX),
            work_queue: env.var_or("COURIER_WORK_QUEUE", DEFAULT_WORK_QUEUE),
            consumer_name: env.var_or("COURIER_CONSUMER_NAME", DEFAULT_CONSUMER_NAME),
            reply_timeout: env
                .secs_or("COURIER_REPLY_TIMEOUT_SECS", DEFAULT_REPLY_TIMEOUT)
                .min(MAX_TIMEOUT),
            processor_timeout: env
                .secs_or("COURIER_PROCESSOR_TIMEOUT_SECS", DEFAULT_PROCESSOR_TIMEOUT)
                .min(MAX_TIMEOUT),
        }
    }
}
