use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Read access to process configuration.
///
/// Only [`var`](ReadEnv::var) must be implemented; the remaining helpers
/// encode the "missing or unparsable falls back to the default" rule every
/// courier config follows.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, env::VarError>;

    /// The value of `key`, or `default` when unset.
    fn var_or(&self, key: &str, default: &str) -> String {
        self.var(key).unwrap_or_else(|_| default.to_string())
    }

    /// The value of `key` parsed as `T`, or `default` when unset or invalid.
    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.var(key)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Whole seconds read from `key`, or `default` when unset or invalid.
    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        self.var(key)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}
