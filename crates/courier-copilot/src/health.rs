//! Periodic broker connectivity probe.

use courier_nats::Broker;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Counts from a finished ticker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub probes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthTicker {
    interval: Duration,
}

impl Default for HealthTicker {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl HealthTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe `broker` every interval until `cancel` fires. Changes in
    /// connectivity are logged at info/warn, steady state at debug.
    pub fn spawn<B: Broker>(self, broker: B, cancel: CancellationToken) -> JoinHandle<HealthReport> {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(self.interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut report = HealthReport::default();
            let mut last = None;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {}
                }

                let connected = broker.is_connected();
                report.probes += 1;
                if !connected {
                    report.failures += 1;
                }

                match (last, connected) {
                    (Some(true), false) | (None, false) => warn!("broker connection lost"),
                    (Some(false), true) => info!("broker connection restored"),
                    _ => debug!(connected, "broker health probe"),
                }
                last = Some(connected);
            }

            debug!(probes = report.probes, failures = report.failures, "health ticker stopped");
            report
        })
    }
}
