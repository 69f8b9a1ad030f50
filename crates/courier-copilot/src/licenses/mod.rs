//! Remaining Copilot seats per organization.
//!
//! [`LicenseMirror`] caches the counts held by a [`LicenseSource`] and is the
//! only place seats are reserved. Reads share the lock; a reservation takes it
//! exclusively so that checking and decrementing is a single step.

mod smartsheet;

#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use smartsheet::{DEFAULT_API_URL, SmartsheetSource};

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryLicenseSource;

use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("no licenses available for organization '{0}'")]
    NoLicenseAvailable(String),

    #[error("license source failed: {0}")]
    Upstream(String),
}

/// Where license counts are kept.
pub trait LicenseSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<HashMap<String, i64>, LicenseError>> + Send;

    fn write(&self, org: &str, count: i64) -> impl Future<Output = Result<(), LicenseError>> + Send;
}

pub struct LicenseMirror<S> {
    source: S,
    cache: RwLock<HashMap<String, i64>>,
}

impl<S: LicenseSource> LicenseMirror<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Replace the whole cache with the source's current counts.
    ///
    /// The fetch runs under the write lock; reservations wait for it.
    pub async fn refresh(&self) -> Result<(), LicenseError> {
        let mut cache = self.cache.write().await;
        self.reload(&mut cache).await
    }

    async fn reload(&self, cache: &mut HashMap<String, i64>) -> Result<(), LicenseError> {
        let fresh = self.source.fetch().await?;
        info!(organizations = fresh.len(), "refreshed license counts");
        *cache = fresh;
        Ok(())
    }

    /// Whether `org` has a seat left. Unknown organizations trigger a refresh.
    pub async fn check_availability(&self, org: &str) -> Result<bool, LicenseError> {
        if let Some(count) = self.cache.read().await.get(org) {
            return Ok(*count > 0);
        }

        let mut cache = self.cache.write().await;
        if !cache.contains_key(org) {
            debug!(org, "organization not cached, refreshing");
            self.reload(&mut cache).await?;
        }
        Ok(cache.get(org).is_some_and(|count| *count > 0))
    }

    /// Reserve one seat and return how many remain.
    ///
    /// The new count is pushed to the source while the lock is held; a failed
    /// write is logged and the reservation stands.
    pub async fn decrement(&self, org: &str) -> Result<i64, LicenseError> {
        let mut cache = self.cache.write().await;
        if !cache.contains_key(org) {
            self.reload(&mut cache).await?;
        }

        let remaining = match cache.get_mut(org) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            _ => return Err(LicenseError::NoLicenseAvailable(org.to_string())),
        };

        if let Err(error) = self.source.write(org, remaining).await {
            warn!(org, remaining, %error, "failed to record license count upstream");
        }
        info!(org, remaining, "reserved license");
        Ok(remaining)
    }

    /// Give back a seat taken by [`decrement`](Self::decrement).
    pub async fn restore(&self, org: &str) -> i64 {
        let mut cache = self.cache.write().await;
        let count = cache.entry(org.to_string()).or_insert(0);
        *count += 1;
        let restored = *count;

        if let Err(error) = self.source.write(org, restored).await {
            warn!(org, restored, %error, "failed to record restored license upstream");
        }
        info!(org, remaining = restored, "restored license");
        restored
    }

    pub async fn count(&self, org: &str) -> Option<i64> {
        self.cache.read().await.get(org).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Takes its snapshot, then holds it until released. Only the first
    /// fetch after `arm` waits.
    #[derive(Default)]
    struct GatedSource {
        inner: MemoryLicenseSource,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl GatedSource {
        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    impl LicenseSource for Arc<GatedSource> {
        async fn fetch(&self) -> Result<HashMap<String, i64>, LicenseError> {
            let snapshot = self.inner.fetch().await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            snapshot
        }

        async fn write(&self, org: &str, count: i64) -> Result<(), LicenseError> {
            self.inner.write(org, count).await
        }
    }

    #[tokio::test]
    async fn unknown_org_is_fetched_once() {
        let source = MemoryLicenseSource::new().with("acme", 2);
        let mirror = LicenseMirror::new(source.clone());

        assert!(mirror.check_availability("acme").await.unwrap());
        assert!(mirror.check_availability("acme").await.unwrap());

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn org_missing_upstream_has_no_licenses() {
        let mirror = LicenseMirror::new(MemoryLicenseSource::new());

        assert!(!mirror.check_availability("ghost").await.unwrap());
        assert!(matches!(
            mirror.decrement("ghost").await,
            Err(LicenseError::NoLicenseAvailable(org)) if org == "ghost"
        ));
    }

    #[tokio::test]
    async fn decrement_writes_the_new_count() {
        let source = MemoryLicenseSource::new().with("acme", 3);
        let mirror = LicenseMirror::new(source.clone());

        assert_eq!(mirror.decrement("acme").await.unwrap(), 2);

        assert_eq!(source.writes(), vec![("acme".to_string(), 2)]);
        assert_eq!(mirror.count("acme").await, Some(2));
    }

    #[tokio::test]
    async fn failed_upstream_write_keeps_the_reservation() {
        let source = MemoryLicenseSource::new().with("acme", 1);
        source.fail_writes(true);
        let mirror = LicenseMirror::new(source);

        assert_eq!(mirror.decrement("acme").await.unwrap(), 0);
        assert!(!mirror.check_availability("acme").await.unwrap());
    }

    #[tokio::test]
    async fn failed_fetch_is_reported() {
        let source = MemoryLicenseSource::new();
        source.fail_fetches(true);
        let mirror = LicenseMirror::new(source);

        assert!(matches!(
            mirror.check_availability("acme").await,
            Err(LicenseError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn restore_returns_a_seat() {
        let source = MemoryLicenseSource::new().with("acme", 1);
        let mirror = LicenseMirror::new(source.clone());

        mirror.decrement("acme").await.unwrap();
        assert_eq!(mirror.restore("acme").await, 1);

        assert!(mirror.check_availability("acme").await.unwrap());
        assert_eq!(
            source.writes(),
            vec![("acme".to_string(), 0), ("acme".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn refresh_replaces_cached_counts() {
        let source = MemoryLicenseSource::new().with("acme", 1);
        let mirror = LicenseMirror::new(source.clone());
        mirror.refresh().await.unwrap();

        source.set("acme", 5);
        source.set("globex", 2);
        mirror.refresh().await.unwrap();

        assert_eq!(mirror.count("acme").await, Some(5));
        assert_eq!(mirror.count("globex").await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decrements_never_oversubscribe() {
        const SEATS: i64 = 5;
        const CALLERS: usize = 20;

        let mirror = Arc::new(LicenseMirror::new(
            MemoryLicenseSource::new().with("acme", SEATS),
        ));

        let tasks: Vec<_> = (0..CALLERS)
            .map(|_| {
                let mirror = Arc::clone(&mirror);
                tokio::spawn(async move { mirror.decrement("acme").await })
            })
            .collect();

        let mut granted = 0;
        let mut refused = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => granted += 1,
                Err(LicenseError::NoLicenseAvailable(_)) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, SEATS);
        assert_eq!(refused, CALLERS as i64 - SEATS);
        assert_eq!(mirror.count("acme").await, Some(0));
    }

    #[tokio::test]
    async fn refresh_in_flight_cannot_bring_back_a_reserved_seat() {
        let gated = Arc::new(GatedSource::default());
        gated.inner.set("acme", 1);
        let mirror = Arc::new(LicenseMirror::new(Arc::clone(&gated)));
        assert!(mirror.check_availability("acme").await.unwrap());

        gated.arm();
        let lookup = tokio::spawn({
            let mirror = Arc::clone(&mirror);
            async move { mirror.check_availability("globex").await }
        });
        gated.entered.notified().await;

        let reservation = tokio::spawn({
            let mirror = Arc::clone(&mirror);
            async move { mirror.decrement("acme").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gated.release.notify_one();

        assert!(!lookup.await.unwrap().unwrap());
        assert_eq!(reservation.await.unwrap().unwrap(), 0);
        assert!(matches!(
            mirror.decrement("acme").await,
            Err(LicenseError::NoLicenseAvailable(_))
        ));
        assert_eq!(gated.inner.get("acme"), Some(0));
    }

    #[tokio::test]
    async fn explicit_refresh_racing_a_reservation_keeps_the_count() {
        let gated = Arc::new(GatedSource::default());
        gated.inner.set("acme", 2);
        let mirror = Arc::new(LicenseMirror::new(Arc::clone(&gated)));
        mirror.refresh().await.unwrap();

        gated.arm();
        let refresh = tokio::spawn({
            let mirror = Arc::clone(&mirror);
            async move { mirror.refresh().await }
        });
        gated.entered.notified().await;

        let reservation = tokio::spawn({
            let mirror = Arc::clone(&mirror);
            async move { mirror.decrement("acme").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gated.release.notify_one();

        refresh.await.unwrap().unwrap();
        assert_eq!(reservation.await.unwrap().unwrap(), 1);
        assert_eq!(mirror.count("acme").await, Some(1));
    }
}
