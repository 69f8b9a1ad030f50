use super::{LicenseError, LicenseSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    counts: Mutex<HashMap<String, i64>>,
    writes: Mutex<Vec<(String, i64)>>,
    fetches: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-memory [`LicenseSource`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryLicenseSource {
    inner: Arc<Inner>,
}

impl MemoryLicenseSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, org: &str, count: i64) -> Self {
        self.set(org, count);
        self
    }

    pub fn set(&self, org: &str, count: i64) {
        self.inner
            .counts
            .lock()
            .unwrap()
            .insert(org.to_string(), count);
    }

    pub fn get(&self, org: &str) -> Option<i64> {
        self.inner.counts.lock().unwrap().get(org).copied()
    }

    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<(String, i64)> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl LicenseSource for MemoryLicenseSource {
    async fn fetch(&self) -> Result<HashMap<String, i64>, LicenseError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_fetches.load(Ordering::SeqCst) {
            return Err(LicenseError::Upstream("fetch refused".into()));
        }
        Ok(self.inner.counts.lock().unwrap().clone())
    }

    async fn write(&self, org: &str, count: i64) -> Result<(), LicenseError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(LicenseError::Upstream("write refused".into()));
        }
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((org.to_string(), count));
        self.set(org, count);
        Ok(())
    }
}
