//! HashMap-backed store for tests.
//!
//! Besides the plain backend, it carries failure toggles so callers can
//! exercise the fail-open paths without a broken database on disk, and a
//! read counter so cache behavior is observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::{DailyUsage, TrackedSite};

use super::{SiteStore, UsageStore};

#[derive(Default)]
struct Inner {
    sites: Vec<TrackedSite>,
    /// (date_key, site_id) -> record
    usage: HashMap<(String, String), DailyUsage>,
}

/// In-memory implementation of both collaborator traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, site: TrackedSite) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sites.push(site);
        }
    }

    pub fn set_usage(&self, date_key: &str, site_id: &str, record: DailyUsage) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .usage
                .insert((date_key.to_string(), site_id.to_string()), record);
        }
    }

    pub fn usage_for(&self, date_key: &str, site_id: &str) -> Option<DailyUsage> {
        self.inner.lock().ok().and_then(|inner| {
            inner
                .usage
                .get(&(date_key.to_string(), site_id.to_string()))
                .copied()
        })
    }

    /// Make every read fail until toggled back off.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail until toggled back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful or failed read calls observed so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StoreError::QueryFailed("injected read failure".into()))
        } else {
            Ok(())
        }
    }
}

impl SiteStore for MemoryStore {
    fn distracting_sites(&self) -> Result<Vec<TrackedSite>, StoreError> {
        self.check_read()?;
        let inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        Ok(inner.sites.clone())
    }
}

impl UsageStore for MemoryStore {
    fn usage_stats(&self, date_key: &str) -> Result<HashMap<String, DailyUsage>, StoreError> {
        self.check_read()?;
        let inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        Ok(inner
            .usage
            .iter()
            .filter(|((date, _), _)| date == date_key)
            .map(|((_, site_id), record)| (site_id.clone(), *record))
            .collect())
    }

    fn update_usage_stats(
        &self,
        date_key: &str,
        site_id: &str,
        record: DailyUsage,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed("injected write failure".into()));
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::QueryFailed("store mutex poisoned".into()))?;
        inner
            .usage
            .insert((date_key.to_string(), site_id.to_string()), record);
        Ok(())
    }
}
