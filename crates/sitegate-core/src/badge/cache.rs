//! Short-lived badge text cache keyed by (site id, date key).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// One cached badge rendering.
#[derive(Debug, Clone)]
pub struct BadgeCacheEntry {
    pub text: String,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Capped map with lazy eviction: expired entries are only swept once the
/// cache grows past its ceiling, keeping the hot path cheap.
#[derive(Debug)]
pub struct BadgeCache {
    entries: HashMap<(String, String), BadgeCacheEntry>,
    ttl: Duration,
    cap: usize,
}

impl BadgeCache {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            cap,
        }
    }

    /// Non-expired text for `(site_id, date_key)`, if present.
    pub fn get(&self, site_id: &str, date_key: &str, now: DateTime<Utc>) -> Option<&str> {
        self.entries
            .get(&(site_id.to_string(), date_key.to_string()))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.text.as_str())
    }

    pub fn insert(&mut self, site_id: &str, date_key: &str, text: String, now: DateTime<Utc>) {
        self.entries.insert(
            (site_id.to_string(), date_key.to_string()),
            BadgeCacheEntry {
                text,
                computed_at: now,
                expires_at: now + self.ttl,
            },
        );
        if self.entries.len() > self.cap {
            self.entries.retain(|_, entry| entry.expires_at > now);
        }
    }

    /// Drop every entry for a site, across all date keys.
    pub fn invalidate_site(&mut self, site_id: &str) {
        self.entries.retain(|(cached_site, _), _| cached_site != site_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
