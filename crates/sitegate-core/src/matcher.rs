//! In-memory site pattern matcher.
//!
//! Holds a snapshot of the registered site list so that per-navigation
//! matching never waits on storage. The snapshot is replaced wholesale by
//! [`SiteMatcher::load`], which the owner calls at startup and again on
//! every external change notification for the site collection.
//!
//! Matching is deliberately permissive substring containment: the pattern
//! `example.com` matches `sub.example.com` and also any hostname that merely
//! contains the substring. That trade-off is accepted product behavior and
//! locked in by tests.

use tracing::warn;
use url::Url;

use crate::storage::SiteStore;
use crate::types::TrackedSite;

/// Snapshot-based URL-to-site matcher.
///
/// An owned instance, not a global: the caller decides where it lives and
/// passes it to whatever needs matching.
#[derive(Debug, Default)]
pub struct SiteMatcher {
    sites: Vec<TrackedSite>,
    loaded: bool,
}

impl SiteMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with the full site list from storage.
    ///
    /// A store failure is substituted with an empty list and logged, never
    /// surfaced: an empty snapshot fails open. Calling this repeatedly is
    /// an idempotent refresh.
    pub fn load(&mut self, store: &dyn SiteStore) {
        match store.distracting_sites() {
            Ok(sites) => {
                self.sites = sites;
            }
            Err(err) => {
                warn!("site list load failed, using empty snapshot: {err}");
                self.sites = Vec::new();
            }
        }
        self.loaded = true;
    }

    /// Return the first enabled site whose pattern is a substring of the
    /// URL's hostname.
    ///
    /// Unparsable or hostless URLs yield no match. Calling before any
    /// [`load`](Self::load) also yields no match, with a warning, rather
    /// than blocking the caller.
    pub fn match_url(&self, url: &str) -> Option<&TrackedSite> {
        if !self.loaded {
            warn!("match_url called before the site snapshot was loaded");
            return None;
        }
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        self.sites
            .iter()
            .filter(|site| site.enabled && !site.url_pattern.is_empty())
            .find(|site| host.contains(&site.url_pattern))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }
}
