//! Badge presenter: debounced, batched, cached, retried.
//!
//! [`BadgePresenter::request_update`] is the high-frequency entry point; it
//! only records the request and (re)arms the flush timer, so its cost is
//! independent of call frequency. When the batch window closes, pending
//! entries are drained and processed concurrently; each entry matches the
//! URL, consults the short-lived text cache, recomputes on miss, and applies
//! the text through the sink with bounded retry for retryable failures.

mod cache;
mod format;

pub use cache::{BadgeCache, BadgeCacheEntry};
pub use format::{format_badge, format_time_remaining};

use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::BatchScheduler;
use crate::config::Config;
use crate::error::CoreError;
use crate::evaluator::BadgeSink;
use crate::matcher::SiteMatcher;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::storage::{SiteStore, UsageStore};
use crate::types::{today_key, DailyUsage, TrackedSite};

struct Inner {
    matcher: Arc<RwLock<SiteMatcher>>,
    sites: Arc<dyn SiteStore>,
    usage: Arc<dyn UsageStore>,
    sink: Arc<dyn BadgeSink>,
    sched: Mutex<BatchScheduler<u32, String>>,
    cache: Mutex<BadgeCache>,
    /// Token of the armed flush timer, if any. Arming a new window cancels
    /// the prior one so superseded timers never fire.
    timer: Mutex<Option<CancellationToken>>,
    retry: RetryPolicy,
}

/// Debounced badge pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BadgePresenter {
    inner: Arc<Inner>,
}

impl BadgePresenter {
    pub fn new(
        matcher: Arc<RwLock<SiteMatcher>>,
        sites: Arc<dyn SiteStore>,
        usage: Arc<dyn UsageStore>,
        sink: Arc<dyn BadgeSink>,
        config: &Config,
    ) -> Self {
        let ttl = chrono::Duration::seconds(config.badge.cache_ttl_seconds as i64);
        Self {
            inner: Arc::new(Inner {
                matcher,
                sites,
                usage,
                sink,
                sched: Mutex::new(BatchScheduler::new(config.batch_policy(), Utc::now())),
                cache: Mutex::new(BadgeCache::new(ttl, config.badge.cache_cap)),
                timer: Mutex::new(None),
                retry: config.retry_policy(),
            }),
        }
    }

    /// Record a badge update request for a tab. Last write wins per tab.
    ///
    /// Must be called from within a tokio runtime; it spawns the batch
    /// timer (or the flush itself once a threshold is hit) and returns
    /// immediately.
    pub fn request_update(&self, tab_id: u32, url: &str) {
        let now = Utc::now();
        let ready = {
            let Ok(mut sched) = self.inner.sched.lock() else {
                warn!("badge scheduler poisoned, dropping update request");
                return;
            };
            sched.enqueue(tab_id, url.to_string(), now);
            sched.ready(now)
        };
        if ready {
            let this = self.clone();
            tokio::spawn(async move { this.flush_pending().await });
        } else {
            self.arm_timer();
        }
    }

    /// Clear a tab's indicator and forget any pending update for it.
    pub fn clear_badge(&self, tab_id: u32) {
        if let Ok(mut sched) = self.inner.sched.lock() {
            sched.remove(&tab_id);
        }
        if let Err(err) = self.inner.sink.clear_badge(tab_id) {
            warn!("badge clear for tab {tab_id} failed: {err}");
        }
    }

    /// Invalidate the cached text for the site shown in `url` and recompute
    /// the tab's badge immediately, bypassing the batch window. Used after
    /// external usage-affecting writes.
    pub async fn refresh_active_badge(&self, tab_id: u32, url: &str) {
        let site = self.matched_site(url);
        if let (Some(site), Ok(mut cache)) = (&site, self.inner.cache.lock()) {
            cache.invalidate_site(&site.id);
        }
        self.process_entry(tab_id, url.to_string()).await;
    }

    /// Drain and process everything pending. Normally invoked by the batch
    /// timer; public so hosts and tests can force a flush.
    pub async fn flush_pending(&self) {
        if let Ok(mut timer) = self.inner.timer.lock() {
            if let Some(token) = timer.take() {
                token.cancel();
            }
        }
        let entries = match self.inner.sched.lock() {
            Ok(mut sched) => sched.drain(Utc::now()),
            Err(_) => {
                warn!("badge scheduler poisoned, dropping pending batch");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        debug!("flushing {} badge update(s)", entries.len());
        let mut tasks = JoinSet::new();
        for (tab_id, url) in entries {
            let this = self.clone();
            tasks.spawn(async move { this.process_entry(tab_id, url).await });
        }
        // One entry's failure never blocks or fails the others.
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!("badge update task panicked: {err}");
            }
        }
    }

    /// Number of requests waiting for the next batch window.
    pub fn pending_len(&self) -> usize {
        self.inner.sched.lock().map(|sched| sched.len()).unwrap_or(0)
    }

    fn arm_timer(&self) {
        let token = CancellationToken::new();
        {
            let Ok(mut timer) = self.inner.timer.lock() else {
                return;
            };
            if let Some(prev) = timer.replace(token.clone()) {
                prev.cancel();
            }
        }
        let this = self.clone();
        tokio::spawn(async move {
            let deadline = this
                .inner
                .sched
                .lock()
                .ok()
                .and_then(|sched| sched.next_deadline());
            let Some(deadline) = deadline else {
                return;
            };
            let wait = (deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => this.flush_pending().await,
                _ = token.cancelled() => {}
            }
        });
    }

    async fn process_entry(&self, tab_id: u32, url: String) {
        let result = retry_with_backoff(self.inner.retry, || self.render_once(tab_id, &url)).await;
        match result {
            Ok(()) => {}
            Err(err) if err.is_retryable() => {
                // Attempts exhausted; leave whatever is on the badge rather
                // than flashing it off for a transient outage.
                warn!("badge update for tab {tab_id} gave up after retries: {err}");
            }
            Err(err) => {
                warn!("badge update for tab {tab_id} failed terminally: {err}");
                if let Err(err) = self.inner.sink.clear_badge(tab_id) {
                    debug!("badge clear after terminal failure also failed: {err}");
                }
            }
        }
    }

    /// One rendering attempt for one tab. Retryable failures are returned
    /// so the caller's retry combinator can re-run the whole entry.
    fn render_once(&self, tab_id: u32, url: &str) -> Result<(), CoreError> {
        let Some(matched) = self.matched_site(url) else {
            self.inner.sink.clear_badge(tab_id)?;
            return Ok(());
        };
        let date = today_key();

        let cached = self
            .inner
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&matched.id, &date, Utc::now()).map(String::from));
        if let Some(text) = cached {
            return self.apply(tab_id, &text);
        }

        // Site list and usage are fetched independently: a usage failure
        // degrades to an empty record, a site-list failure aborts the entry
        // for retry.
        let sites = self.inner.sites.distracting_sites()?;
        let Some(site) = sites
            .into_iter()
            .find(|site| site.id == matched.id && site.enabled)
        else {
            self.inner.sink.clear_badge(tab_id)?;
            return Ok(());
        };
        let usage = match self.inner.usage.usage_stats(&date) {
            Ok(day) => day.get(&site.id).copied().unwrap_or_default(),
            Err(err) => {
                warn!("usage fetch failed for badge, degrading to empty record: {err}");
                DailyUsage::default()
            }
        };

        let text = format_badge(&site, &usage);
        self.apply(tab_id, &text)?;
        if let Ok(mut cache) = self.inner.cache.lock() {
            cache.insert(&site.id, &date, text, Utc::now());
        }
        Ok(())
    }

    fn apply(&self, tab_id: u32, text: &str) -> Result<(), CoreError> {
        if text.is_empty() {
            self.inner.sink.clear_badge(tab_id)?;
        } else {
            self.inner.sink.set_badge(tab_id, text)?;
        }
        Ok(())
    }

    fn matched_site(&self, url: &str) -> Option<TrackedSite> {
        match self.inner.matcher.read() {
            Ok(matcher) => matcher.match_url(url).cloned(),
            Err(_) => {
                warn!("matcher lock poisoned, treating as no match");
                None
            }
        }
    }
}
