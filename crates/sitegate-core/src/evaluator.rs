//! Limit evaluation: budgets vs. usage, fail-open everywhere.
//!
//! [`decide`] is the pure decision function; [`LimitEvaluator`] wraps it
//! with matching, usage lookup, the open-limit pre-check, and the redirect
//! helper. Guiding policy: a false block is worse than a missed block, so
//! every failure or ambiguity resolves to the non-blocking default.

use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::matcher::SiteMatcher;
use crate::storage::UsageStore;
use crate::types::{
    today_key, DailyUsage, EvaluationResult, LimitType, OpenLimitCheck, TrackedSite,
};

/// Pure block/allow decision for one site and one day's usage.
///
/// Comparisons use raw seconds and opens; reaching a limit exactly already
/// counts as exceeded. Minutes are rounded for display only.
pub fn decide(site: &TrackedSite, usage: &DailyUsage) -> EvaluationResult {
    let time_exceeded =
        site.has_time_limit() && usage.time_spent_seconds >= site.daily_limit_seconds;
    let opens_exceeded = site.has_open_limit() && usage.opens >= site.daily_open_limit;

    let limit_type = match (time_exceeded, opens_exceeded) {
        (true, true) => LimitType::Both,
        (true, false) => LimitType::Time,
        (false, true) => LimitType::Opens,
        (false, false) => return EvaluationResult::allow_matched(site.id.clone()),
    };

    let spent_min = round_minutes(usage.time_spent_seconds);
    let limit_min = round_minutes(site.daily_limit_seconds);
    let reason = match limit_type {
        LimitType::Both => format!(
            "You've spent {spent_min} minutes (limit: {limit_min}) and opened this site {} times (limit: {}) today",
            usage.opens, site.daily_open_limit
        ),
        LimitType::Time => format!(
            "You've spent {spent_min} minutes on this site today, exceeding your {limit_min} minute limit"
        ),
        LimitType::Opens => format!(
            "You've opened this site {} times today, exceeding your {} open limit",
            usage.opens, site.daily_open_limit
        ),
    };

    EvaluationResult {
        should_block: true,
        site_id: Some(site.id.clone()),
        reason: Some(reason),
        limit_type: Some(limit_type),
    }
}

fn round_minutes(seconds: u64) -> u64 {
    (seconds as f64 / 60.0).round() as u64
}

/// Navigation collaborator: where blocked tabs get sent and where badge
/// text lands.
pub trait BadgeSink: Send + Sync {
    /// Render `text` on the tab's indicator.
    fn set_badge(&self, tab_id: u32, text: &str) -> Result<(), crate::error::SinkError>;

    /// Clear the tab's indicator.
    fn clear_badge(&self, tab_id: u32) -> Result<(), crate::error::SinkError>;

    /// Navigate the tab away.
    fn navigate(&self, tab_id: u32, url: &str) -> Result<(), crate::error::SinkError>;
}

/// The externally invoked decision point.
pub struct LimitEvaluator {
    matcher: Arc<RwLock<SiteMatcher>>,
    usage: Arc<dyn UsageStore>,
    sink: Arc<dyn BadgeSink>,
    timeout_url: String,
}

impl LimitEvaluator {
    pub fn new(
        matcher: Arc<RwLock<SiteMatcher>>,
        usage: Arc<dyn UsageStore>,
        sink: Arc<dyn BadgeSink>,
        timeout_url: impl Into<String>,
    ) -> Self {
        Self {
            matcher,
            usage,
            sink,
            timeout_url: timeout_url.into(),
        }
    }

    /// Evaluate whether `url` in `tab_id` should be blocked right now.
    ///
    /// Invalid identifiers, URL-parse failures, no matching enabled site,
    /// and persistence errors all resolve to the non-blocking default.
    pub fn evaluate(&self, tab_id: u32, url: &str) -> EvaluationResult {
        if tab_id == 0 {
            warn!("evaluate called with invalid tab id 0");
            return EvaluationResult::allow();
        }
        let Some(site) = self.matched_site(url) else {
            return EvaluationResult::allow();
        };
        let usage = match self.usage.usage_stats(&today_key()) {
            Ok(day) => day.get(&site.id).copied().unwrap_or_default(),
            Err(err) => {
                warn!("usage lookup failed during evaluate, failing open: {err}");
                return EvaluationResult::allow();
            }
        };
        decide(&site, &usage)
    }

    /// Non-mutating pre-check: would recording one *more* open exceed the
    /// site's open limit?
    ///
    /// Distinct from [`evaluate`](Self::evaluate), which asks whether the
    /// already-recorded opens meet the limit: the pre-check guards the next
    /// action, the evaluator guards current standing.
    pub fn would_exceed_open_limit(&self, url: &str) -> OpenLimitCheck {
        let Some(site) = self.matched_site(url) else {
            return OpenLimitCheck::pass();
        };
        if !site.has_open_limit() {
            return OpenLimitCheck {
                would_exceed: false,
                site_id: Some(site.id),
                current_opens: 0,
                limit: 0,
            };
        }
        let current_opens = match self.usage.usage_stats(&today_key()) {
            Ok(day) => day.get(&site.id).map(|u| u.opens).unwrap_or(0),
            Err(err) => {
                warn!("usage lookup failed during open pre-check, failing open: {err}");
                return OpenLimitCheck::pass();
            }
        };
        OpenLimitCheck {
            would_exceed: current_opens + 1 > site.daily_open_limit,
            site_id: Some(site.id),
            current_opens,
            limit: site.daily_open_limit,
        }
    }

    /// Evaluate and, on a block, navigate the tab to the timeout view.
    ///
    /// Returns whether a redirect happened. Any failure during redirection
    /// is caught and reported as "no redirect", never propagated.
    pub fn redirect_if_blocked(&self, tab_id: u32, url: &str) -> bool {
        let result = self.evaluate(tab_id, url);
        if !result.should_block {
            return false;
        }
        let target = timeout_view_url(&self.timeout_url, url, &result);
        match self.sink.navigate(tab_id, &target) {
            Ok(()) => true,
            Err(err) => {
                warn!("redirect of tab {tab_id} failed: {err}");
                false
            }
        }
    }

    fn matched_site(&self, url: &str) -> Option<TrackedSite> {
        match self.matcher.read() {
            Ok(matcher) => matcher.match_url(url).cloned(),
            Err(_) => {
                warn!("matcher lock poisoned, failing open");
                None
            }
        }
    }
}

/// Compose the timeout view URL with the four URL-encoded query params.
pub fn timeout_view_url(base: &str, blocked_url: &str, result: &EvaluationResult) -> String {
    let site = result.site_id.as_deref().unwrap_or("");
    let reason = result.reason.as_deref().unwrap_or("");
    let limit = result
        .limit_type
        .map(|l| l.as_token())
        .unwrap_or("");
    format!(
        "{base}?blocked={}&site={}&reason={}&limit={}",
        urlencoding::encode(blocked_url),
        urlencoding::encode(site),
        urlencoding::encode(reason),
        urlencoding::encode(limit),
    )
}
