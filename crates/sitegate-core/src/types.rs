//! Shared data model: tracked sites, daily usage records, evaluation
//! results, and the local-date key convention.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// A site the user has registered for limiting.
///
/// Owned by the persistence layer; the core treats instances as immutable
/// per evaluation. A budget of `0` means "not configured" for either limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSite {
    pub id: String,
    /// Normalized (lowercased, trimmed) hostname substring.
    pub url_pattern: String,
    /// Daily time budget in seconds; 0 = unset.
    #[serde(default)]
    pub daily_limit_seconds: u64,
    /// Daily open-count budget; 0 = unset.
    #[serde(default)]
    pub daily_open_limit: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl TrackedSite {
    pub fn has_time_limit(&self) -> bool {
        self.daily_limit_seconds > 0
    }

    pub fn has_open_limit(&self) -> bool {
        self.daily_open_limit > 0
    }
}

/// One day's accumulated usage for one site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(default)]
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub opens: u64,
}

/// Which budget(s) triggered a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Time,
    Opens,
    Both,
}

impl LimitType {
    /// Wire token used in the redirect query string.
    pub fn as_token(&self) -> &'static str {
        match self {
            LimitType::Time => "time",
            LimitType::Opens => "opens",
            LimitType::Both => "both",
        }
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Verdict of a limit evaluation. Derived only, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub should_block: bool,
    pub site_id: Option<String>,
    pub reason: Option<String>,
    pub limit_type: Option<LimitType>,
}

impl EvaluationResult {
    /// The fail-open default: allow, with nothing matched.
    pub fn allow() -> Self {
        Self {
            should_block: false,
            site_id: None,
            reason: None,
            limit_type: None,
        }
    }

    /// A matched site whose budgets are not exhausted. `site_id` is kept
    /// populated for standing display.
    pub fn allow_matched(site_id: impl Into<String>) -> Self {
        Self {
            should_block: false,
            site_id: Some(site_id.into()),
            reason: None,
            limit_type: None,
        }
    }
}

/// Answer of the non-mutating open-limit pre-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLimitCheck {
    pub would_exceed: bool,
    pub site_id: Option<String>,
    pub current_opens: u64,
    pub limit: u64,
}

impl OpenLimitCheck {
    pub fn pass() -> Self {
        Self {
            would_exceed: false,
            site_id: None,
            current_opens: 0,
            limit: 0,
        }
    }
}

/// Format a date as the storage key: `YYYY-MM-DD`, zero-padded.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Today's date key in local time.
pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}

/// Date key for an arbitrary local timestamp.
pub fn date_key_at(at: DateTime<Local>) -> String {
    date_key(at.date_naive())
}

/// Normalize a user-entered site pattern: trim and lowercase.
pub fn normalize_pattern(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_is_zero_padded() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_key(d), "2024-03-07");
    }

    #[test]
    fn limit_type_tokens() {
        assert_eq!(LimitType::Time.as_token(), "time");
        assert_eq!(LimitType::Opens.as_token(), "opens");
        assert_eq!(LimitType::Both.to_string(), "both");
    }

    #[test]
    fn pattern_normalization() {
        assert_eq!(normalize_pattern("  Example.COM "), "example.com");
        assert_eq!(normalize_pattern("\t\n"), "");
    }

    #[test]
    fn zero_budgets_mean_unset() {
        let site = TrackedSite {
            id: "a".into(),
            url_pattern: "example.com".into(),
            daily_limit_seconds: 0,
            daily_open_limit: 0,
            enabled: true,
        };
        assert!(!site.has_time_limit());
        assert!(!site.has_open_limit());
    }
}
