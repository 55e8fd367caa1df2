//! Remaining-budget badge text.

use crate::types::{DailyUsage, TrackedSite};

/// Render remaining time as its largest non-zero unit, floored:
/// "2h", "30m", "45s", and "0s" when exhausted.
pub fn format_time_remaining(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h", seconds / 3600)
    } else if seconds >= 60 {
        format!("{}m", seconds / 60)
    } else {
        format!("{seconds}s")
    }
}

/// Badge text for one site and one day's usage.
///
/// Time remaining and opens remaining are joined with "/" when both budgets
/// are configured; no budgets at all yields the empty string, which clears
/// the indicator.
pub fn format_badge(site: &TrackedSite, usage: &DailyUsage) -> String {
    let mut parts = Vec::with_capacity(2);
    if site.has_time_limit() {
        let remaining = site.daily_limit_seconds.saturating_sub(usage.time_spent_seconds);
        parts.push(format_time_remaining(remaining));
    }
    if site.has_open_limit() {
        let remaining = site.daily_open_limit.saturating_sub(usage.opens);
        parts.push(remaining.to_string());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn site(time_limit: u64, open_limit: u64) -> TrackedSite {
        TrackedSite {
            id: "s".into(),
            url_pattern: "example.com".into(),
            daily_limit_seconds: time_limit,
            daily_open_limit: open_limit,
            enabled: true,
        }
    }

    #[test]
    fn largest_nonzero_unit_flooring() {
        assert_eq!(format_time_remaining(7200), "2h");
        assert_eq!(format_time_remaining(5400), "1h");
        assert_eq!(format_time_remaining(1800), "30m");
        assert_eq!(format_time_remaining(119), "1m");
        assert_eq!(format_time_remaining(59), "59s");
        assert_eq!(format_time_remaining(0), "0s");
    }

    #[test]
    fn time_only_badge() {
        let usage = DailyUsage {
            time_spent_seconds: 1800,
            opens: 0,
        };
        assert_eq!(format_badge(&site(3600, 0), &usage), "30m");
    }

    #[test]
    fn opens_only_badge() {
        let usage = DailyUsage {
            time_spent_seconds: 0,
            opens: 2,
        };
        assert_eq!(format_badge(&site(0, 5), &usage), "3");
    }

    #[test]
    fn combined_badge() {
        let usage = DailyUsage {
            time_spent_seconds: 2400,
            opens: 2,
        };
        assert_eq!(format_badge(&site(3600, 5), &usage), "20m/3");
    }

    #[test]
    fn exhausted_budgets_floor_at_zero() {
        let usage = DailyUsage {
            time_spent_seconds: 5000,
            opens: 9,
        };
        assert_eq!(format_badge(&site(3600, 5), &usage), "0s/0");
    }

    #[test]
    fn no_budgets_yield_empty_string() {
        let usage = DailyUsage {
            time_spent_seconds: 123,
            opens: 4,
        };
        assert_eq!(format_badge(&site(0, 0), &usage), "");
    }

    proptest! {
        #[test]
        fn time_text_is_always_value_plus_unit(secs in 0u64..1_000_000) {
            let text = format_time_remaining(secs);
            let (value, unit) = text.split_at(text.len() - 1);
            prop_assert!(matches!(unit, "h" | "m" | "s"));
            let value: u64 = value.parse().unwrap();
            match unit {
                "h" => prop_assert_eq!(value, secs / 3600),
                "m" => { prop_assert!(value >= 1 && value < 60); }
                _ => { prop_assert!(value < 60); }
            }
        }
    }
}
