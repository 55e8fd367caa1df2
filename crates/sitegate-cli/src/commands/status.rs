use serde::Serialize;
use sitegate_core::{format_badge, today_key, UsageStore};

use super::open_evaluator;

#[derive(Serialize)]
struct StatusReport {
    should_block: bool,
    site_id: Option<String>,
    reason: Option<String>,
    limit_type: Option<String>,
    badge: String,
}

pub fn run(url: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (db, matcher, evaluator) = open_evaluator()?;
    let result = evaluator.evaluate(1, url);

    // Badge preview alongside the verdict, off the same snapshot the
    // evaluator used.
    let matcher = matcher.read().map_err(|_| "site matcher lock poisoned")?;
    let badge = match matcher.match_url(url) {
        Some(site) => {
            let usage = db
                .usage_stats(&today_key())
                .unwrap_or_default()
                .get(&site.id)
                .copied()
                .unwrap_or_default();
            format_badge(site, &usage)
        }
        None => String::new(),
    };

    if json {
        let report = StatusReport {
            should_block: result.should_block,
            site_id: result.site_id.clone(),
            reason: result.reason.clone(),
            limit_type: result.limit_type.map(|l| l.as_token().to_string()),
            badge,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if result.should_block {
        println!("Blocked ({})", result.limit_type.map(|l| l.as_token()).unwrap_or("?"));
        if let Some(reason) = &result.reason {
            println!("  {reason}");
        }
    } else if let Some(site_id) = &result.site_id {
        println!("Allowed (tracked site {site_id})");
        if !badge.is_empty() {
            println!("  remaining: {badge}");
        }
    } else {
        println!("Allowed (not a tracked site)");
    }
    Ok(())
}
