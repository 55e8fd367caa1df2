use std::collections::HashMap;

use serde::Serialize;
use sitegate_core::{today_key, Database, SiteStore, UsageStore};

#[derive(Serialize)]
struct UsageRow {
    site_id: String,
    url_pattern: Option<String>,
    time_spent_seconds: u64,
    opens: u64,
}

pub fn run(date: Option<&str>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let date_key = match date {
        Some(date) => {
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| format!("invalid date '{date}', expected YYYY-MM-DD"))?;
            date.to_string()
        }
        None => today_key(),
    };

    let patterns: HashMap<String, String> = db
        .distracting_sites()?
        .into_iter()
        .map(|site| (site.id, site.url_pattern))
        .collect();

    let mut rows: Vec<UsageRow> = db
        .usage_stats(&date_key)?
        .into_iter()
        .map(|(site_id, record)| UsageRow {
            url_pattern: patterns.get(&site_id).cloned(),
            site_id,
            time_spent_seconds: record.time_spent_seconds,
            opens: record.opens,
        })
        .collect();
    rows.sort_by(|a, b| a.site_id.cmp(&b.site_id));

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No usage recorded for {date_key}");
        return Ok(());
    }
    println!("Usage for {date_key}:");
    for row in rows {
        let name = row.url_pattern.as_deref().unwrap_or("(removed site)");
        println!(
            "  {}  {}m {}s  opens: {}",
            name,
            row.time_spent_seconds / 60,
            row.time_spent_seconds % 60,
            row.opens
        );
    }
    Ok(())
}
