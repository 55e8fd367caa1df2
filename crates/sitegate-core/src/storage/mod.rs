//! Persistence collaborator: trait seam plus the shipped backends.
//!
//! The core components only ever talk to [`SiteStore`] and [`UsageStore`].
//! The traits report failure honestly; the *fail-open* substitutions (empty
//! list, empty map, swallowed write) are applied by the calling components,
//! which is where the policy belongs.

mod database;
mod memory;

pub use database::Database;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::StoreError;
use crate::types::{DailyUsage, TrackedSite};

/// Read access to the registered site collection.
pub trait SiteStore: Send + Sync {
    /// The full list of registered sites, enabled or not.
    fn distracting_sites(&self) -> Result<Vec<TrackedSite>, StoreError>;
}

/// Read/write access to per-day usage records.
pub trait UsageStore: Send + Sync {
    /// All usage records for one date key, keyed by site id.
    fn usage_stats(&self, date_key: &str) -> Result<HashMap<String, DailyUsage>, StoreError>;

    /// Replace the record for `(date_key, site_id)` with `record`,
    /// creating it if absent.
    fn update_usage_stats(
        &self,
        date_key: &str,
        site_id: &str,
        record: DailyUsage,
    ) -> Result<(), StoreError>;
}

/// Returns `~/.config/sitegate[-dev]/` based on SITEGATE_ENV.
///
/// Set SITEGATE_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SITEGATE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("sitegate-dev")
    } else {
        base_dir.join("sitegate")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
