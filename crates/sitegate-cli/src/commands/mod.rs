pub mod open;
pub mod site;
pub mod status;
pub mod usage;

use std::sync::{Arc, RwLock};

use sitegate_core::{BadgeSink, Database, LimitEvaluator, SinkError, SiteMatcher};

/// Sink that narrates badge and navigation actions on stdout; the CLI has
/// no real tab surface.
pub struct ConsoleSink;

impl BadgeSink for ConsoleSink {
    fn set_badge(&self, tab_id: u32, text: &str) -> Result<(), SinkError> {
        println!("badge[{tab_id}]: {text}");
        Ok(())
    }

    fn clear_badge(&self, tab_id: u32) -> Result<(), SinkError> {
        println!("badge[{tab_id}]: (cleared)");
        Ok(())
    }

    fn navigate(&self, tab_id: u32, url: &str) -> Result<(), SinkError> {
        println!("redirect[{tab_id}] -> {url}");
        Ok(())
    }
}

/// Open the database and build an evaluator over a freshly loaded matcher.
///
/// The matcher is returned alongside the evaluator so commands that need
/// their own matching (the badge preview) reuse the same snapshot instead
/// of re-reading the site list.
pub fn open_evaluator() -> Result<
    (Arc<Database>, Arc<RwLock<SiteMatcher>>, LimitEvaluator),
    Box<dyn std::error::Error>,
> {
    let db = Arc::new(Database::open()?);
    let mut matcher = SiteMatcher::new();
    matcher.load(db.as_ref());
    let matcher = Arc::new(RwLock::new(matcher));
    let config = sitegate_core::Config::load_or_default();
    let evaluator = LimitEvaluator::new(
        matcher.clone(),
        db.clone(),
        Arc::new(ConsoleSink),
        config.blocking.timeout_url,
    );
    Ok((db, matcher, evaluator))
}
