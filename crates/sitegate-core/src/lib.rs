//! # Sitegate Core Library
//!
//! This library provides the usage-accounting and limit-enforcement core of
//! the sitegate site-blocking tool. The CLI binary and any host shell are
//! thin layers over the same core: they forward navigation and tab events in
//! and apply badge text and redirects coming out.
//!
//! ## Architecture
//!
//! - **Pattern Matcher**: an in-memory snapshot of registered site patterns,
//!   refreshed out-of-band, so per-navigation matching never waits on storage
//! - **Usage Recorder**: a wall-clock session state machine driven by a
//!   recurring flush tick
//! - **Limit Evaluator**: a pure budget-vs-usage decision function plus the
//!   fail-open orchestration around it
//! - **Badge Presenter**: a debounced/batched pipeline with a short-lived
//!   cache and bounded retry
//!
//! ## Key Components
//!
//! - [`SiteMatcher`]: URL-to-site matching
//! - [`UsageRecorder`]: session tracking and open counting
//! - [`LimitEvaluator`]: block/allow verdicts and redirects
//! - [`BadgePresenter`]: remaining-budget indicator pipeline
//! - [`Database`]: SQLite persistence for sites and daily usage

pub mod badge;
pub mod batch;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod recorder;
pub mod retry;
pub mod storage;
pub mod types;

pub use badge::{format_badge, format_time_remaining, BadgeCache, BadgePresenter};
pub use batch::{BatchPolicy, BatchScheduler};
pub use config::Config;
pub use error::{ConfigError, CoreError, SinkError, StoreError, ValidationError};
pub use evaluator::{decide, timeout_view_url, BadgeSink, LimitEvaluator};
pub use matcher::SiteMatcher;
pub use recorder::{FlushOp, RecorderState, UsageRecorder};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use storage::{Database, MemoryStore, SiteStore, UsageStore};
pub use types::{
    date_key, normalize_pattern, today_key, DailyUsage, EvaluationResult, LimitType,
    OpenLimitCheck, TrackedSite,
};
