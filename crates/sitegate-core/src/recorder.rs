//! Usage recorder: one active tracking session, periodic flushes.
//!
//! Split into a pure wall-clock state machine ([`RecorderState`]) and an
//! async owner ([`UsageRecorder`]) that drives it with a recurring tick and
//! applies the resulting flushes to the usage store. The state machine
//! never does I/O, so session accounting is tested with a virtual clock.
//!
//! Invariants:
//! - at most one active session; starting a new one finalizes the prior one
//!   first, so no interval is ever attributed twice;
//! - day attribution uses the local calendar date at flush time: an
//!   interval spanning midnight splits into one flush per date key;
//! - every flush is independently fault-tolerant; a failed store call is
//!   logged and never halts subsequent ticks.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::UsageStore;
use crate::types::{date_key_at, today_key};

/// The single in-memory tracking session.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub site_id: String,
    pub started_at: DateTime<Local>,
    /// Everything up to here has already been emitted as flush ops.
    last_flush_at: DateTime<Local>,
}

/// One pending write of accumulated seconds against a day's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOp {
    pub date_key: String,
    pub site_id: String,
    pub seconds: u64,
}

/// Pure session state machine. All methods take `now` explicitly.
#[derive(Debug, Default)]
pub struct RecorderState {
    session: Option<TrackingSession>,
}

impl RecorderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize any existing session, then start tracking `site_id`.
    ///
    /// Returns the flush ops of the finalized session. An empty or
    /// whitespace site id is a no-op that returns nothing.
    pub fn start(&mut self, site_id: &str, now: DateTime<Local>) -> Vec<FlushOp> {
        let site_id = site_id.trim();
        if site_id.is_empty() {
            warn!("start_tracking called with empty site id, ignoring");
            return Vec::new();
        }
        let ops = self.stop(now);
        self.session = Some(TrackingSession {
            site_id: site_id.to_string(),
            started_at: now,
            last_flush_at: now,
        });
        ops
    }

    /// Emit flush ops for the whole seconds elapsed since the last flush.
    ///
    /// Sub-second remainder is carried forward rather than dropped, so a
    /// steady tick never under-counts systematically. No session → nothing.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<FlushOp> {
        let Some(session) = &mut self.session else {
            return Vec::new();
        };
        let total = (now - session.last_flush_at).num_seconds();
        if total <= 0 {
            return Vec::new();
        }
        let consumed_to = session.last_flush_at + Duration::seconds(total);
        let ops = split_interval(&session.site_id, session.last_flush_at, consumed_to);
        session.last_flush_at = consumed_to;
        ops
    }

    /// Finalize the active session, emitting its last partial interval.
    ///
    /// No active session is a no-op.
    pub fn stop(&mut self, now: DateTime<Local>) -> Vec<FlushOp> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        let total = (now - session.last_flush_at).num_seconds();
        if total <= 0 {
            return Vec::new();
        }
        let consumed_to = session.last_flush_at + Duration::seconds(total);
        split_interval(&session.site_id, session.last_flush_at, consumed_to)
    }

    pub fn active_site(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.site_id.as_str())
    }
}

/// Split `[from, to)` into one flush op per local calendar date.
///
/// The op seconds always sum to the truncated whole-second length of the
/// interval; anything unattributable at a day boundary lands on the end
/// date.
fn split_interval(site_id: &str, from: DateTime<Local>, to: DateTime<Local>) -> Vec<FlushOp> {
    let total = (to - from).num_seconds();
    if total <= 0 {
        return Vec::new();
    }
    let mut ops = Vec::new();
    let mut remaining = total as u64;
    let mut cursor = from;
    while cursor.date_naive() < to.date_naive() && remaining > 0 {
        let Some(next_day) = cursor.date_naive().succ_opt() else {
            break;
        };
        let Some(midnight) = Local
            .from_local_datetime(&next_day.and_time(NaiveTime::MIN))
            .earliest()
        else {
            // No representable local midnight (DST gap); attribute the rest
            // to the end date below.
            break;
        };
        let secs = ((midnight - cursor).num_seconds().max(0) as u64).min(remaining);
        if secs > 0 {
            ops.push(FlushOp {
                date_key: date_key_at(cursor),
                site_id: site_id.to_string(),
                seconds: secs,
            });
            remaining -= secs;
        }
        cursor = midnight;
    }
    if remaining > 0 {
        ops.push(FlushOp {
            date_key: date_key_at(to),
            site_id: site_id.to_string(),
            seconds: remaining,
        });
    }
    ops
}

/// Apply flush ops read-modify-write against the store.
///
/// Each op is independently fault-tolerant: a failed read or write is
/// logged and the remaining ops still run.
pub fn apply_flush_ops(store: &dyn UsageStore, ops: &[FlushOp]) {
    for op in ops {
        let day = match store.usage_stats(&op.date_key) {
            Ok(day) => day,
            Err(err) => {
                warn!(
                    "usage read failed for {} / {}: {err}, dropping flush of {}s",
                    op.date_key, op.site_id, op.seconds
                );
                continue;
            }
        };
        let mut record = day.get(&op.site_id).copied().unwrap_or_default();
        record.time_spent_seconds += op.seconds;
        if let Err(err) = store.update_usage_stats(&op.date_key, &op.site_id, record) {
            warn!(
                "usage write failed for {} / {}: {err}, dropping flush of {}s",
                op.date_key, op.site_id, op.seconds
            );
        }
    }
}

struct Ticker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Async owner of the recorder: spawns the recurring flush tick and is the
/// single mutation path for the session state.
pub struct UsageRecorder {
    state: Arc<Mutex<RecorderState>>,
    store: Arc<dyn UsageStore>,
    tick_interval: StdDuration,
    ticker: Option<Ticker>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn UsageStore>, tick_interval: StdDuration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::new())),
            store,
            tick_interval,
            ticker: None,
        }
    }

    /// Finalize any running session and start tracking `site_id`.
    ///
    /// Cancels the previous recurring tick before arming a new one, so a
    /// superseded session cannot leak a timer.
    pub async fn start_tracking(&mut self, site_id: &str) {
        if site_id.trim().is_empty() {
            warn!("start_tracking called with empty site id, ignoring");
            return;
        }
        self.cancel_ticker().await;
        let ops = match self.state.lock() {
            Ok(mut state) => state.start(site_id, Local::now()),
            Err(_) => {
                warn!("recorder state poisoned, ignoring start_tracking");
                return;
            }
        };
        apply_flush_ops(self.store.as_ref(), &ops);
        info!("tracking started for site {site_id}");
        self.spawn_ticker();
    }

    /// Flush the final partial interval and clear the session.
    ///
    /// Calling with no active session is a no-op.
    pub async fn stop_tracking(&mut self) {
        self.cancel_ticker().await;
        let ops = match self.state.lock() {
            Ok(mut state) => state.stop(Local::now()),
            Err(_) => {
                warn!("recorder state poisoned, ignoring stop_tracking");
                return;
            }
        };
        if !ops.is_empty() {
            debug!("final flush of {} op(s)", ops.len());
        }
        apply_flush_ops(self.store.as_ref(), &ops);
    }

    /// Increment today's open counter for `site_id` by exactly one.
    ///
    /// Independent of time tracking. Invalid ids are a no-op; persistence
    /// failures are logged and swallowed.
    pub fn record_open(&self, site_id: &str) {
        let site_id = site_id.trim();
        if site_id.is_empty() {
            warn!("record_open called with empty site id, ignoring");
            return;
        }
        let today = today_key();
        let day = match self.store.usage_stats(&today) {
            Ok(day) => day,
            Err(err) => {
                warn!("open count read failed for {site_id}: {err}");
                return;
            }
        };
        let mut record = day.get(site_id).copied().unwrap_or_default();
        record.opens += 1;
        if let Err(err) = self.store.update_usage_stats(&today, site_id, record) {
            warn!("open count write failed for {site_id}: {err}");
        }
    }

    /// The site currently accruing time, if any.
    pub fn active_site(&self) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.active_site().map(str::to_string))
    }

    fn spawn_ticker(&mut self) {
        let token = CancellationToken::new();
        let child = token.clone();
        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let period = self.tick_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let ops = match state.lock() {
                            Ok(mut state) => state.tick(Local::now()),
                            Err(_) => {
                                warn!("recorder state poisoned, stopping ticker");
                                break;
                            }
                        };
                        apply_flush_ops(store.as_ref(), &ops);
                    }
                    _ = child.cancelled() => {
                        debug!("recorder ticker shutting down");
                        break;
                    }
                }
            }
        });
        self.ticker = Some(Ticker { token, handle });
    }

    async fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.token.cancel();
            if ticker.handle.await.is_err() {
                warn!("recorder ticker task failed to join");
            }
        }
    }
}

impl Drop for UsageRecorder {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 6, h, m, s).unwrap()
    }

    #[test]
    fn switch_attributes_time_to_each_site_once() {
        let mut state = RecorderState::new();
        let t0 = at(12, 0, 0);

        assert!(state.start("a", t0).is_empty());
        let ops = state.start("b", t0 + Duration::seconds(5));
        assert_eq!(
            ops,
            vec![FlushOp {
                date_key: "2024-03-06".into(),
                site_id: "a".into(),
                seconds: 5,
            }]
        );

        let ops = state.stop(t0 + Duration::seconds(10));
        assert_eq!(
            ops,
            vec![FlushOp {
                date_key: "2024-03-06".into(),
                site_id: "b".into(),
                seconds: 5,
            }]
        );
        assert!(state.active_site().is_none());
    }

    #[test]
    fn tick_flushes_incrementally() {
        let mut state = RecorderState::new();
        let t0 = at(9, 0, 0);
        state.start("a", t0);

        let ops = state.tick(t0 + Duration::seconds(5));
        assert_eq!(ops[0].seconds, 5);
        let ops = state.tick(t0 + Duration::seconds(10));
        assert_eq!(ops[0].seconds, 5);
        // Stop right after a tick: nothing left to flush.
        assert!(state.stop(t0 + Duration::seconds(10)).is_empty());
    }

    #[test]
    fn tick_without_session_is_noop() {
        let mut state = RecorderState::new();
        assert!(state.tick(at(9, 0, 0)).is_empty());
        assert!(state.stop(at(9, 0, 0)).is_empty());
    }

    #[test]
    fn empty_site_id_is_noop() {
        let mut state = RecorderState::new();
        assert!(state.start("  ", at(9, 0, 0)).is_empty());
        assert!(state.active_site().is_none());
    }

    #[test]
    fn sub_second_remainder_carries_forward() {
        let mut state = RecorderState::new();
        let t0 = at(9, 0, 0);
        state.start("a", t0);
        // 900ms elapsed: nothing flushed, nothing lost.
        assert!(state.tick(t0 + Duration::milliseconds(900)).is_empty());
        let ops = state.tick(t0 + Duration::milliseconds(2000));
        assert_eq!(ops[0].seconds, 2);
    }

    #[test]
    fn midnight_span_splits_into_two_date_keys() {
        let mut state = RecorderState::new();
        let before = Local.with_ymd_and_hms(2024, 3, 6, 23, 59, 50).unwrap();
        state.start("a", before);
        let ops = state.stop(before + Duration::seconds(20));
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].date_key, "2024-03-06");
        assert_eq!(ops[0].seconds, 10);
        assert_eq!(ops[1].date_key, "2024-03-07");
        assert_eq!(ops[1].seconds, 10);
    }

    #[test]
    fn restart_same_site_finalizes_previous_session() {
        let mut state = RecorderState::new();
        let t0 = at(9, 0, 0);
        state.start("a", t0);
        let ops = state.start("a", t0 + Duration::seconds(3));
        assert_eq!(ops[0].seconds, 3);
        assert_eq!(state.active_site(), Some("a"));
    }

    proptest! {
        #[test]
        fn split_preserves_total_seconds(start_secs in 0u32..86_400, len in 1u32..200_000) {
            let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
            let from = Local
                .from_local_datetime(&day.and_time(NaiveTime::MIN))
                .single()
                .unwrap()
                + Duration::seconds(start_secs as i64);
            let to = from + Duration::seconds(len as i64);
            let ops = split_interval("a", from, to);
            let total: u64 = ops.iter().map(|op| op.seconds).sum();
            prop_assert_eq!(total, len as u64);
            // Date keys are emitted in chronological order without repeats.
            let keys: Vec<_> = ops.iter().map(|op| op.date_key.clone()).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(keys.len(), sorted.len());
        }
    }

    mod async_owner {
        use super::*;
        use crate::storage::MemoryStore;
        use crate::types::today_key;

        #[tokio::test]
        async fn record_open_increments_by_one() {
            let store = Arc::new(MemoryStore::new());
            let recorder = UsageRecorder::new(store.clone(), StdDuration::from_secs(5));
            recorder.record_open("a");
            recorder.record_open("a");
            let usage = store.usage_for(&today_key(), "a").unwrap();
            assert_eq!(usage.opens, 2);
            assert_eq!(usage.time_spent_seconds, 0);
        }

        #[tokio::test]
        async fn record_open_invalid_id_is_noop() {
            let store = Arc::new(MemoryStore::new());
            let recorder = UsageRecorder::new(store.clone(), StdDuration::from_secs(5));
            recorder.record_open("   ");
            assert!(store.usage_for(&today_key(), "").is_none());
        }

        #[tokio::test]
        async fn record_open_swallows_store_failures() {
            let store = Arc::new(MemoryStore::new());
            store.set_fail_writes(true);
            let recorder = UsageRecorder::new(store.clone(), StdDuration::from_secs(5));
            recorder.record_open("a");
            assert!(store.usage_for(&today_key(), "a").is_none());
        }

        #[tokio::test]
        async fn start_stop_without_elapsed_time_writes_nothing() {
            let store = Arc::new(MemoryStore::new());
            let mut recorder = UsageRecorder::new(store.clone(), StdDuration::from_secs(5));
            recorder.start_tracking("a").await;
            recorder.stop_tracking().await;
            assert!(store.usage_for(&today_key(), "a").is_none());
        }

        #[tokio::test]
        async fn failed_flush_does_not_stop_later_ones() {
            let store = Arc::new(MemoryStore::new());
            let ops = vec![
                FlushOp {
                    date_key: "2024-03-06".into(),
                    site_id: "a".into(),
                    seconds: 5,
                },
                FlushOp {
                    date_key: "2024-03-06".into(),
                    site_id: "b".into(),
                    seconds: 7,
                },
            ];
            store.set_fail_writes(true);
            apply_flush_ops(store.as_ref(), &ops[..1]);
            store.set_fail_writes(false);
            apply_flush_ops(store.as_ref(), &ops[1..]);
            assert!(store.usage_for("2024-03-06", "a").is_none());
            assert_eq!(store.usage_for("2024-03-06", "b").unwrap().time_spent_seconds, 7);
        }
    }
}
