//! Keyed debounce/batch scheduler.
//!
//! Separates timing policy from per-item work: callers `enqueue` keyed
//! payloads (last write wins per key) and ask when/whether the batch is due.
//! A batch becomes due at the earliest of three conditions: the debounce
//! delay after the most recent enqueue, the pending set reaching the batch
//! size threshold, or the time since the pending window opened exceeding the
//! max-wait ceiling. The last one bounds staleness when enqueues keep
//! re-arming the debounce delay.
//!
//! Every method takes `now` explicitly, so tests drive it with a virtual
//! clock instead of real timers.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

/// Flush policy: when does a pending batch become due.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// Debounce delay after the most recent enqueue.
    pub delay: Duration,
    /// Flush immediately once this many keys are pending.
    pub max_batch: usize,
    /// Never let pending work wait longer than this once enqueued.
    pub max_wait: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::milliseconds(250),
            max_batch: 8,
            max_wait: Duration::seconds(2),
        }
    }
}

/// Pending keyed payloads plus the flush-policy bookkeeping.
#[derive(Debug)]
pub struct BatchScheduler<K, V> {
    pending: HashMap<K, V>,
    policy: BatchPolicy,
    /// Debounce deadline, re-armed on every enqueue.
    deadline: Option<DateTime<Utc>>,
    /// Max-wait baseline: the instant the current pending window opened.
    window_start: DateTime<Utc>,
}

impl<K: Eq + Hash, V> BatchScheduler<K, V> {
    pub fn new(policy: BatchPolicy, now: DateTime<Utc>) -> Self {
        Self {
            pending: HashMap::new(),
            policy,
            deadline: None,
            window_start: now,
        }
    }

    /// Insert or overwrite the payload for `key` and re-arm the debounce
    /// delay. O(1) regardless of call frequency.
    ///
    /// The first enqueue into an empty set opens a fresh pending window, so
    /// an idle stretch never counts against the max-wait ceiling.
    pub fn enqueue(&mut self, key: K, payload: V, now: DateTime<Utc>) {
        if self.pending.is_empty() {
            self.window_start = now;
        }
        self.pending.insert(key, payload);
        self.deadline = Some(now + self.policy.delay);
    }

    /// Whether the pending batch is due for a flush at `now`.
    pub fn ready(&self, now: DateTime<Utc>) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        if self.pending.len() >= self.policy.max_batch {
            return true;
        }
        if now - self.window_start >= self.policy.max_wait {
            return true;
        }
        self.deadline.is_some_and(|d| now >= d)
    }

    /// The instant at which the pending batch will become due, or `None`
    /// when nothing is pending. Used by the driver to arm its timer.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        if self.pending.is_empty() {
            return None;
        }
        let ceiling = self.window_start + self.policy.max_wait;
        match self.deadline {
            Some(d) => Some(d.min(ceiling)),
            None => Some(ceiling),
        }
    }

    /// Forget the pending payload for `key`, if any.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key)
    }

    /// Drain every pending entry and reset the flush bookkeeping.
    pub fn drain(&mut self, now: DateTime<Utc>) -> Vec<(K, V)> {
        self.deadline = None;
        self.window_start = now;
        self.pending.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
