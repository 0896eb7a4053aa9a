/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Call statistics: instance totals plus a rolling window per pattern.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Per-pattern counters with a rolling window of recent durations.
#[derive(Debug, Default)]
struct ActionStats {
    calls: usize,
    done: usize,
    fails: usize,
    window: VecDeque<u64>,
}

/// Snapshot of one pattern's statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionStatsSnapshot {
    /// Calls that reached the action.
    pub calls: usize,
    /// Calls that completed without error.
    pub done: usize,
    /// Calls that completed with an error.
    pub fails: usize,
    /// Mean duration over the window, in milliseconds.
    pub mean_ms: f64,
    /// Most recent durations, oldest first, in milliseconds.
    pub window: Vec<u64>,
}

/// Snapshot of an instance's statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Calls submitted.
    pub calls: usize,
    /// Calls completed without error.
    pub done: usize,
    /// Calls completed with an error.
    pub fails: usize,
    /// Calls answered from the reply history.
    pub cache_hits: usize,
    /// Per-pattern statistics keyed by canonical pattern.
    pub actions: BTreeMap<String, ActionStatsSnapshot>,
}

/// Live statistics of an instance.
///
/// Totals are relaxed atomics; per-pattern entries sit behind their own lock so
/// interleaved calls never contend on one map-wide lock.
#[derive(Debug)]
pub struct Stats {
    calls: AtomicUsize,
    done: AtomicUsize,
    fails: AtomicUsize,
    cache_hits: AtomicUsize,
    window: usize,
    actions: DashMap<String, Mutex<ActionStats>>,
}

impl Stats {
    /// Creates empty statistics keeping `window` durations per pattern.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            fails: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            window,
            actions: DashMap::new(),
        }
    }

    /// Total calls submitted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Total calls completed without error.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Total calls completed with an error.
    pub fn fails(&self) -> usize {
        self.fails.load(Ordering::Relaxed)
    }

    /// Total history replays.
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub(crate) fn record_submit(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_call(&self, pattern: &str) {
        self.actions
            .entry(pattern.to_string())
            .or_default()
            .lock()
            .calls += 1;
    }

    pub(crate) fn record_completion(&self, pattern: Option<&str>, ok: bool, duration_ms: u64) {
        if ok {
            self.done.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fails.fetch_add(1, Ordering::Relaxed);
        }
        let Some(pattern) = pattern else {
            return;
        };
        let entry = self.actions.entry(pattern.to_string()).or_default();
        let mut action = entry.lock();
        if ok {
            action.done += 1;
        } else {
            action.fails += 1;
        }
        action.window.push_back(duration_ms);
        while action.window.len() > self.window {
            action.window.pop_front();
        }
    }

    /// A consistent-enough copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let actions = self
            .actions
            .iter()
            .map(|entry| {
                let action = entry.value().lock();
                #[allow(clippy::cast_precision_loss)]
                let mean_ms = if action.window.is_empty() {
                    0.0
                } else {
                    action.window.iter().sum::<u64>() as f64 / action.window.len() as f64
                };
                (
                    entry.key().clone(),
                    ActionStatsSnapshot {
                        calls: action.calls,
                        done: action.done,
                        fails: action.fails,
                        mean_ms,
                        window: action.window.iter().copied().collect(),
                    },
                )
            })
            .collect();
        StatsSnapshot {
            calls: self.calls(),
            done: self.done(),
            fails: self.fails(),
            cache_hits: self.cache_hits(),
            actions,
        }
    }
}
