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

//! Bounded, time-pruned reply history keyed by message id.
//!
//! Entries share one lifetime, so the list stays ordered by deadline and pruning
//! only ever looks at the front.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::common::ActResult;

#[derive(Debug)]
struct HistoryEntry {
    mi: String,
    expires: Instant,
    result: ActResult,
}

/// Recent replies, replayed when a message id is submitted again.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    ttl: Duration,
    entries: VecDeque<HistoryEntry>,
}

impl History {
    /// Creates an empty history.
    #[must_use]
    pub const fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: VecDeque::new(),
        }
    }

    /// Returns the recorded reply for `mi`, if it is still live.
    pub fn get(&mut self, mi: &str) -> Option<ActResult> {
        self.prune_expired();
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.mi == mi)
            .map(|entry| entry.result.clone())
    }

    /// Records the reply for `mi`, evicting the oldest entries past capacity.
    pub fn record(&mut self, mi: impl Into<String>, result: ActResult) {
        if self.capacity == 0 {
            return;
        }
        self.prune_expired();
        let mi = mi.into();
        self.entries.retain(|entry| entry.mi != mi);
        self.entries.push_back(HistoryEntry {
            mi,
            expires: Instant::now() + self.ttl,
            result,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Remove entries outside the lifetime
    fn prune_expired(&mut self) {
        let now = Instant::now();
        while self.entries.front().is_some_and(|entry| entry.expires <= now) {
            self.entries.pop_front();
        }
    }
}
