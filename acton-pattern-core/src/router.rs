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

//! Specificity router.
//!
//! Patterns are stored in a trie whose edges are `field:value` steps taken in
//! canonical field order. A lookup walks every edge the message satisfies and keeps
//! the deepest entry, so the answer is always the most specific registered pattern.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use static_assertions::assert_impl_all;
use tracing::trace;

use crate::pattern::{step_matches, Msg, Pattern};

/// A registered pattern together with the data stored under it.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pattern: Pattern,
    key: String,
    data: T,
}

impl<T> Entry<T> {
    /// The registered pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The canonical key the entry is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The data stored under the pattern.
    #[must_use]
    pub const fn data(&self) -> &T {
        &self.data
    }

    /// Orders entries by specificity (more fields first), then by canonical key.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .pattern
            .len()
            .cmp(&self.pattern.len())
            .then_with(|| self.key.cmp(&other.key))
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    entry: Option<Entry<T>>,
    children: BTreeMap<(String, String), Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            entry: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> Node<T> {
    fn visit_matching<'a>(&'a self, msg: &Msg, out: &mut Vec<&'a Entry<T>>) {
        if let Some(entry) = &self.entry {
            out.push(entry);
        }
        for ((field, value), child) in &self.children {
            if step_matches(field, value, msg) {
                child.visit_matching(msg, out);
            }
        }
    }

    fn visit_all<'a>(&'a self, out: &mut Vec<&'a Entry<T>>) {
        if let Some(entry) = &self.entry {
            out.push(entry);
        }
        for child in self.children.values() {
            child.visit_all(out);
        }
    }
}

assert_impl_all!(Router<u32>: Send, Sync, Clone);

/// Trie of canonical patterns with most-specific-match lookup.
///
/// Ties between equally specific patterns are resolved in favour of the
/// lexicographically smallest canonical key, independent of registration order.
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered patterns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `data` under the exact canonical `pattern`, returning the data it replaced.
    pub fn add(&mut self, pattern: Pattern, data: T) -> Option<T> {
        let key = pattern.canonical();
        trace!(pattern = %key, "router add");
        let mut node = &mut self.root;
        for (field, value) in pattern.fields() {
            node = node
                .children
                .entry((field.to_string(), value.to_string()))
                .or_default();
        }
        let previous = node.entry.replace(Entry { pattern, key, data });
        if previous.is_none() {
            self.len += 1;
        }
        previous.map(|entry| entry.data)
    }

    /// Returns the entry stored under exactly this canonical pattern.
    #[must_use]
    pub fn find_exact(&self, pattern: &Pattern) -> Option<&Entry<T>> {
        let mut node = &self.root;
        for (field, value) in pattern.fields() {
            node = node.children.get(&(field.to_string(), value.to_string()))?;
        }
        node.entry.as_ref()
    }

    /// Returns the most specific entry whose pattern is satisfied by `msg`.
    ///
    /// A zero-field catch-all matches every message at the lowest priority.
    #[must_use]
    pub fn find(&self, msg: &Msg) -> Option<&Entry<T>> {
        let mut matches = Vec::new();
        self.root.visit_matching(msg, &mut matches);
        matches.into_iter().min_by(|a, b| a.rank(b))
    }

    /// Returns every entry whose pattern is satisfied by `msg`, most specific first.
    #[must_use]
    pub fn find_all(&self, msg: &Msg) -> Vec<&Entry<T>> {
        let mut matches = Vec::new();
        self.root.visit_matching(msg, &mut matches);
        matches.sort_by(|a, b| a.rank(b));
        matches
    }

    /// Returns every entry whose pattern is a superset of `partial`, in canonical order.
    #[must_use]
    pub fn list(&self, partial: &Pattern) -> Vec<&Entry<T>> {
        let mut all = Vec::with_capacity(self.len);
        self.root.visit_all(&mut all);
        let mut matches: Vec<_> = all
            .into_iter()
            .filter(|entry| entry.pattern.contains(partial))
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    /// Iterates every entry in trie order.
    #[must_use]
    pub fn entries(&self) -> Vec<&Entry<T>> {
        let mut all = Vec::with_capacity(self.len);
        self.root.visit_all(&mut all);
        all
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn msg(value: serde_json::Value) -> Msg {
        value.as_object().cloned().unwrap()
    }

    fn router(patterns: &[&str]) -> Router<String> {
        let mut router = Router::new();
        for p in patterns {
            router.add(Pattern::parse(p).unwrap(), (*p).to_string());
        }
        router
    }

    #[test]
    fn find_returns_most_specific_match() {
        let router = router(&["a:1", "a:1,b:2", "a:1,b:2,c:3", "b:2"]);
        let found = router.find(&msg(json!({"a": 1, "b": 2, "d": 4}))).unwrap();
        assert_eq!(found.data(), "a:1,b:2");
        let found = router.find(&msg(json!({"a": 1, "b": 2, "c": 3}))).unwrap();
        assert_eq!(found.data(), "a:1,b:2,c:3");
        assert!(router.find(&msg(json!({"c": 3}))).is_none());
    }

    #[test]
    fn find_maximises_matched_field_count_over_all_candidates() {
        let patterns = ["x:1", "y:2", "x:1,z:3", "y:2,z:3,w:4", "x:1,y:2"];
        let router = router(&patterns);
        let message = msg(json!({"x": 1, "y": 2, "z": 3, "w": 4}));
        let found = router.find(&message).unwrap();
        let best = patterns
            .iter()
            .map(|p| Pattern::parse(p).unwrap())
            .filter(|p| p.matches(&message))
            .map(|p| p.len())
            .max()
            .unwrap();
        assert_eq!(found.pattern().len(), best);
        assert_eq!(found.data(), "y:2,z:3,w:4");
    }

    #[test]
    fn ties_resolve_to_smallest_canonical_key() {
        let forward = router(&["a:1", "b:2"]);
        let reverse = router(&["b:2", "a:1"]);
        let message = msg(json!({"a": 1, "b": 2}));
        assert_eq!(forward.find(&message).unwrap().data(), "a:1");
        assert_eq!(reverse.find(&message).unwrap().data(), "a:1");
    }

    #[test]
    fn catch_all_matches_everything_at_lowest_priority() {
        let router = router(&["", "a:1"]);
        assert_eq!(router.find(&msg(json!({"z": 9}))).unwrap().data(), "");
        assert_eq!(router.find(&msg(json!({"a": 1}))).unwrap().data(), "a:1");
    }

    #[test]
    fn wildcard_fields_match_any_present_value() {
        let router = router(&["role:user,cmd:*", "role:user,cmd:load"]);
        let found = router.find(&msg(json!({"role": "user", "cmd": "save"}))).unwrap();
        assert_eq!(found.data(), "role:user,cmd:*");
        let found = router.find(&msg(json!({"role": "user", "cmd": "load"}))).unwrap();
        assert_eq!(found.pattern().canonical(), "cmd:*,role:user");
        assert!(router.find(&msg(json!({"role": "user"}))).is_none());
    }

    #[test]
    fn add_replaces_exact_collisions_only() {
        let mut router = Router::new();
        assert!(router.add(Pattern::parse("a:1").unwrap(), 1).is_none());
        assert!(router.add(Pattern::parse("a:1,b:2").unwrap(), 2).is_none());
        assert_eq!(router.add(Pattern::parse("a:1").unwrap(), 3), Some(1));
        assert_eq!(router.len(), 2);
        assert_eq!(*router.find_exact(&Pattern::parse("a:1").unwrap()).unwrap().data(), 3);
        assert!(router.find_exact(&Pattern::parse("b:2").unwrap()).is_none());
    }

    #[test]
    fn find_all_and_list_support_weak_matching() {
        let router = router(&["a:1", "a:1,b:2", "c:3", ""]);
        let all: Vec<_> = router
            .find_all(&msg(json!({"a": 1, "b": 2})))
            .into_iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(all, vec!["a:1,b:2", "a:1", ""]);

        let listed: Vec<_> = router
            .list(&Pattern::parse("a:1").unwrap())
            .into_iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(listed, vec!["a:1", "a:1,b:2"]);
        assert_eq!(router.list(&Pattern::new()).len(), 4);
    }
}
