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

//! Per-call metadata.
//!
//! A [`Meta`] is resolved fresh for every dispatch, filled in by the inward pipeline
//! and frozen behind an `Arc` once the handler runs. Ancestry is stored flat: each call
//! copies its direct parent's descriptor in front of the parent's own `parents`, so
//! any ancestor is reachable without walking pointers.

use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use acton_pattern_core::idgen::idgen;
use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::common::IdConfig;
use crate::message::Directives;
use crate::plugin::PluginRef;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// A mutable map shared by reference.
///
/// Used for `meta.custom`, which must be the same object across a whole call tree,
/// and for plugin shared state.
#[derive(Clone, Default)]
pub struct SharedMap(Arc<Mutex<Msg>>);

impl SharedMap {
    /// Wraps `initial` in a new shared map.
    #[must_use]
    pub fn new(initial: Msg) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    /// Reads one field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    /// Writes one field.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.lock().insert(key.into(), value);
    }

    /// Merges `patch` in with the given precedence.
    pub fn merge(&self, patch: Msg, mode: MergeMode) {
        merge_map(&mut self.0.lock(), patch, mode);
    }

    /// A copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Msg {
        self.0.lock().clone()
    }

    /// Returns `true` if both handles point at the same map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedMap").field(&*self.0.lock()).finish()
    }
}

/// Summary of one call, as seen by its descendants and in trace logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceDescriptor {
    /// Canonical pattern of the matched action.
    pub pattern: String,
    /// Call id, `mi/tx`.
    pub id: String,
    /// Instance id.
    pub instance: String,
    /// Instance tag.
    pub tag: String,
    /// Instance version.
    pub version: String,
    /// Start time, epoch milliseconds.
    pub start: u64,
    /// End time, epoch milliseconds, once known.
    pub end: Option<u64>,
    /// Reply expectation flag.
    pub sync: bool,
    /// Action id.
    pub action: String,
}

/// Append-only list shared by reference between a call and its children.
#[derive(Debug, Clone, Default)]
pub struct TraceLog(Arc<Mutex<Vec<TraceDescriptor>>>);

impl TraceLog {
    pub(crate) fn push(&self, descriptor: TraceDescriptor) {
        self.0.lock().push(descriptor);
    }

    /// Descriptors of child calls that completed so far, in completion order.
    #[must_use]
    pub fn entries(&self) -> Vec<TraceDescriptor> {
        self.0.lock().clone()
    }
}

/// Explain entries collected across a call tree when `explain$` is set.
#[derive(Debug, Clone, Default)]
pub struct ExplainLog(Arc<Mutex<Vec<Value>>>);

impl ExplainLog {
    pub(crate) fn push(&self, entry: Value) {
        self.0.lock().push(entry);
    }

    /// All entries, in completion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.0.lock().clone()
    }
}

/// Resolved per-call defaults coming from the calling delegate chain.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CallDefaults {
    pub(crate) gate: Option<bool>,
    pub(crate) fatal: Option<bool>,
    pub(crate) local: Option<bool>,
    pub(crate) timeout: Option<u64>,
}

/// Identity of the instance that runs a call.
#[derive(Debug, Clone)]
pub(crate) struct Origin {
    pub(crate) instance: String,
    pub(crate) tag: String,
    pub(crate) version: String,
    pub(crate) action_timeout_ms: u64,
}

/// Metadata of one call.
#[derive(Debug, Clone)]
pub struct Meta {
    /// `mi/tx`
    pub id: String,
    /// Message id.
    pub mi: String,
    /// Transaction id, shared by a call and its descendants unless overridden.
    pub tx: String,
    /// Start time, epoch milliseconds.
    pub start: u64,
    /// End time, epoch milliseconds; set in the outward pipeline.
    pub end: Option<u64>,
    /// Deadline in milliseconds; `0` means none.
    pub timeout: u64,
    /// Whether the call opened a gate scope for its children.
    pub gate: bool,
    /// Whether an error reply is instance-fatal.
    pub fatal: bool,
    /// Reply expectation flag.
    pub sync: bool,
    /// Keep in-process.
    pub local: bool,
    /// Arrived over a transport.
    pub remote: bool,
    /// Let through a closing instance; inherited by child calls.
    pub closing: bool,
    /// Custom data shared by reference across the whole call tree.
    pub custom: Option<SharedMap>,
    /// Ancestor descriptors, direct parent first.
    pub parents: Vec<TraceDescriptor>,
    /// Action id this call was routed to through `prior$`.
    pub prior: Option<String>,
    /// Canonical pattern of the matched action.
    pub pattern: String,
    /// Matched action id.
    pub action: String,
    /// Plugin that registered the matched action.
    pub plugin: PluginRef,
    /// Descriptors of completed child calls.
    pub trace: TraceLog,
    /// Set when the call completed with an error.
    pub error: bool,
    /// Explain log shared across the call tree.
    pub explain: Option<ExplainLog>,
    /// Instance id.
    pub instance: String,
    /// Instance tag.
    pub tag: String,
    /// Instance version.
    pub version: String,
    pub(crate) began: Instant,
}

impl Meta {
    /// Resolves identity, flags and ancestry for a new call.
    ///
    /// Per-call directives win over delegate defaults, which win over instance
    /// defaults. Ids and `custom` are inherited from the parent when not given.
    pub(crate) fn resolve(
        directives: &Directives,
        defaults: CallDefaults,
        parent: Option<&Meta>,
        origin: &Origin,
        ids: &IdConfig,
    ) -> Self {
        let mi = directives
            .id
            .clone()
            .unwrap_or_else(|| idgen(ids.message_id_len));
        let tx = directives
            .tx
            .clone()
            .or_else(|| parent.map(|p| p.tx.clone()))
            .unwrap_or_else(|| idgen(ids.tx_id_len));
        let custom = directives
            .custom
            .clone()
            .map(SharedMap::new)
            .or_else(|| parent.and_then(|p| p.custom.clone()));
        let explain = if directives.explain {
            Some(ExplainLog::default())
        } else {
            parent.and_then(|p| p.explain.clone())
        };
        let parents = parent.map_or_else(Vec::new, |p| {
            let mut chain = Vec::with_capacity(p.parents.len() + 1);
            chain.push(p.descriptor());
            chain.extend(p.parents.iter().cloned());
            chain
        });

        Self {
            id: format!("{mi}/{tx}"),
            mi,
            tx,
            start: now_ms(),
            end: None,
            timeout: directives
                .timeout
                .or(defaults.timeout)
                .unwrap_or(origin.action_timeout_ms),
            gate: directives.gate.or(defaults.gate).unwrap_or(false),
            fatal: directives.fatal.or(defaults.fatal).unwrap_or(false),
            sync: directives.sync.unwrap_or(true),
            local: directives.local.or(defaults.local).unwrap_or(false),
            remote: directives.remote.unwrap_or(false),
            closing: directives.closing || parent.is_some_and(|p| p.closing),
            custom,
            parents,
            prior: directives.prior.clone(),
            pattern: String::new(),
            action: String::new(),
            plugin: PluginRef::root(),
            trace: TraceLog::default(),
            error: false,
            explain,
            instance: origin.instance.clone(),
            tag: origin.tag.clone(),
            version: origin.version.clone(),
            began: Instant::now(),
        }
    }

    /// This call's descriptor, as its children and trace log record it.
    #[must_use]
    pub fn descriptor(&self) -> TraceDescriptor {
        TraceDescriptor {
            pattern: self.pattern.clone(),
            id: self.id.clone(),
            instance: self.instance.clone(),
            tag: self.tag.clone(),
            version: self.version.clone(),
            start: self.start,
            end: self.end,
            sync: self.sync,
            action: self.action.clone(),
        }
    }

    /// Number of ancestors.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Milliseconds since the call started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.began.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn origin() -> Origin {
        Origin {
            instance: "inst".into(),
            tag: "-".into(),
            version: "0.0.0".into(),
            action_timeout_ms: 1000,
        }
    }

    #[test]
    fn children_inherit_tx_custom_and_ancestry() {
        let ids = IdConfig::default();
        let mut root_directives = Directives::default();
        root_directives.custom = json!({"user": "u1"}).as_object().cloned();
        let mut root = Meta::resolve(&root_directives, CallDefaults::default(), None, &origin(), &ids);
        root.pattern = "a:1".into();

        let child = Meta::resolve(&Directives::default(), CallDefaults::default(), Some(&root), &origin(), &ids);
        let grandchild = Meta::resolve(&Directives::default(), CallDefaults::default(), Some(&child), &origin(), &ids);

        assert_eq!(child.tx, root.tx);
        assert_ne!(child.mi, root.mi);
        assert!(grandchild.custom.as_ref().unwrap().ptr_eq(root.custom.as_ref().unwrap()));
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.parents[0].id, child.id);
        assert_eq!(grandchild.parents[1].pattern, "a:1");
    }

    #[test]
    fn directives_beat_delegate_defaults_beat_instance_defaults() {
        let ids = IdConfig::default();
        let defaults = CallDefaults {
            gate: Some(true),
            timeout: Some(200),
            ..CallDefaults::default()
        };
        let meta = Meta::resolve(&Directives::default(), defaults, None, &origin(), &ids);
        assert!(meta.gate);
        assert_eq!(meta.timeout, 200);

        let directives = Directives {
            gate: Some(false),
            timeout: Some(0),
            id: Some("m1".into()),
            tx: Some("t1".into()),
            ..Directives::default()
        };
        let meta = Meta::resolve(&directives, defaults, None, &origin(), &ids);
        assert!(!meta.gate);
        assert_eq!(meta.timeout, 0);
        assert_eq!(meta.id, "m1/t1");

        let meta = Meta::resolve(&Directives::default(), CallDefaults::default(), None, &origin(), &ids);
        assert_eq!(meta.timeout, 1000);
        assert_eq!(meta.mi.len(), ids.message_id_len);
    }
}
