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

//! Delegates: context-scoped views of an instance.
//!
//! A delegate holds only its own overrides plus a parent reference. Every lookup
//! walks the chain towards the root and takes the first value found.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use serde_json::Value;

use crate::instance::{ActionDef, GateScope};
use crate::message::{CallDefaults, Meta, SharedMap};
use crate::plugin::PluginRef;

/// How a delegate relates to gate scopes.
#[derive(Debug, Clone, Default)]
pub(crate) enum GateBinding {
    /// Use whatever the parent uses.
    #[default]
    Inherit,
    /// Calls made through this delegate queue on this scope.
    Scope(GateScope),
}

/// The call a delegate was created for, used by `prior` and nested calls.
#[derive(Clone)]
pub(crate) struct ActiveCall {
    pub(crate) def: Arc<ActionDef>,
    pub(crate) meta: Arc<Meta>,
    pub(crate) settled: Arc<AtomicBool>,
}

impl ActiveCall {
    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

/// Overrides carried by one delegate.
#[derive(Default)]
pub(crate) struct DelegateSpec {
    pub(crate) fixed: Msg,
    pub(crate) defaults: CallDefaults,
    pub(crate) gate: GateBinding,
    pub(crate) plugin: Option<PluginRef>,
    pub(crate) shared: Option<SharedMap>,
    pub(crate) options: Option<Arc<Value>>,
    pub(crate) active: Option<ActiveCall>,
}

/// Overrides for a delegate made with [`Instance::delegate`](crate::prelude::Instance::delegate).
#[derive(Debug, Clone, Default)]
pub struct DelegateOptions {
    pub(crate) fixed: Msg,
    pub(crate) defaults: CallDefaults,
}

impl DelegateOptions {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields merged into every message submitted through the delegate.
    #[must_use]
    pub fn fixed(mut self, fields: Msg) -> Self {
        self.fixed = fields;
        self
    }

    /// Default `timeout$`.
    #[must_use]
    pub const fn timeout(mut self, ms: u64) -> Self {
        self.defaults.timeout = Some(ms);
        self
    }

    /// Default `fatal$`.
    #[must_use]
    pub const fn fatal(mut self, fatal: bool) -> Self {
        self.defaults.fatal = Some(fatal);
        self
    }

    /// Default `local$`.
    #[must_use]
    pub const fn local(mut self, local: bool) -> Self {
        self.defaults.local = Some(local);
        self
    }

    /// Default `gate$`.
    #[must_use]
    pub const fn gate(mut self, gate: bool) -> Self {
        self.defaults.gate = Some(gate);
        self
    }
}

pub(crate) struct Delegate {
    id: String,
    parent: Option<Arc<Delegate>>,
    spec: DelegateSpec,
}

impl Delegate {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            id: "root".to_string(),
            parent: None,
            spec: DelegateSpec::default(),
        })
    }

    pub(crate) fn child(parent: &Arc<Self>, id: String, spec: DelegateSpec) -> Arc<Self> {
        Arc::new(Self {
            id,
            parent: Some(Arc::clone(parent)),
            spec,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    fn chain(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |d| d.parent.as_deref())
    }

    fn find<T>(&self, pick: impl Fn(&DelegateSpec) -> Option<T>) -> Option<T> {
        self.chain().find_map(|d| pick(&d.spec))
    }

    /// Fixed fields from the root down, nearer delegates overriding.
    pub(crate) fn fixed(&self) -> Msg {
        let mut layers: Vec<&Msg> = self.chain().map(|d| &d.spec.fixed).collect();
        layers.reverse();
        let mut fixed = Msg::new();
        for layer in layers.into_iter().filter(|l| !l.is_empty()) {
            merge_map(&mut fixed, layer.clone(), MergeMode::Overwrite);
        }
        fixed
    }

    pub(crate) fn defaults(&self) -> CallDefaults {
        CallDefaults {
            gate: self.find(|s| s.defaults.gate),
            fatal: self.find(|s| s.defaults.fatal),
            local: self.find(|s| s.defaults.local),
            timeout: self.find(|s| s.defaults.timeout),
        }
    }

    pub(crate) fn gate_scope(&self) -> Option<GateScope> {
        self.find(|s| match &s.gate {
            GateBinding::Scope(scope) => Some(scope.clone()),
            GateBinding::Inherit => None,
        })
    }

    pub(crate) fn plugin(&self) -> PluginRef {
        self.find(|s| s.plugin.clone()).unwrap_or_default()
    }

    pub(crate) fn shared(&self) -> Option<SharedMap> {
        self.find(|s| s.shared.clone())
    }

    pub(crate) fn options(&self) -> Option<Arc<Value>> {
        self.find(|s| s.options.clone())
    }

    pub(crate) fn active(&self) -> Option<ActiveCall> {
        self.find(|s| s.active.clone())
    }
}
