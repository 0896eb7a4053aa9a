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

//! Data carried through the inward and outward call pipelines.

use std::sync::Arc;

use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::{Operation, PipelineData};

use crate::common::ActResult;
use crate::instance::{ActionDef, Delegate};
use crate::message::{Directives, Meta, SharedMap, TraceDescriptor};
use crate::plugin::PluginRef;

/// One call as it moves through the inward pipeline, the handler and the outward
/// pipeline.
pub struct CallData {
    /// The message, directives removed and `tx$` restored.
    pub msg: Msg,
    /// Directives extracted at submission.
    pub directives: Directives,
    /// Call metadata.
    pub meta: Meta,
    /// Matched action, if any.
    pub def: Option<Arc<ActionDef>>,
    /// Reply, once known.
    pub result: Option<ActResult>,
    pub(crate) caller: Arc<Delegate>,
    pub(crate) delegate: Option<Arc<Delegate>>,
    pub(crate) scoped: bool,
    pub(crate) cached: bool,
}

impl CallData {
    /// Returns `true` if the reply was replayed from history.
    #[must_use]
    pub const fn cached(&self) -> bool {
        self.cached
    }
}

/// A partial update to [`CallData`]; each present field is applied.
#[derive(Default)]
pub struct CallPatch {
    /// Fields merged into the message.
    pub message: Option<Msg>,
    /// Fields merged into the shared custom data, which is created if missing.
    pub custom: Option<Msg>,
    /// Ancestor chain.
    pub parents: Option<Vec<TraceDescriptor>>,
    /// Matched pattern.
    pub pattern: Option<String>,
    /// Matched action id.
    pub action: Option<String>,
    /// Registering plugin.
    pub plugin: Option<PluginRef>,
    /// Error flag.
    pub error: Option<bool>,
    /// End time.
    pub end: Option<u64>,
    /// The reply.
    pub result: Option<ActResult>,
    pub(crate) delegate: Option<Arc<Delegate>>,
}

impl CallPatch {
    /// A patch merging `fields` into the message.
    #[must_use]
    pub fn with_message(fields: Msg) -> Self {
        Self {
            message: Some(fields),
            ..Self::default()
        }
    }

    /// A patch setting the reply.
    #[must_use]
    pub fn with_result(result: ActResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }
}

/// Shorthand for the operation type of call pipeline tasks.
pub type CallOperation = Operation<CallData>;

fn apply<T>(slot: &mut T, value: Option<T>, mode: MergeMode, decided: impl Fn(&T) -> bool) {
    if let Some(value) = value {
        if mode == MergeMode::Overwrite || !decided(slot) {
            *slot = value;
        }
    }
}

impl PipelineData for CallData {
    type Patch = CallPatch;
    type Output = ActResult;

    fn merge(&mut self, patch: CallPatch, mode: MergeMode) {
        if let Some(fields) = patch.message {
            merge_map(&mut self.msg, fields, mode);
        }
        if let Some(fields) = patch.custom {
            self.meta
                .custom
                .get_or_insert_with(SharedMap::default)
                .merge(fields, mode);
        }
        apply(&mut self.meta.parents, patch.parents, mode, |p| !p.is_empty());
        apply(&mut self.meta.pattern, patch.pattern, mode, |p| !p.is_empty());
        apply(&mut self.meta.action, patch.action, mode, |a| !a.is_empty());
        apply(&mut self.meta.plugin, patch.plugin, mode, |p| *p != PluginRef::root());
        apply(&mut self.meta.error, patch.error, mode, |e| *e);
        apply(&mut self.meta.end, patch.end.map(Some), mode, Option::is_some);
        apply(&mut self.result, patch.result.map(Some), mode, Option::is_some);
        apply(&mut self.delegate, patch.delegate.map(Some), mode, Option::is_some);
    }
}
