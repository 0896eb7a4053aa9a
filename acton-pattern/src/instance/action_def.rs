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

use std::fmt;
use std::sync::Arc;

use acton_pattern_core::pattern::{Msg, Pattern};
use parking_lot::RwLock;

use crate::common::{ActionHandler, HandleHook, SubscriberFn};
use crate::message::SharedMap;
use crate::plugin::PluginRef;
use crate::traits::MessageValidator;

/// Which side of the handler a subscriber runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the handler, seeing only the message.
    Inward,
    /// After the handler, seeing the message and the result.
    Outward,
}

/// The callable part of an action definition.
#[derive(Clone)]
pub enum ActionKind {
    /// A handler that must reply.
    Handler(Arc<ActionHandler>),
    /// A subscriber that observes but never answers.
    Subscriber(Phase, Arc<SubscriberFn>),
}

/// Options accepted by [`Instance::add_with`](crate::prelude::Instance::add_with).
#[derive(Clone, Default)]
pub struct AddOptions {
    pub(crate) validate: Option<Arc<dyn MessageValidator>>,
    pub(crate) fixed: Msg,
    pub(crate) deprecate: Option<String>,
    pub(crate) custom: Msg,
    pub(crate) handle: Option<HandleHook>,
}

impl AddOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates messages before the handler runs.
    #[must_use]
    pub fn validate(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validate = Some(validator);
        self
    }

    /// Fields injected into every matched message.
    #[must_use]
    pub fn fixed(mut self, fields: Msg) -> Self {
        self.fixed = fields;
        self
    }

    /// Logs a deprecation notice whenever the action is called.
    #[must_use]
    pub fn deprecate(mut self, notice: impl Into<String>) -> Self {
        self.deprecate = Some(notice.into());
        self
    }

    /// Fields merged into the call's shared custom data.
    #[must_use]
    pub fn custom(mut self, fields: Msg) -> Self {
        self.custom = fields;
        self
    }

    /// Takes over later registrations of the same pattern.
    #[must_use]
    pub fn handle(mut self, hook: HandleHook) -> Self {
        self.handle = Some(hook);
        self
    }
}

/// A resolved, registered action.
///
/// Immutable once registered, apart from its plugin identity, which the plugin
/// lifecycle may update once after the plugin's define step settles its name.
pub struct ActionDef {
    pub(crate) id: String,
    pub(crate) pattern: Pattern,
    pub(crate) kind: ActionKind,
    pub(crate) plugin: RwLock<PluginRef>,
    pub(crate) prior: Option<String>,
    pub(crate) validate: Option<Arc<dyn MessageValidator>>,
    pub(crate) fixed: Msg,
    pub(crate) deprecate: Option<String>,
    pub(crate) custom: Msg,
    pub(crate) handle: Option<HandleHook>,
    pub(crate) shared: Option<SharedMap>,
}

impl ActionDef {
    /// Unique action id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registered pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Canonical pattern text.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.pattern.canonical()
    }

    /// Identity of the registering plugin.
    #[must_use]
    pub fn plugin(&self) -> PluginRef {
        self.plugin.read().clone()
    }

    /// Id of the definition this one overrides.
    #[must_use]
    pub fn prior_id(&self) -> Option<&str> {
        self.prior.as_deref()
    }

    /// Deprecation notice, if any.
    #[must_use]
    pub fn deprecation(&self) -> Option<&str> {
        self.deprecate.as_deref()
    }

    /// Returns `true` for subscribers.
    #[must_use]
    pub const fn is_subscription(&self) -> bool {
        matches!(self.kind, ActionKind::Subscriber(..))
    }

    pub(crate) fn annotate(&self, plugin: PluginRef) {
        *self.plugin.write() = plugin;
    }
}

impl fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDef")
            .field("id", &self.id)
            .field("pattern", &self.pattern.canonical())
            .field("plugin", &self.plugin.read().fullname)
            .field("prior", &self.prior)
            .field("subscription", &self.is_subscription())
            .finish_non_exhaustive()
    }
}
