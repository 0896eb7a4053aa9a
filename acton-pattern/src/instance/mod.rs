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

//! The instance: registry, dispatcher and lifecycle owner.
//!
//! An [`Instance`] is a cheap handle made of the shared instance state and a
//! delegate. Every delegate sees the same router, plugins and statistics; what
//! differs is the context it adds to calls: fixed fields, call defaults, the
//! plugin identity and, for action delegates, the running call itself.

use std::sync::Arc;

use acton_pattern_core::idgen::idgen;
use acton_pattern_core::pattern::{Msg, Pattern, DIRECTIVE_SIGIL};
use acton_pattern_core::pipeline::{Placement, TaskPipeline};
use parking_lot::RwLock;
use serde_json::Value;
use static_assertions::assert_impl_all;
use tracing::{info, instrument, trace};

use crate::common::{ActResult, ActionFuture, CallTask, ErrorHook, PatternConfig, StatsSnapshot};
use crate::message::{directives, ActError, ActionContext, CallDefaults, ErrorCode, IntoMessage, PatternSource, SharedMap};
use crate::plugin::{Extension, PluginRef};
use crate::traits::{EntityNormalizer, LogHook};

pub use action_def::{ActionDef, ActionKind, AddOptions, Phase};
pub use call::{CallData, CallOperation, CallPatch};
pub use delegate::DelegateOptions;
pub(crate) use delegate::{ActiveCall, Delegate, DelegateSpec, GateBinding};
pub(crate) use executor::{execute, Responder};
pub use gate::GateScope;
pub use inner::InstanceState;
pub(crate) use inner::InstanceInner;
pub(crate) use invocation::task_failure;
pub(crate) use registration::Registration;
pub use builtins::{CLOSE_PATTERN, DEFINE_PATTERN};
pub(crate) use builtins::define_message;

mod action_def;
mod builtins;
mod call;
mod delegate;
mod executor;
mod gate;
mod inner;
mod invocation;
pub(crate) mod inward;
pub(crate) mod outward;
mod prior;
pub(crate) mod registration;

/// A handle on a pattern-matching instance, seen through one delegate.
#[derive(Clone)]
pub struct Instance {
    pub(crate) root: Arc<InstanceInner>,
    pub(crate) delegate: Arc<Delegate>,
}

assert_impl_all!(Instance: Send, Sync, Clone);

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id())
            .field("delegate", &self.delegate.id())
            .field("plugin", &self.delegate.plugin().fullname)
            .finish_non_exhaustive()
    }
}

impl Instance {
    pub(crate) fn new(root: Arc<InstanceInner>) -> Self {
        Self {
            delegate: Arc::clone(&root.root_delegate),
            root,
        }
    }

    /// The same instance seen through the root delegate.
    pub(crate) fn root_view(&self) -> Self {
        Self::new(Arc::clone(&self.root))
    }

    pub(crate) fn with_delegate(&self, spec: DelegateSpec) -> Self {
        let id = idgen(self.root.config.ids.delegate_id_len);
        Self {
            root: Arc::clone(&self.root),
            delegate: Delegate::child(&self.delegate, id, spec),
        }
    }

    /// Instance id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.root.origin.instance
    }

    /// Instance tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.root.origin.tag
    }

    /// Instance version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.root.origin.version
    }

    /// The configuration the instance was launched with.
    #[must_use]
    pub fn config(&self) -> &PatternConfig {
        &self.root.config
    }

    /// Id of the delegate this handle goes through.
    #[must_use]
    pub fn delegate_id(&self) -> &str {
        self.delegate.id()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.root.state()
    }

    /// Returns `true` once `close` has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.root.state() != InstanceState::Open
    }

    /// Plugin identity attached to registrations made through this handle.
    #[must_use]
    pub fn plugin_ref(&self) -> PluginRef {
        self.delegate.plugin()
    }

    /// Resolved options of the plugin this handle belongs to.
    #[must_use]
    pub fn options(&self) -> Option<Arc<Value>> {
        self.delegate.options()
    }

    /// State shared by the plugin this handle belongs to.
    #[must_use]
    pub fn shared(&self) -> Option<SharedMap> {
        self.delegate.shared()
    }

    /// Registers a handler for `pattern`.
    ///
    /// A later registration of the same pattern overrides this one and can reach
    /// it through [`prior`](Self::prior).
    ///
    /// # Errors
    /// `invalid_pattern` if the pattern or its schema does not parse.
    pub async fn add<F>(&self, pattern: impl Into<PatternSource>, handler: F) -> Result<&Self, ActError>
    where
        F: Fn(ActionContext) -> ActionFuture + Send + Sync + 'static,
    {
        self.add_with(pattern, AddOptions::default(), handler).await
    }

    /// Registers a handler with options.
    ///
    /// # Errors
    /// See [`add`](Self::add).
    pub async fn add_with<F>(
        &self,
        pattern: impl Into<PatternSource>,
        options: AddOptions,
        handler: F,
    ) -> Result<&Self, ActError>
    where
        F: Fn(ActionContext) -> ActionFuture + Send + Sync + 'static,
    {
        self.register(pattern.into(), options, ActionKind::Handler(Arc::new(handler)))
            .await?;
        Ok(self)
    }

    /// Observes matching messages before their handler runs.
    ///
    /// An error fails the call with `sub_inward_action_failed`.
    ///
    /// # Errors
    /// See [`add`](Self::add).
    pub async fn sub<F>(&self, pattern: impl Into<PatternSource>, subscriber: F) -> Result<&Self, ActError>
    where
        F: Fn(&Msg) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let kind = ActionKind::Subscriber(Phase::Inward, Arc::new(move |msg: &Msg, _: Option<&ActResult>| subscriber(msg)));
        self.register(pattern.into(), AddOptions::default(), kind).await?;
        Ok(self)
    }

    /// Observes matching messages and their results after the handler ran.
    ///
    /// An error replaces the result with `sub_outward_action_failed`.
    ///
    /// # Errors
    /// See [`add`](Self::add).
    pub async fn sub_outward<F>(&self, pattern: impl Into<PatternSource>, subscriber: F) -> Result<&Self, ActError>
    where
        F: Fn(&Msg, &ActResult) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let kind = ActionKind::Subscriber(
            Phase::Outward,
            Arc::new(move |msg: &Msg, result: Option<&ActResult>| match result {
                Some(result) => subscriber(msg, result),
                None => Ok(()),
            }),
        );
        self.register(pattern.into(), AddOptions::default(), kind).await?;
        Ok(self)
    }

    #[instrument(skip_all)]
    async fn register(&self, source: PatternSource, options: AddOptions, kind: ActionKind) -> Result<Arc<ActionDef>, ActError> {
        use acton_pattern_core::pipeline::Outcome;

        let registration = Registration::new(source, options, kind);
        match self.root.registration.exec(self, registration).await {
            Outcome::Done(data) => data
                .into_def()
                .ok_or_else(|| ActError::new(ErrorCode::ActInternal, "registration produced no action")),
            Outcome::Stopped { output, .. } => Err(output),
            Outcome::Failed { task, error, .. } => Err(task_failure("registration", &task, &error)),
        }
    }

    /// Returns `true` if exactly `pattern` is registered.
    #[must_use]
    pub fn has(&self, pattern: &str) -> bool {
        Pattern::parse(pattern).is_ok_and(|pattern| self.root.router.read().find_exact(&pattern).is_some())
    }

    /// The action `msg` would be routed to.
    #[must_use]
    pub fn find(&self, msg: impl IntoMessage) -> Option<Arc<ActionDef>> {
        let mut msg = msg.into_message().ok()?;
        msg.retain(|key, _| !key.ends_with(DIRECTIVE_SIGIL));
        self.root.find_action(&msg, None)
    }

    /// Registered actions whose pattern contains every pair of `partial`, sorted by
    /// canonical pattern.
    ///
    /// # Errors
    /// `invalid_pattern` if `partial` does not parse.
    pub fn list(&self, partial: &str) -> Result<Vec<Arc<ActionDef>>, ActError> {
        let partial = Pattern::parse(partial)?;
        Ok(self
            .root
            .router
            .read()
            .list(&partial)
            .into_iter()
            .map(|entry| Arc::clone(entry.data()))
            .collect())
    }

    /// A delegate adding `options` to every call made through it.
    #[must_use]
    pub fn delegate(&self, options: DelegateOptions) -> Self {
        self.with_delegate(DelegateSpec {
            fixed: options.fixed,
            defaults: options.defaults,
            ..DelegateSpec::default()
        })
    }

    /// A delegate whose calls run one at a time, in submission order.
    #[must_use]
    pub fn gate(&self) -> Self {
        let scope = GateScope::open(self.root.config.ids.delegate_id_len, self.root.shutdown.clone());
        trace!(gate = scope.id(), "gated delegate created");
        self.with_delegate(DelegateSpec {
            gate: GateBinding::Scope(scope),
            defaults: CallDefaults {
                gate: Some(true),
                ..CallDefaults::default()
            },
            ..DelegateSpec::default()
        })
    }

    /// Adds pipeline tasks and a logger.
    ///
    /// # Errors
    /// `act_internal` if a task name is taken or an anchor does not exist.
    pub fn extend(&self, extension: Extension) -> Result<&Self, ActError> {
        let inward = extended(&self.root.inward, extension.inward)?;
        let outward = extended(&self.root.outward, extension.outward)?;
        if let Some(pipeline) = inward {
            *self.root.inward.write() = pipeline;
        }
        if let Some(pipeline) = outward {
            *self.root.outward.write() = pipeline;
        }
        if let Some(logger) = extension.logger {
            self.root.hooks.add_logger(logger);
        }
        Ok(self)
    }

    /// Receives every structured log record.
    pub fn on_log(&self, hook: Arc<dyn LogHook>) -> &Self {
        self.root.hooks.add_logger(hook);
        self
    }

    /// Receives `act_callback` errors raised by reply callbacks.
    pub fn on_callback_error(&self, hook: ErrorHook) -> &Self {
        self.root.hooks.set_callback_error(hook);
        self
    }

    /// Receives instance-fatal errors.
    pub fn on_fatal(&self, hook: ErrorHook) -> &Self {
        self.root.hooks.set_fatal(hook);
        self
    }

    /// Reshapes entity results.
    pub fn set_entity_normalizer(&self, normalizer: Arc<dyn EntityNormalizer>) -> &Self {
        *self.root.entity.write() = Some(normalizer);
        self
    }

    /// Call statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.root.stats.snapshot()
    }

    /// Waits for every plugin queued so far to finish loading.
    ///
    /// Must not be awaited from inside a plugin's define step, which would wait
    /// on itself.
    ///
    /// # Errors
    /// The instance-fatal error when a plugin failed and `behavior.stay_alive` is set.
    pub async fn ready(&self) -> Result<(), ActError> {
        self.root.plugin_gate.run(async {}).await;
        match self.root.fatal.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Closes the instance.
    ///
    /// Runs `sys:instance,cmd:close` so plugins overriding it can clean up, then
    /// rejects all further calls with `closed` and stops gate workers. Closing
    /// twice is a no-op.
    ///
    /// # Errors
    /// The error reply of the close action, if any.
    pub async fn close(&self) -> Result<(), ActError> {
        if !self.root.begin_close() {
            return Ok(());
        }
        info!(id = self.id(), "closing instance");
        let mut msg = builtins::close_message();
        msg.insert(directives::CLOSING.to_string(), Value::Bool(true));
        let result = self.root_view().act(msg).await;
        self.root.finish_close();
        info!(id = self.id(), "instance closed");
        result.map(|_| ())
    }
}

/// A copy of `current` with `tasks` placed, or `None` when there is nothing to add.
///
/// Calls in flight keep the pipeline they started with; a failed placement leaves
/// `current` untouched.
fn extended(
    current: &RwLock<Arc<TaskPipeline<Instance, CallData>>>,
    tasks: Vec<(Placement, CallTask)>,
) -> Result<Option<Arc<TaskPipeline<Instance, CallData>>>, ActError> {
    if tasks.is_empty() {
        return Ok(None);
    }
    let mut pipeline = TaskPipeline::clone(&current.read());
    for (placement, task) in tasks {
        pipeline
            .place(&placement, task)
            .map_err(|e| ActError::new(ErrorCode::ActInternal, format!("cannot extend pipeline: {e}")))?;
    }
    Ok(Some(Arc::new(pipeline)))
}
