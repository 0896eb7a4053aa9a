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

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use acton_pattern_core::idgen::idgen;
use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::{PipelineError, TaskPipeline};
use acton_pattern_core::router::Router;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::{ErrorHook, History, PatternConfig, Stats};
use crate::instance::{inward, outward, registration, ActionDef, CallData, Delegate, GateScope, Instance, Registration};
use crate::message::{ActError, LogRecord, Origin};
use crate::plugin::{lifecycle, PluginInstance, PluginLoad};
use crate::traits::{EntityNormalizer, LogHook, Plugin};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepting calls.
    Open,
    /// `close` is running; only `closing$` calls get through.
    Closing,
    /// Closed for good.
    Closed,
}

/// Caller-supplied observers.
#[derive(Default)]
pub(crate) struct Hooks {
    callback_error: RwLock<Option<ErrorHook>>,
    fatal: RwLock<Option<ErrorHook>>,
    loggers: RwLock<Vec<Arc<dyn LogHook>>>,
}

impl Hooks {
    pub(crate) fn set_callback_error(&self, hook: ErrorHook) {
        *self.callback_error.write() = Some(hook);
    }

    pub(crate) fn set_fatal(&self, hook: ErrorHook) {
        *self.fatal.write() = Some(hook);
    }

    pub(crate) fn add_logger(&self, logger: Arc<dyn LogHook>) {
        self.loggers.write().push(logger);
    }

    pub(crate) fn callback_error(&self, error: &ActError) {
        let hook = self.callback_error.read().clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }

    pub(crate) fn fatal(&self, error: &ActError) {
        let hook = self.fatal.read().clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }

    pub(crate) fn emit(&self, record: &LogRecord) {
        let loggers = self.loggers.read().clone();
        trace!(kind = %record.kind, loggers = loggers.len(), "emitting log record");
        for logger in loggers {
            logger.log(record);
        }
    }
}

/// State shared by an instance and all of its delegates.
pub(crate) struct InstanceInner {
    pub(crate) origin: Origin,
    pub(crate) config: PatternConfig,
    pub(crate) root_delegate: Arc<Delegate>,
    pub(crate) router: RwLock<Router<Arc<ActionDef>>>,
    pub(crate) actions: DashMap<String, Arc<ActionDef>>,
    pub(crate) subscribers: RwLock<Router<Vec<Arc<ActionDef>>>>,
    pub(crate) plugins: DashMap<String, Arc<PluginInstance>>,
    pub(crate) catalog: DashMap<String, Arc<dyn Plugin>>,
    pub(crate) exports: DashMap<String, Value>,
    pub(crate) history: Mutex<History>,
    pub(crate) stats: Stats,
    pub(crate) hooks: Hooks,
    pub(crate) entity: RwLock<Option<Arc<dyn EntityNormalizer>>>,
    pub(crate) inward: RwLock<Arc<TaskPipeline<Instance, CallData>>>,
    pub(crate) outward: RwLock<Arc<TaskPipeline<Instance, CallData>>>,
    pub(crate) registration: TaskPipeline<Instance, Registration>,
    pub(crate) loader: TaskPipeline<Instance, PluginLoad>,
    pub(crate) plugin_gate: GateScope,
    pub(crate) shutdown: CancellationToken,
    pub(crate) fatal: Mutex<Option<ActError>>,
    state: AtomicU8,
}

impl InstanceInner {
    /// Builds the shared state. Must be called inside a Tokio runtime.
    pub(crate) fn new(config: PatternConfig) -> Result<Self, PipelineError> {
        let shutdown = CancellationToken::new();
        let origin = Origin {
            instance: idgen(config.ids.message_id_len),
            tag: config.instance.tag.clone(),
            version: config.instance.version.clone(),
            action_timeout_ms: config.timeouts.action_timeout_ms,
        };
        Ok(Self {
            origin,
            root_delegate: Delegate::root(),
            router: RwLock::new(Router::new()),
            actions: DashMap::new(),
            subscribers: RwLock::new(Router::new()),
            plugins: DashMap::new(),
            catalog: DashMap::new(),
            exports: DashMap::new(),
            history: Mutex::new(History::new(config.limits.history_capacity, config.history_ttl())),
            stats: Stats::new(config.limits.stats_window),
            hooks: Hooks::default(),
            entity: RwLock::new(None),
            inward: RwLock::new(Arc::new(inward::pipeline()?)),
            outward: RwLock::new(Arc::new(outward::pipeline()?)),
            registration: registration::pipeline()?,
            loader: lifecycle::pipeline()?,
            plugin_gate: GateScope::open(config.ids.delegate_id_len, shutdown.clone()),
            shutdown,
            fatal: Mutex::new(None),
            state: AtomicU8::new(OPEN),
            config,
        })
    }

    pub(crate) fn state(&self) -> InstanceState {
        match self.state.load(Ordering::Acquire) {
            OPEN => InstanceState::Open,
            CLOSING => InstanceState::Closing,
            _ => InstanceState::Closed,
        }
    }

    /// Moves from open to closing. Returns `false` if close already started.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.shutdown.cancel();
    }

    /// Resolves the action a message goes to: straight to `prior` when given,
    /// otherwise the most specific router match.
    pub(crate) fn find_action(&self, msg: &Msg, prior: Option<&str>) -> Option<Arc<ActionDef>> {
        match prior {
            Some(id) => self.actions.get(id).map(|def| Arc::clone(def.value())),
            None => self.router.read().find(msg).map(|entry| Arc::clone(entry.data())),
        }
    }
}
