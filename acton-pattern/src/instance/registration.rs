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

//! Registration pipeline: turns `add`/`sub` arguments into a committed action.
//!
//! Tasks: `parse`, `plugin`, `rules`, `prior`, `build`, `commit`.

use std::sync::Arc;

use acton_pattern_core::idgen::idgen;
use acton_pattern_core::merge::MergeMode;
use acton_pattern_core::pattern::{parse_message, Msg, Pattern};
use acton_pattern_core::pipeline::{Flow, Operation, PipelineData, PipelineError, Task, TaskPipeline};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

use crate::instance::{ActionDef, ActionKind, AddOptions, Instance};
use crate::message::{ActError, ErrorCode, PatternSource, SharedMap};
use crate::plugin::PluginRef;
use crate::traits::{MessageValidator, Schema};

/// A registration in progress.
pub(crate) struct Registration {
    source: PatternSource,
    options: AddOptions,
    kind: ActionKind,
    pattern: Option<Pattern>,
    schema: Msg,
    plugin: PluginRef,
    shared: Option<SharedMap>,
    validate: Option<Arc<dyn MessageValidator>>,
    prior: Option<Arc<ActionDef>>,
    def: Option<Arc<ActionDef>>,
}

impl Registration {
    pub(crate) fn new(source: PatternSource, options: AddOptions, kind: ActionKind) -> Self {
        Self {
            source,
            options,
            kind,
            pattern: None,
            schema: Msg::new(),
            plugin: PluginRef::root(),
            shared: None,
            validate: None,
            prior: None,
            def: None,
        }
    }

    pub(crate) fn into_def(self) -> Option<Arc<ActionDef>> {
        self.def
    }
}

pub(crate) enum RegistrationPatch {
    Parsed(Pattern, Msg),
    Plugin(PluginRef, Option<SharedMap>),
    Rules(Arc<dyn MessageValidator>),
    Prior(Arc<ActionDef>),
    Built(Arc<ActionDef>),
}

fn set<T>(slot: &mut Option<T>, value: T, mode: MergeMode) {
    if mode == MergeMode::Overwrite || slot.is_none() {
        *slot = Some(value);
    }
}

impl PipelineData for Registration {
    type Patch = RegistrationPatch;
    type Output = ActError;

    fn merge(&mut self, patch: RegistrationPatch, mode: MergeMode) {
        match patch {
            RegistrationPatch::Parsed(pattern, schema) => {
                set(&mut self.pattern, pattern, mode);
                self.schema = schema;
            }
            RegistrationPatch::Plugin(plugin, shared) => {
                self.plugin = plugin;
                self.shared = shared;
            }
            RegistrationPatch::Rules(validator) => set(&mut self.validate, validator, mode),
            RegistrationPatch::Prior(def) => set(&mut self.prior, def, mode),
            RegistrationPatch::Built(def) => set(&mut self.def, def, mode),
        }
    }
}

type RegistrationOperation = Operation<Registration>;

pub(crate) fn pipeline() -> Result<TaskPipeline<Instance, Registration>, PipelineError> {
    let mut pipeline = TaskPipeline::new("registration");
    pipeline
        .add(Task::sync("parse", parse))?
        .add(Task::sync("plugin", plugin))?
        .add(Task::sync("rules", rules))?
        .add(Task::sync("prior", prior))?
        .add(Task::sync("build", build))?
        .add(Task::sync("commit", |_, _| Ok(Operation::operator("register", Value::Null))))?;
    pipeline.operator("register", |instance: &Instance, data: &mut Registration, _| {
        if let Some(def) = &data.def {
            commit(instance, def, data.prior.as_ref());
        }
        Ok(Flow::Continue)
    });
    Ok(pipeline)
}

fn invalid(error: impl std::fmt::Display) -> anyhow::Result<RegistrationOperation> {
    Ok(Operation::Stop(ActError::new(ErrorCode::InvalidPattern, error.to_string())))
}

fn parse(_: &Instance, data: &Registration) -> anyhow::Result<RegistrationOperation> {
    let parts = match &data.source {
        PatternSource::Text(text) if text.trim_start().starts_with('{') => match parse_message(text) {
            Ok(map) => Pattern::split_map(&map),
            Err(error) => return invalid(error),
        },
        PatternSource::Text(text) => match Pattern::parse(text) {
            Ok(pattern) => Pattern::split_map(&pattern.to_msg()),
            Err(error) => return invalid(error),
        },
        PatternSource::Map(map) => Pattern::split_map(map),
        PatternSource::Parsed(pattern) => Pattern::split_map(&pattern.to_msg()),
    };
    Ok(Operation::merge(RegistrationPatch::Parsed(parts.pattern, parts.schema)))
}

fn plugin(instance: &Instance, _: &Registration) -> anyhow::Result<RegistrationOperation> {
    Ok(Operation::merge(RegistrationPatch::Plugin(
        instance.delegate.plugin(),
        instance.delegate.shared(),
    )))
}

fn rules(_: &Instance, data: &Registration) -> anyhow::Result<RegistrationOperation> {
    let schema = if data.schema.is_empty() {
        None
    } else {
        match Schema::from_map(&data.schema) {
            Ok(schema) => Some(schema),
            Err(reason) => return invalid(reason),
        }
    };
    let validator: Arc<dyn MessageValidator> = match (schema, data.options.validate.clone()) {
        (None, None) => return Ok(Operation::Continue),
        (Some(schema), None) => Arc::new(schema),
        (None, Some(custom)) => custom,
        (Some(schema), Some(custom)) => {
            Arc::new(move |msg: Msg| schema.validate(msg).and_then(|msg| custom.validate(msg)))
        }
    };
    Ok(Operation::merge(RegistrationPatch::Rules(validator)))
}

fn prior(instance: &Instance, data: &Registration) -> anyhow::Result<RegistrationOperation> {
    let Some(pattern) = &data.pattern else {
        return Ok(Operation::Continue);
    };
    if matches!(data.kind, ActionKind::Subscriber(..)) {
        return Ok(Operation::Continue);
    }
    let router = instance.root.router.read();
    let found = if instance.root.config.strict.add {
        router.find_exact(pattern)
    } else {
        router.find(&pattern.to_msg())
    };
    Ok(match found {
        Some(entry) => Operation::merge(RegistrationPatch::Prior(Arc::clone(entry.data()))),
        None => Operation::Continue,
    })
}

fn build(instance: &Instance, data: &Registration) -> anyhow::Result<RegistrationOperation> {
    let Some(pattern) = data.pattern.clone() else {
        return invalid("pattern was not parsed");
    };
    let def = ActionDef {
        id: idgen(instance.root.config.ids.message_id_len),
        pattern,
        kind: data.kind.clone(),
        plugin: RwLock::new(data.plugin.clone()),
        prior: data.prior.as_ref().map(|p| p.id().to_string()),
        validate: data.validate.clone(),
        fixed: data.options.fixed.clone(),
        deprecate: data.options.deprecate.clone(),
        custom: data.options.custom.clone(),
        handle: data.options.handle.clone(),
        shared: data.shared.clone(),
    };
    Ok(Operation::merge(RegistrationPatch::Built(Arc::new(def))))
}

fn commit(instance: &Instance, def: &Arc<ActionDef>, prior: Option<&Arc<ActionDef>>) {
    let root = &instance.root;
    root.actions.insert(def.id().to_string(), Arc::clone(def));
    if def.is_subscription() {
        let mut subscribers = root.subscribers.write();
        let mut existing = subscribers
            .find_exact(def.pattern())
            .map(|entry| entry.data().clone())
            .unwrap_or_default();
        existing.push(Arc::clone(def));
        subscribers.add(def.pattern().clone(), existing);
        trace!(pattern = %def.canonical(), "subscriber added");
        return;
    }
    if let Some(hook) = prior.and_then(|p| p.handle.clone()) {
        debug!(pattern = %def.canonical(), "registration handed to the prior definition");
        hook(Arc::clone(def));
        return;
    }
    let replaced = root.router.write().add(def.pattern().clone(), Arc::clone(def));
    debug!(
        pattern = %def.canonical(),
        id = %def.id(),
        plugin = %def.plugin().fullname,
        overrides = replaced.is_some(),
        "action added"
    );
}
