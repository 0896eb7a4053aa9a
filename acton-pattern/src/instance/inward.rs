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

//! Inward pipeline: everything that happens between dispatch and the handler.
//!
//! Tasks run in this order:
//! `fields`, `custom`, `limit_parents`, `closed`, `history`, `not_found`, `stats`,
//! `validate`, `deprecate`, `meta`, `limit_parents_final`, `delegate`, `subscribers`,
//! `announce`. Extensions are placed relative to these names.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use acton_pattern_core::idgen::idgen;
use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::{panic_message, Flow, Operation, PipelineError, Task, TaskPipeline};
use serde_json::Value;
use tracing::{debug, warn};

use crate::common::ActResult;
use crate::instance::{
    ActionDef, ActionKind, ActiveCall, CallData, CallOperation, CallPatch, Delegate, DelegateSpec, GateBinding,
    GateScope, Instance, InstanceState, Phase,
};
use crate::message::{ActError, ErrorCode, LogKind, LogRecord};

/// Tasks kept when `prior` runs the reduced pipeline.
pub(crate) const DIRECT_PRIOR_TASKS: &[&str] = &["fields", "custom", "limit_parents", "meta", "limit_parents_final", "delegate"];

pub(crate) fn pipeline() -> Result<TaskPipeline<Instance, CallData>, PipelineError> {
    let mut pipeline = TaskPipeline::new("inward");
    pipeline
        .add(Task::sync("fields", fields))?
        .add(Task::sync("custom", custom))?
        .add(Task::sync("limit_parents", limit_parents))?
        .add(Task::sync("closed", closed))?
        .add(Task::sync("history", history))?
        .add(Task::sync("not_found", not_found))?
        .add(Task::sync("stats", |_, _| Ok(Operation::operator("count_call", Value::Null))))?
        .add(Task::sync("validate", validate))?
        .add(Task::sync("deprecate", deprecate))?
        .add(Task::sync("meta", meta))?
        .add(Task::sync("limit_parents_final", limit_parents))?
        .add(Task::sync("delegate", delegate))?
        .add(Task::sync("subscribers", subscribers))?
        .add(Task::sync("announce", announce))?;
    pipeline
        .operator("replay", |instance: &Instance, data: &mut CallData, _| {
            let Some(mi) = data.directives.id.as_deref() else {
                return Ok(Flow::Continue);
            };
            let Some(result) = instance.root.history.lock().get(mi) else {
                return Ok(Flow::Continue);
            };
            instance.root.stats.record_cache_hit();
            data.cached = true;
            debug!(id = %data.meta.id, "replaying reply from history");
            Ok(Flow::Stop(result))
        })
        .operator("count_call", |instance: &Instance, data: &mut CallData, _| {
            if let Some(def) = &data.def {
                instance.root.stats.record_call(&def.canonical());
            }
            Ok(Flow::Continue)
        });
    Ok(pipeline)
}

fn stop(error: ActError) -> anyhow::Result<CallOperation> {
    Ok(Operation::Stop(Err(error)))
}

fn fields(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    match &data.def {
        Some(def) if !def.fixed.is_empty() => Ok(Operation::merge(CallPatch {
            message: Some(def.fixed.clone()),
            ..CallPatch::default()
        })),
        _ => Ok(Operation::Continue),
    }
}

fn custom(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    match &data.def {
        Some(def) if !def.custom.is_empty() => Ok(Operation::preserve(CallPatch {
            custom: Some(def.custom.clone()),
            ..CallPatch::default()
        })),
        _ => Ok(Operation::Continue),
    }
}

fn limit_parents(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let max = instance.root.config.limits.max_parents;
    let depth = data.meta.parents.len();
    if depth > max {
        warn!(depth, max, id = %data.meta.id, "call chain too deep");
        return stop(
            ActError::new(ErrorCode::MaxParents, format!("call chain is {depth} deep, the limit is {max}"))
                .with("depth", depth)
                .with("max", max),
        );
    }
    Ok(Operation::Continue)
}

fn closed(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if instance.root.state() != InstanceState::Open && !data.meta.closing {
        return stop(ActError::new(ErrorCode::Closed, "instance is closed"));
    }
    Ok(Operation::Continue)
}

fn history(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if data.directives.id.is_some() {
        return Ok(Operation::operator("replay", Value::Null));
    }
    Ok(Operation::Continue)
}

fn not_found(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if data.def.is_some() {
        return Ok(Operation::Continue);
    }
    if let Some(default) = &data.directives.default {
        return match default {
            Value::Object(_) | Value::Array(_) | Value::Null => Ok(Operation::Stop(Ok(default.clone()))),
            other => stop(
                ActError::new(ErrorCode::ActDefaultBad, "default$ must be an object, an array or null")
                    .with("default", other.clone()),
            ),
        };
    }
    if instance.root.config.strict.find {
        let text = Value::Object(data.msg.clone()).to_string();
        return stop(ActError::new(ErrorCode::ActNotFound, format!("no action matches {text}")).with("msg", text));
    }
    Ok(Operation::Stop(Ok(Value::Null)))
}

fn validate(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let Some(validator) = data.def.as_ref().and_then(|def| def.validate.as_ref()) else {
        return Ok(Operation::Continue);
    };
    match validator.validate(data.msg.clone()) {
        Ok(message) => Ok(Operation::merge(CallPatch {
            message: Some(message),
            ..CallPatch::default()
        })),
        Err(reason) => stop(
            ActError::new(ErrorCode::ActInvalidMsg, reason)
                .with("pattern", data.def.as_ref().map(|d| d.canonical()).unwrap_or_default()),
        ),
    }
}

fn deprecate(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if let Some(def) = &data.def {
        if let Some(notice) = def.deprecation() {
            warn!(pattern = %def.canonical(), notice, "deprecated action called");
            let mut record = LogRecord::for_call(LogKind::Deprecated, &data.meta, notice);
            record.pattern = def.canonical();
            instance.root.hooks.emit(&record);
        }
    }
    Ok(Operation::Continue)
}

fn meta(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let Some(def) = &data.def else {
        return Ok(Operation::Continue);
    };
    Ok(Operation::merge(CallPatch {
        pattern: Some(def.canonical()),
        action: Some(def.id().to_string()),
        plugin: Some(def.plugin()),
        custom: Some(Msg::new()),
        ..CallPatch::default()
    }))
}

fn delegate(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let Some(def) = &data.def else {
        return Ok(Operation::Continue);
    };
    Ok(Operation::merge(CallPatch {
        delegate: Some(action_delegate(instance, data, def)),
        ..CallPatch::default()
    }))
}

/// The delegate a handler runs with: a child of the caller's delegate, carrying
/// the action's plugin identity and the call itself.
///
/// A gated call's handler gets a fresh gate scope of its own. Its nested calls run
/// in order among themselves, not behind the gated call that is waiting on them.
fn action_delegate(instance: &Instance, data: &CallData, def: &Arc<ActionDef>) -> Arc<Delegate> {
    let root = &instance.root;
    let gate = if data.meta.gate || data.scoped {
        GateBinding::Scope(GateScope::open(root.config.ids.delegate_id_len, root.shutdown.clone()))
    } else {
        GateBinding::Inherit
    };
    let spec = DelegateSpec {
        gate,
        plugin: Some(def.plugin()),
        shared: def.shared.clone(),
        active: Some(ActiveCall {
            def: Arc::clone(def),
            meta: Arc::new(data.meta.clone()),
            settled: Arc::new(AtomicBool::new(false)),
        }),
        ..DelegateSpec::default()
    };
    Delegate::child(&data.caller, idgen(root.config.ids.delegate_id_len), spec)
}

/// Runs every subscriber of `phase` matching `msg`; stops at the first failure.
pub(crate) fn notify(instance: &Instance, phase: Phase, msg: &Msg, result: Option<&ActResult>) -> Result<(), String> {
    let subscribers: Vec<Arc<ActionDef>> = instance
        .root
        .subscribers
        .read()
        .find_all(msg)
        .into_iter()
        .flat_map(|entry| entry.data().iter().cloned())
        .collect();
    for def in subscribers {
        let ActionKind::Subscriber(sub_phase, subscriber) = &def.kind else {
            continue;
        };
        if *sub_phase != phase {
            continue;
        }
        match catch_unwind(AssertUnwindSafe(|| subscriber(msg, result))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(format!("subscriber {} failed: {error:#}", def.canonical())),
            Err(panic) => {
                return Err(format!(
                    "subscriber {} panicked: {}",
                    def.canonical(),
                    panic_message(&*panic)
                ))
            }
        }
    }
    Ok(())
}

fn subscribers(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    match notify(instance, Phase::Inward, &data.msg, None) {
        Ok(()) => Ok(Operation::Continue),
        Err(reason) => stop(ActError::new(ErrorCode::SubInwardActionFailed, reason).with("pattern", data.meta.pattern.clone())),
    }
}

fn announce(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    debug!(pattern = %data.meta.pattern, id = %data.meta.id, plugin = %data.meta.plugin.fullname, "starting");
    instance
        .root
        .hooks
        .emit(&LogRecord::for_call(LogKind::Starting, &data.meta, "starting"));
    Ok(Operation::Continue)
}
