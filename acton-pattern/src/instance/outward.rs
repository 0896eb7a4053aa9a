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

//! Outward pipeline: post-processing of every reply, matched or not.
//!
//! Tasks: `normalize`, `stats`, `history`, `result_policy`, `entity`, `explain`,
//! `trace`, `subscribers`, `announce`.

use serde_json::{json, Value};
use tracing::{debug, trace};

use acton_pattern_core::pipeline::{Flow, Operation, PipelineError, Task, TaskPipeline};

use crate::instance::{inward, CallData, CallOperation, CallPatch, Instance, Phase};
use crate::message::{now_ms, ActError, ErrorCode, LogKind, LogRecord};
use crate::traits::is_entity;

pub(crate) fn pipeline() -> Result<TaskPipeline<Instance, CallData>, PipelineError> {
    let mut pipeline = TaskPipeline::new("outward");
    pipeline
        .add(Task::sync("normalize", normalize))?
        .add(Task::sync("stats", |_, _| Ok(Operation::operator("count_completion", Value::Null))))?
        .add(Task::sync("history", |_, _| Ok(Operation::operator("remember", Value::Null))))?
        .add(Task::sync("result_policy", result_policy))?
        .add(Task::sync("entity", entity))?
        .add(Task::sync("explain", explain))?
        .add(Task::sync("trace", trace_parent))?
        .add(Task::sync("subscribers", subscribers))?
        .add(Task::sync("announce", announce))?;
    pipeline
        .operator("count_completion", |instance: &Instance, data: &mut CallData, _| {
            if !data.cached {
                let ok = matches!(data.result, Some(Ok(_)));
                let pattern = data.def.as_ref().map(|def| def.canonical());
                instance
                    .root
                    .stats
                    .record_completion(pattern.as_deref(), ok, data.meta.elapsed_ms());
            }
            Ok(Flow::Continue)
        })
        .operator("remember", |instance: &Instance, data: &mut CallData, _| {
            if let (false, Some(result)) = (data.cached, &data.result) {
                instance.root.history.lock().record(data.meta.mi.clone(), result.clone());
            }
            Ok(Flow::Continue)
        });
    Ok(pipeline)
}

fn normalize(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    Ok(Operation::merge(CallPatch {
        error: Some(matches!(data.result, Some(Err(_)))),
        end: Some(now_ms()),
        ..CallPatch::default()
    }))
}

fn replace_result(result: Result<Value, ActError>) -> anyhow::Result<CallOperation> {
    Ok(Operation::merge(CallPatch {
        error: Some(result.is_err()),
        result: Some(result),
        ..CallPatch::default()
    }))
}

fn result_policy(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if !instance.root.config.strict.result || data.def.is_none() {
        return Ok(Operation::Continue);
    }
    match &data.result {
        Some(Ok(Value::Object(_) | Value::Array(_) | Value::Null)) | Some(Err(_)) | None => Ok(Operation::Continue),
        Some(Ok(other)) => replace_result(Err(ActError::new(
            ErrorCode::ResultNotObjarr,
            format!("action {} replied with a scalar", data.meta.pattern),
        )
        .with("result", other.clone()))),
    }
}

fn entity(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let Some(Ok(result)) = &data.result else {
        return Ok(Operation::Continue);
    };
    if !is_entity(result) {
        return Ok(Operation::Continue);
    }
    let normalizer = instance.root.entity.read().clone();
    match normalizer {
        Some(normalizer) => replace_result(Ok(normalizer.normalize(result.clone()))),
        None => Ok(Operation::Continue),
    }
}

fn explain(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if let Some(log) = &data.meta.explain {
        let outcome = match &data.result {
            Some(Ok(value)) => json!({"ok": true, "result": value}),
            Some(Err(error)) => json!({"ok": false, "error": error.to_value()}),
            None => json!({"ok": true, "result": null}),
        };
        log.push(json!({
            "pattern": data.meta.pattern,
            "id": data.meta.id,
            "depth": data.meta.depth(),
            "cached": data.cached,
            "ms": data.meta.elapsed_ms(),
            "outcome": outcome,
        }));
    }
    Ok(Operation::Continue)
}

fn trace_parent(_: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    if let Some(parent) = data.caller.active() {
        trace!(parent = %parent.meta.id, id = %data.meta.id, "recording child call");
        parent.meta.trace.push(data.meta.descriptor());
    }
    Ok(Operation::Continue)
}

fn subscribers(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let Some(result) = &data.result else {
        return Ok(Operation::Continue);
    };
    match inward::notify(instance, Phase::Outward, &data.msg, Some(result)) {
        Ok(()) => Ok(Operation::Continue),
        Err(reason) => replace_result(Err(ActError::new(ErrorCode::SubOutwardActionFailed, reason)
            .with("pattern", data.meta.pattern.clone()))),
    }
}

fn announce(instance: &Instance, data: &CallData) -> anyhow::Result<CallOperation> {
    let record = match &data.result {
        Some(Err(error)) => {
            debug!(pattern = %data.meta.pattern, id = %data.meta.id, %error, "failed");
            LogRecord::for_call(LogKind::Error, &data.meta, "failed").with_error(error.clone())
        }
        _ => {
            debug!(pattern = %data.meta.pattern, id = %data.meta.id, ms = data.meta.elapsed_ms(), "finished");
            LogRecord::for_call(LogKind::Finished, &data.meta, "finished")
        }
    };
    instance.root.hooks.emit(&record);
    Ok(Operation::Continue)
}
