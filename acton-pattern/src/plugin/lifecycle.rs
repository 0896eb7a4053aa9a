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

//! Plugin loading.
//!
//! Every load runs as one job on the instance's plugin gate, so plugins finish
//! loading one at a time in the order `use_plugin` was called, and a plugin used
//! from inside another plugin's define step loads after it. The loader pipeline
//! runs `args`, `load`, `normalize`, `preload`, `exports`, `extend`, `delegate`,
//! `define_action`, `define`, `identity`, `exports_def`, `extend_def`, `register`,
//! `init` and `loaded`; any stop is fatal to the instance.

use std::sync::Arc;

use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::{Flow, Operation, Outcome, PipelineData, PipelineError, Task, TaskFuture, TaskPipeline};
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::instance::{define_message, task_failure, DelegateSpec, Instance};
use crate::message::{ActError, ErrorCode, LogKind, LogRecord, SharedMap};
use crate::plugin::{
    shortname, split_fullname, DefaultsHelpers, Extension, PluginDefinition, PluginInstance, PluginRef,
    PluginSource, Preload, PreloadContext,
};
use crate::traits::Plugin;

/// Option that skips the plugin's `init:<name>` action when `false`.
pub const INIT_OPTION: &str = "init$";

/// A plugin load in progress.
pub(crate) struct PluginLoad {
    source: PluginSource,
    args: Value,
    plugin: Option<Arc<dyn Plugin>>,
    identity: PluginRef,
    shortname: String,
    preload: Option<Preload>,
    exports: Msg,
    shared: SharedMap,
    delegate: Option<Instance>,
    options: Value,
    definition: Option<PluginDefinition>,
}

impl PluginLoad {
    fn new(source: PluginSource, args: Value) -> Self {
        Self {
            source,
            args,
            plugin: None,
            identity: PluginRef::root(),
            shortname: String::new(),
            preload: None,
            exports: Msg::new(),
            shared: SharedMap::default(),
            delegate: None,
            options: Value::Object(Msg::new()),
            definition: None,
        }
    }
}

pub(crate) enum LoadPatch {
    Resolved(Arc<dyn Plugin>, PluginRef),
    Shortname(String),
    Preloaded(Preload, PluginRef),
    Exports(Msg),
    Delegate(Instance),
    Options(Value),
    Defined(Option<PluginDefinition>, Instance),
    Renamed(PluginRef, String),
}

impl PipelineData for PluginLoad {
    type Patch = LoadPatch;
    type Output = ActError;

    fn merge(&mut self, patch: LoadPatch, mode: MergeMode) {
        match patch {
            LoadPatch::Resolved(plugin, identity) => {
                self.plugin = Some(plugin);
                self.identity = identity;
            }
            LoadPatch::Shortname(name) => self.shortname = name,
            LoadPatch::Preloaded(preload, identity) => {
                self.preload = Some(preload);
                self.identity = identity;
            }
            LoadPatch::Exports(exports) => merge_map(&mut self.exports, exports, mode),
            LoadPatch::Delegate(delegate) => self.delegate = Some(delegate),
            LoadPatch::Options(options) => match (&mut self.options, options) {
                (Value::Object(current), Value::Object(incoming)) => merge_map(current, incoming, mode),
                (current, incoming) => *current = incoming,
            },
            LoadPatch::Defined(definition, delegate) => {
                if let (Some(extra), Value::Object(current)) =
                    (definition.as_ref().and_then(|d| d.options.clone()), &mut self.options)
                {
                    merge_map(current, extra, MergeMode::Overwrite);
                }
                self.definition = definition;
                self.delegate = Some(delegate);
            }
            LoadPatch::Renamed(identity, short) => {
                self.identity = identity;
                self.shortname = short;
            }
        }
    }
}

type LoadOperation = Operation<PluginLoad>;

pub(crate) fn pipeline() -> Result<TaskPipeline<Instance, PluginLoad>, PipelineError> {
    let mut pipeline = TaskPipeline::new("plugin");
    pipeline
        .add(Task::sync("args", args))?
        .add(Task::sync("load", load))?
        .add(Task::sync("normalize", normalize))?
        .add(Task::sync("preload", preload))?
        .add(Task::sync("exports", |_, data: &PluginLoad| {
            Ok(collect_exports(data, data.preload.as_ref().map(|p| (&p.export, &p.exportmap))))
        }))?
        .add(Task::sync("extend", |instance, data: &PluginLoad| {
            apply_extension(instance, data, data.preload.as_ref().and_then(|p| p.extend.clone()))
        }))?
        .add(Task::sync("delegate", delegate))?
        .add(Task::new("define_action", define_action))?
        .add(Task::new("define", define))?
        .add(Task::sync("identity", identity))?
        .add(Task::sync("exports_def", |_, data: &PluginLoad| {
            Ok(collect_exports(data, data.definition.as_ref().map(|d| (&d.export, &d.exportmap))))
        }))?
        .add(Task::sync("extend_def", |instance, data: &PluginLoad| {
            apply_extension(instance, data, data.definition.as_ref().and_then(|d| d.extend.clone()))
        }))?
        .add(Task::sync("register", |_, _| Ok(Operation::operator("register_plugin", Value::Null))))?
        .add(Task::new("init", init))?
        .add(Task::sync("loaded", loaded))?;
    pipeline.operator("register_plugin", |instance: &Instance, data: &mut PluginLoad, _| {
        let loaded = PluginInstance {
            name: data.identity.name.clone(),
            tag: data.identity.tag.clone(),
            fullname: data.identity.fullname.clone(),
            shortname: data.shortname.clone(),
            options: data.options.clone(),
            shared: data.shared.clone(),
            exports: data.exports.clone(),
        };
        for (key, value) in &data.exports {
            instance.root.exports.insert(key.clone(), value.clone());
        }
        if instance
            .root
            .plugins
            .insert(loaded.fullname.clone(), Arc::new(loaded))
            .is_some()
        {
            warn!(plugin = %data.identity.fullname, "plugin loaded more than once, keeping the latest");
        }
        Ok(Flow::Continue)
    });
    Ok(pipeline)
}

fn failed(data: &PluginLoad, message: impl Into<String>) -> anyhow::Result<LoadOperation> {
    let fullname = if data.identity == PluginRef::root() {
        format!("{:?}", data.source)
    } else {
        data.identity.fullname.clone()
    };
    Ok(Operation::Stop(
        ActError::new(ErrorCode::PluginFailed, message).with("plugin", fullname),
    ))
}

fn args(_: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    if data.args.is_object() || data.args.is_null() {
        return Ok(Operation::Continue);
    }
    failed(data, format!("plugin options must be an object, got {}", data.args))
}

fn load(instance: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    let (plugin, tag) = match &data.source {
        PluginSource::Plugin(plugin) => (Arc::clone(plugin), None),
        PluginSource::Named(fullname) => {
            let (name, tag) = split_fullname(fullname);
            let Some(plugin) = instance.root.catalog.get(name).map(|p| Arc::clone(p.value())) else {
                return failed(data, format!("no plugin named {name} is registered"));
            };
            (plugin, tag.map(str::to_string))
        }
    };
    if plugin.name().is_empty() {
        return failed(data, "plugin has no name");
    }
    let identity = PluginRef::new(plugin.name(), tag.as_deref().or_else(|| plugin.tag()));
    Ok(Operation::merge(LoadPatch::Resolved(plugin, identity)))
}

fn normalize(instance: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    let short = shortname(&data.identity.name, &instance.root.config.plugin.prefixes);
    Ok(Operation::merge(LoadPatch::Shortname(short)))
}

fn preload(_: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    let Some(plugin) = &data.plugin else {
        return Ok(Operation::Continue);
    };
    let ctx = PreloadContext {
        name: data.identity.name.clone(),
        tag: data.identity.tag().map(str::to_string),
        fullname: data.identity.fullname.clone(),
        options: data.args.clone(),
    };
    let Some(preloaded) = plugin.preload(&ctx) else {
        return Ok(Operation::Continue);
    };
    let identity = match &preloaded.name {
        Some(name) => {
            debug!(from = %data.identity.name, to = %name, "plugin renamed by preload");
            PluginRef::new(name.clone(), data.identity.tag())
        }
        None => data.identity.clone(),
    };
    Ok(Operation::merge(LoadPatch::Preloaded(preloaded, identity)))
}

fn collect_exports(data: &PluginLoad, source: Option<(&Option<Value>, &Msg)>) -> LoadOperation {
    let Some((export, exportmap)) = source else {
        return Operation::Continue;
    };
    let mut exports = Msg::new();
    if let Some(value) = export {
        exports.insert(data.identity.name.clone(), value.clone());
        exports.insert(data.identity.fullname.clone(), value.clone());
    }
    for (key, value) in exportmap {
        exports.insert(format!("{}/{key}", data.identity.name), value.clone());
    }
    if exports.is_empty() {
        return Operation::Continue;
    }
    Operation::merge(LoadPatch::Exports(exports))
}

fn apply_extension(instance: &Instance, data: &PluginLoad, extension: Option<Extension>) -> anyhow::Result<LoadOperation> {
    let Some(extension) = extension else {
        return Ok(Operation::Continue);
    };
    match instance.extend(extension) {
        Ok(_) => {
            debug!(plugin = %data.identity.fullname, "pipelines extended");
            Ok(Operation::Continue)
        }
        Err(error) => failed(data, error.message().to_string()),
    }
}

fn delegate(instance: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    let delegate = instance.with_delegate(DelegateSpec {
        plugin: Some(data.identity.clone()),
        shared: Some(data.shared.clone()),
        ..DelegateSpec::default()
    });
    Ok(Operation::merge(LoadPatch::Delegate(delegate)))
}

fn define_action(instance: &Instance, data: &PluginLoad) -> TaskFuture<PluginLoad> {
    let (Some(plugin), Some(delegate)) = (&data.plugin, data.delegate.clone()) else {
        let stop = failed(data, "plugin was not resolved");
        return async move { stop }.boxed();
    };
    let helpers = DefaultsHelpers {
        name: &data.identity.name,
        tag: data.identity.tag(),
        config: &instance.root.config,
    };
    let defaults = plugin.defaults().resolve(&helpers);
    let mut msg = define_message();
    msg.insert("name".into(), json!(data.identity.name));
    msg.insert("tag".into(), json!(data.identity.tag));
    msg.insert("fullname".into(), json!(data.identity.fullname));
    msg.insert("shortname".into(), json!(data.shortname));
    msg.insert("options".into(), data.args.clone());
    msg.insert("defaults".into(), Value::Object(defaults));
    let fullname = data.identity.fullname.clone();
    async move {
        match delegate.act(msg).await {
            Ok(options @ Value::Object(_)) => Ok(Operation::merge(LoadPatch::Options(options))),
            Ok(other) => Ok(Operation::Stop(
                ActError::new(ErrorCode::PluginFailed, format!("resolved options must be an object, got {other}"))
                    .with("plugin", fullname),
            )),
            Err(error) => Ok(Operation::Stop(
                ActError::new(ErrorCode::PluginFailed, format!("options of {fullname} rejected: {}", error.message()))
                    .with("plugin", fullname)
                    .with("cause", error.to_value()),
            )),
        }
    }
    .boxed()
}

fn define(_: &Instance, data: &PluginLoad) -> TaskFuture<PluginLoad> {
    let (Some(plugin), Some(delegate)) = (data.plugin.clone(), &data.delegate) else {
        let stop = failed(data, "plugin was not resolved");
        return async move { stop }.boxed();
    };
    let options = data.options.clone();
    let handle = delegate.with_delegate(DelegateSpec {
        options: Some(Arc::new(options.clone())),
        ..DelegateSpec::default()
    });
    let fullname = data.identity.fullname.clone();
    async move {
        debug!(plugin = %fullname, "defining plugin");
        match plugin.define(&handle, options).await {
            Ok(definition) => Ok(Operation::merge(LoadPatch::Defined(definition, handle))),
            Err(error) => Ok(Operation::Stop(
                ActError::new(ErrorCode::PluginFailed, format!("plugin {fullname} failed to define: {error:#}"))
                    .with("plugin", fullname),
            )),
        }
    }
    .boxed()
}

fn identity(instance: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    let Some(definition) = data.definition.as_ref().filter(|d| d.name.is_some() || d.tag.is_some()) else {
        return Ok(Operation::Continue);
    };
    let name = definition.name.clone().unwrap_or_else(|| data.identity.name.clone());
    let tag = definition.tag.as_deref().or_else(|| data.identity.tag());
    let renamed = PluginRef::new(name, tag);
    if renamed != data.identity {
        debug!(from = %data.identity.fullname, to = %renamed.fullname, "plugin renamed by define");
        for def in instance.root.actions.iter() {
            if def.plugin().fullname == data.identity.fullname {
                def.annotate(renamed.clone());
            }
        }
    }
    let short = shortname(&renamed.name, &instance.root.config.plugin.prefixes);
    Ok(Operation::merge(LoadPatch::Renamed(renamed, short)))
}

fn init(instance: &Instance, data: &PluginLoad) -> TaskFuture<PluginLoad> {
    if data.options.get(INIT_OPTION) == Some(&Value::Bool(false)) {
        return async { Ok(Operation::Continue) }.boxed();
    }
    let mut msg = Msg::new();
    msg.insert("init".into(), json!(data.identity.name));
    if let Some(tag) = data.identity.tag() {
        msg.insert("tag".into(), json!(tag));
    }
    let declared = instance
        .root
        .find_action(&msg, None)
        .is_some_and(|def| def.pattern().get("init") == Some(data.identity.name.as_str()));
    let Some(handle) = data.delegate.clone().filter(|_| declared) else {
        return async { Ok(Operation::Continue) }.boxed();
    };
    let fullname = data.identity.fullname.clone();
    async move {
        debug!(plugin = %fullname, "running plugin init");
        match handle.act(msg).await {
            Ok(_) => Ok(Operation::Continue),
            Err(error) => Ok(Operation::Stop(
                ActError::new(ErrorCode::PluginFailed, format!("init of {fullname} failed: {}", error.message()))
                    .with("plugin", fullname)
                    .with("cause", error.to_value()),
            )),
        }
    }
    .boxed()
}

fn loaded(instance: &Instance, data: &PluginLoad) -> anyhow::Result<LoadOperation> {
    info!(plugin = %data.identity.fullname, "plugin loaded");
    let mut record = LogRecord::new(LogKind::Plugin, "plugin loaded");
    record.plugin = data.identity.fullname.clone();
    instance.root.hooks.emit(&record);
    Ok(Operation::Continue)
}

impl Instance {
    /// Queues a plugin for loading.
    ///
    /// Plugins load one at a time in the order they were queued; await
    /// [`ready`](Self::ready) to wait for them. A failing plugin is fatal to the
    /// instance.
    pub fn use_plugin(&self, source: impl Into<PluginSource>, options: Value) -> &Self {
        let instance = self.clone();
        let source = source.into();
        debug!(?source, "plugin queued");
        self.root.plugin_gate.enqueue(
            async move {
                if let Err(error) = instance.load_plugin(source, options).await {
                    instance.die(error).await;
                }
            }
            .boxed(),
        );
        self
    }

    #[instrument(skip(self, options))]
    async fn load_plugin(&self, source: PluginSource, options: Value) -> Result<Arc<PluginInstance>, ActError> {
        match self.root.loader.exec(self, PluginLoad::new(source, options)).await {
            Outcome::Done(data) => self
                .root
                .plugins
                .get(&data.identity.fullname)
                .map(|p| Arc::clone(p.value()))
                .ok_or_else(|| ActError::new(ErrorCode::PluginFailed, "plugin vanished after loading")),
            Outcome::Stopped { output, .. } => Err(output),
            Outcome::Failed { task, error, .. } => Err(task_failure("plugin", &task, &error)),
        }
    }

    /// Makes `plugin` loadable by name through [`use_plugin`](Self::use_plugin).
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> &Self {
        self.root.catalog.insert(plugin.name().to_string(), plugin);
        self
    }

    /// A loaded plugin, by fullname.
    #[must_use]
    pub fn plugin(&self, fullname: &str) -> Option<Arc<PluginInstance>> {
        self.root.plugins.get(fullname).map(|p| Arc::clone(p.value()))
    }

    /// Every loaded plugin, sorted by fullname.
    #[must_use]
    pub fn plugins(&self) -> Vec<Arc<PluginInstance>> {
        let mut plugins: Vec<_> = self.root.plugins.iter().map(|p| Arc::clone(p.value())).collect();
        plugins.sort_by(|a, b| a.fullname.cmp(&b.fullname));
        plugins
    }

    /// A value exported by a plugin: its name or fullname for the main export,
    /// `name/key` for named exports.
    #[must_use]
    pub fn export(&self, key: &str) -> Option<Value> {
        self.root.exports.get(key).map(|v| v.value().clone())
    }
}
