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

//! Values a plugin hands back to the lifecycle pipeline.

use std::fmt;
use std::sync::Arc;

use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::Placement;
use serde_json::Value;

use crate::common::{CallTask, PatternConfig};
use crate::message::SharedMap;
use crate::traits::LogHook;

/// Pipeline tasks and a logger contributed by a plugin.
#[derive(Clone, Default)]
pub struct Extension {
    pub(crate) inward: Vec<(Placement, CallTask)>,
    pub(crate) outward: Vec<(Placement, CallTask)>,
    pub(crate) logger: Option<Arc<dyn LogHook>>,
}

impl Extension {
    /// An empty extension.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the inward pipeline.
    #[must_use]
    pub fn inward(mut self, placement: Placement, task: CallTask) -> Self {
        self.inward.push((placement, task));
        self
    }

    /// Adds a task to the outward pipeline.
    #[must_use]
    pub fn outward(mut self, placement: Placement, task: CallTask) -> Self {
        self.outward.push((placement, task));
        self
    }

    /// Installs a custom logger.
    #[must_use]
    pub fn logger(mut self, hook: Arc<dyn LogHook>) -> Self {
        self.logger = Some(hook);
        self
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("inward", &self.inward)
            .field("outward", &self.outward)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// What a plugin's define step may return.
#[derive(Debug, Clone, Default)]
pub struct PluginDefinition {
    pub(crate) name: Option<String>,
    pub(crate) tag: Option<String>,
    pub(crate) export: Option<Value>,
    pub(crate) exportmap: Msg,
    pub(crate) extend: Option<Extension>,
    pub(crate) options: Option<Msg>,
}

impl PluginDefinition {
    /// An empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the plugin.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Retags the plugin.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Exports a value under the plugin's name.
    #[must_use]
    pub fn export(mut self, value: Value) -> Self {
        self.export = Some(value);
        self
    }

    /// Exports a value under `name/key`.
    #[must_use]
    pub fn export_key(mut self, key: impl Into<String>, value: Value) -> Self {
        self.exportmap.insert(key.into(), value);
        self
    }

    /// Contributes pipeline tasks or a logger.
    #[must_use]
    pub fn extend(mut self, extension: Extension) -> Self {
        self.extend = Some(extension);
        self
    }

    /// Replaces option fields on the registered plugin.
    #[must_use]
    pub fn options(mut self, options: Msg) -> Self {
        self.options = Some(options);
        self
    }
}

/// What a plugin sees in its preload step.
#[derive(Debug, Clone)]
pub struct PreloadContext {
    /// Plugin name.
    pub name: String,
    /// Plugin tag, if any.
    pub tag: Option<String>,
    /// `name` or `name$tag`.
    pub fullname: String,
    /// Options passed to `use`.
    pub options: Value,
}

/// What a plugin's preload step may return.
#[derive(Debug, Clone, Default)]
pub struct Preload {
    pub(crate) name: Option<String>,
    pub(crate) export: Option<Value>,
    pub(crate) exportmap: Msg,
    pub(crate) extend: Option<Extension>,
}

impl Preload {
    /// An empty preload result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames the plugin before anything is registered.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Exports a value under the plugin's name.
    #[must_use]
    pub fn export(mut self, value: Value) -> Self {
        self.export = Some(value);
        self
    }

    /// Exports a value under `name/key`.
    #[must_use]
    pub fn export_key(mut self, key: impl Into<String>, value: Value) -> Self {
        self.exportmap.insert(key.into(), value);
        self
    }

    /// Contributes pipeline tasks or a logger before define runs.
    #[must_use]
    pub fn extend(mut self, extension: Extension) -> Self {
        self.extend = Some(extension);
        self
    }
}

/// Inputs available to a computed set of plugin defaults.
#[derive(Debug)]
pub struct DefaultsHelpers<'a> {
    pub(crate) name: &'a str,
    pub(crate) tag: Option<&'a str>,
    pub(crate) config: &'a PatternConfig,
}

impl DefaultsHelpers<'_> {
    /// Plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Plugin tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag
    }

    /// The instance configuration.
    #[must_use]
    pub fn config(&self) -> &PatternConfig {
        self.config
    }
}

/// Declared plugin defaults; they are also the shape options are checked against.
#[derive(Debug, Clone)]
pub enum PluginDefaults {
    /// A literal set of defaults.
    Literal(Msg),
    /// Defaults computed when the plugin loads.
    Builder(fn(&DefaultsHelpers<'_>) -> Msg),
}

impl Default for PluginDefaults {
    fn default() -> Self {
        Self::Literal(Msg::new())
    }
}

impl PluginDefaults {
    pub(crate) fn resolve(&self, helpers: &DefaultsHelpers<'_>) -> Msg {
        match self {
            Self::Literal(map) => map.clone(),
            Self::Builder(build) => build(helpers),
        }
    }
}

/// A loaded plugin, registered by fullname for the instance's lifetime.
#[derive(Debug, Clone)]
pub struct PluginInstance {
    /// Final plugin name.
    pub name: String,
    /// Final tag, `-` when untagged.
    pub tag: String,
    /// `name` or `name$tag`.
    pub fullname: String,
    /// Name with naming prefixes removed.
    pub shortname: String,
    /// Fully resolved options.
    pub options: Value,
    /// State shared by every action the plugin registered.
    pub shared: SharedMap,
    /// Values the plugin exported, keyed as stored on the instance.
    pub exports: Msg,
}
