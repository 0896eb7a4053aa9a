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
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::instance::Instance;
use crate::plugin::{PluginDefaults, PluginDefinition, Preload, PreloadContext};
use crate::traits::Plugin;

type DefineFn = dyn Fn(Instance, Value) -> BoxFuture<'static, anyhow::Result<Option<PluginDefinition>>>
    + Send
    + Sync
    + 'static;

type PreloadFn = dyn Fn(&PreloadContext) -> Option<Preload> + Send + Sync + 'static;

/// A plugin assembled from closures.
///
/// ```rust,ignore
/// let counter = PluginDescriptor::new("counter", |instance, _options| async move {
///     instance.add("role:counter,cmd:inc", |ctx| ActionReply::ok(ctx, json!({"n": 1}))).await?;
///     Ok(None)
/// });
/// instance.use_plugin(counter, json!({}));
/// ```
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    tag: Option<String>,
    defaults: PluginDefaults,
    preload: Option<Arc<PreloadFn>>,
    define: Arc<DefineFn>,
}

impl PluginDescriptor {
    /// A plugin named `name` whose define step is `define`.
    pub fn new<F, Fut>(name: impl Into<String>, define: F) -> Self
    where
        F: Fn(Instance, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<PluginDefinition>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            tag: None,
            defaults: PluginDefaults::default(),
            preload: None,
            define: Arc::new(move |instance, options| define(instance, options).boxed()),
        }
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the declared defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: PluginDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the preload step.
    #[must_use]
    pub fn with_preload<F>(mut self, preload: F) -> Self
    where
        F: Fn(&PreloadContext) -> Option<Preload> + Send + Sync + 'static,
    {
        self.preload = Some(Arc::new(preload));
        self
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Plugin for PluginDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn defaults(&self) -> PluginDefaults {
        self.defaults.clone()
    }

    fn preload(&self, ctx: &PreloadContext) -> Option<Preload> {
        self.preload.as_ref().and_then(|preload| preload(ctx))
    }

    async fn define(&self, instance: &Instance, options: Value) -> anyhow::Result<Option<PluginDefinition>> {
        (self.define)(instance.clone(), options).await
    }
}

/// What [`Instance::use_plugin`](crate::prelude::Instance::use_plugin) accepts.
#[derive(Clone)]
pub enum PluginSource {
    /// A plugin value.
    Plugin(Arc<dyn Plugin>),
    /// `"name"` or `"name$tag"`, looked up in the instance's plugin catalog.
    Named(String),
}

impl PluginSource {
    /// Wraps any plugin value.
    pub fn of<P: Plugin + 'static>(plugin: P) -> Self {
        Self::Plugin(Arc::new(plugin))
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(plugin) => f.debug_tuple("Plugin").field(&plugin.name()).finish(),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl From<PluginDescriptor> for PluginSource {
    fn from(descriptor: PluginDescriptor) -> Self {
        Self::of(descriptor)
    }
}

impl From<Arc<dyn Plugin>> for PluginSource {
    fn from(plugin: Arc<dyn Plugin>) -> Self {
        Self::Plugin(plugin)
    }
}

impl From<&str> for PluginSource {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for PluginSource {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}
