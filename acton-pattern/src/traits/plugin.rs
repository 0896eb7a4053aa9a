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

use async_trait::async_trait;
use serde_json::Value;

use crate::instance::Instance;
use crate::plugin::{PluginDefaults, PluginDefinition, Preload, PreloadContext};

/// A self-contained unit of registrations loaded through
/// [`Instance::use_plugin`](crate::prelude::Instance::use_plugin).
///
/// `define` receives a delegate scoped to the plugin: actions it registers are
/// attributed to the plugin and share its state.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name.
    fn name(&self) -> &str;

    /// Plugin tag, distinguishing several loads of the same plugin.
    fn tag(&self) -> Option<&str> {
        None
    }

    /// Declared defaults, merged under the resolved options and used as their shape.
    fn defaults(&self) -> PluginDefaults {
        PluginDefaults::default()
    }

    /// Runs before anything is registered; may rename the plugin or add exports and
    /// pipeline extensions.
    fn preload(&self, _ctx: &PreloadContext) -> Option<Preload> {
        None
    }

    /// Registers the plugin's actions.
    ///
    /// # Errors
    /// Any error is fatal to the instance.
    async fn define(&self, instance: &Instance, options: Value) -> anyhow::Result<Option<PluginDefinition>>;
}
