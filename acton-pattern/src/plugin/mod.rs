//! Plugins: identity, definitions and the loading lifecycle.

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

// --- Public Re-exports ---
pub use definition::{DefaultsHelpers, Extension, PluginDefaults, PluginDefinition, PluginInstance, Preload, PreloadContext};
pub use descriptor::{PluginDescriptor, PluginSource};
pub use lifecycle::INIT_OPTION;
pub use plugin_ref::{shortname, split_fullname, PluginRef, TAG_SEPARATOR};

// --- Crate-Internal Re-exports ---
pub(crate) use lifecycle::PluginLoad;

// --- Submodules ---

mod definition;
mod descriptor;
pub(crate) mod lifecycle;
/// Resolution of plugin options.
pub mod options;
mod plugin_ref;
