//! Shared building blocks of the runtime.
//!
//! *   [`PatternApp`]: entry point that launches an [`Instance`](crate::prelude::Instance).
//! *   [`PatternConfig`]: XDG/TOML configuration.
//! *   [`ActionReply`]: helpers for writing handler return values.
//! *   [`Stats`] and [`History`]: call statistics and the replay cache.

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
pub use action_reply::ActionReply;
pub use config::{
    BehaviorConfig, IdConfig, InstanceConfig, LimitsConfig, PatternConfig, PluginNamingConfig, PriorConfig,
    StrictConfig, TimeoutConfig, TracingConfig, CONFIG,
};
pub use history::History;
pub use logging::init_tracing;
pub use pattern_app::PatternApp;
pub use stats::{ActionStatsSnapshot, Stats, StatsSnapshot};

// --- Crate-Internal Re-exports ---
pub use types::*;

// --- Submodules ---

/// Common type aliases.
mod types;

/// Defines the `PatternApp` entry point.
mod pattern_app;
/// Handler return helpers.
mod action_reply;
/// Configuration system.
pub mod config;
/// Replay cache keyed by message id.
mod history;
/// Tracing subscriber setup.
mod logging;
/// Call statistics.
mod stats;
