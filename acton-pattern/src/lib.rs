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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Acton Pattern
//!
//! A pattern-matching message router and plugin runtime built on Tokio.
//!
//! Messages are JSON objects. Actions are registered against patterns, sets of
//! `field:value` pairs, and every message goes to the most specific pattern it
//! matches. Each call runs through an inward pipeline, the handler and an outward
//! pipeline, and replies exactly once.
//!
//! ## Key Concepts
//!
//! - **Instance (`Instance`)**: the registry and dispatcher. Handles are cheap to
//!   clone and are always seen through a delegate.
//! - **Delegates**: context-scoped views adding fixed fields, call defaults, a
//!   plugin identity or, for handlers, the running call. Calls made from inside a
//!   handler through its context become children of that call.
//! - **Overrides (`prior`)**: registering a pattern again overrides the previous
//!   action, which stays reachable from the new one.
//! - **Gate scopes**: `gate()` delegates run their calls one at a time, in order.
//! - **Plugins (`Plugin`)**: units of registrations, loaded one at a time with
//!   option resolution, exports and pipeline extensions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use acton_pattern::prelude::*;
//!
//! let instance = PatternApp::launch_async().await?;
//! instance
//!     .add("a:1", |ctx| ActionReply::ok(ctx, json!({"x": 1})))
//!     .await?;
//! assert_eq!(instance.act("a:1").await?, json!({"x": 1}));
//! ```

/// Shared building blocks: launcher, configuration, statistics.
pub(crate) mod common;

/// The instance, its delegates and the call pipelines.
pub(crate) mod instance;

/// Messages, directives, metadata and errors.
pub(crate) mod message;

/// Plugin identity, definitions and loading.
pub(crate) mod plugin;

/// Seams for caller-supplied behavior.
pub(crate) mod traits;

/// A prelude module for conveniently importing the most commonly used items.
///
/// Besides this crate's own types it re-exports the pattern, merge and pipeline
/// primitives of `acton-pattern-core`, `async_trait`, and `serde_json`'s `json!`,
/// `Value` and `Map`.
pub mod prelude {
    // External crate re-exports
    pub use acton_pattern_core::prelude::*;
    pub use async_trait::async_trait;
    pub use serde_json::{json, Map, Value};

    // Core types
    pub use crate::common::{
        init_tracing, ActResult, ActionFuture, ActionReply, ActionStatsSnapshot, CallTask, ErrorHook, HandleHook,
        IdConfig, PatternApp, PatternConfig, ReplyCallback, StatsSnapshot, TracingConfig,
    };
    pub use crate::instance::{
        ActionDef, ActionKind, AddOptions, CallData, CallOperation, CallPatch, DelegateOptions, GateScope, Instance,
        InstanceState, Phase, CLOSE_PATTERN, DEFINE_PATTERN,
    };
    pub use crate::message::{
        directives, ActError, ActionContext, Directives, ErrorCode, ExplainLog, IntoMessage, LogKind, LogRecord, Meta,
        PatternSource, SharedMap, TraceDescriptor, TraceLog,
    };
    pub use crate::plugin::{
        options, DefaultsHelpers, Extension, PluginDefaults, PluginDefinition, PluginDescriptor, PluginInstance,
        PluginRef, PluginSource, Preload, PreloadContext, INIT_OPTION,
    };
    pub use crate::traits::{
        is_entity, EntityNormalizer, FieldRule, LogHook, MessageValidator, Plugin, Schema, ValueKind, ENTITY_MARKER,
    };
}
