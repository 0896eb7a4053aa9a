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

//! # Acton Pattern Core
//!
//! Leaf building blocks shared by the Acton Pattern runtime. Nothing in this crate
//! knows about instances, delegates or plugins.
//!
//! - [`pattern`]: canonical `field:value` patterns and message literals.
//! - [`router`]: most-specific-match trie over patterns.
//! - [`idgen`]: short random identifiers.
//! - [`merge`]: the single deep-merge primitive with an explicit precedence flag.
//! - [`pipeline`]: the ordered task engine behind registration, invocation and plugin loading.

pub mod idgen;
pub mod merge;
pub mod pattern;
pub mod pipeline;
pub mod router;

/// Commonly used items.
pub mod prelude {
    pub use crate::idgen::{idgen, message_id, DELEGATE_ID_LEN, MESSAGE_ID_LEN};
    pub use crate::merge::{merge_map, merge_value, merged, MergeMode};
    pub use crate::pattern::{
        parse_message, parse_scalar, scalar_text, Msg, Pattern, PatternError, PatternParts,
        DIRECTIVE_SIGIL, WILDCARD,
    };
    pub use crate::pipeline::{
        panic_message, Flow, Operation, Outcome, PipelineData, PipelineError, Placement, Task,
        TaskFuture, TaskPipeline,
    };
    pub use crate::router::{Entry, Router};
}
