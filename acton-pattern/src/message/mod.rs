//! Messages and everything attached to a single call.
//!
//! *   [`Directives`]: the reserved `$` fields steering a call.
//! *   [`Meta`]: per-call metadata.
//! *   [`ActError`]: coded call errors.
//! *   [`ActionContext`]: what a handler receives.

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
pub use act_error::{ActError, ErrorCode};
pub use action_context::ActionContext;
pub use directives::Directives;
pub use into_message::{IntoMessage, PatternSource};
pub use log_record::{LogKind, LogRecord};
pub use meta::{ExplainLog, Meta, SharedMap, TraceDescriptor, TraceLog};

// --- Crate-Internal Re-exports ---
pub(crate) use meta::{now_ms, CallDefaults, Origin};

// --- Submodules ---

mod act_error;
mod action_context;
/// Reserved field names and their parsing.
pub mod directives;
mod into_message;
mod log_record;
mod meta;
