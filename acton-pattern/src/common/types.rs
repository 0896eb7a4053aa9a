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

//! Defines common type aliases used within `acton-pattern`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::Task;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::instance::{ActionDef, CallData, Instance};
use crate::message::{ActError, ActionContext, Meta};

/// Outcome of a call: a result value (`Null` for none) or an error.
pub type ActResult = Result<Value, ActError>;

/// Pinned, boxed future returned by action handlers.
pub type ActionFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Signature of an action handler. The handler answers through the context's reply.
pub type ActionHandler = dyn Fn(ActionContext) -> ActionFuture + Send + Sync + 'static;

/// Signature of a subscriber. Inward subscribers see `None`, outward ones the result.
pub type SubscriberFn = dyn Fn(&Msg, Option<&ActResult>) -> anyhow::Result<()> + Send + Sync + 'static;

/// Caller callback receiving the final result and the frozen call metadata.
pub type ReplyCallback = Box<dyn FnOnce(ActResult, Arc<Meta>) -> anyhow::Result<()> + Send + 'static>;

/// Global hook for callback errors and fatal errors.
pub type ErrorHook = Arc<dyn Fn(&ActError) + Send + Sync + 'static>;

/// Interceptor declared by an action; later registrations of the same pattern are
/// handed to it instead of replacing the router entry.
pub type HandleHook = Arc<dyn Fn(Arc<ActionDef>) + Send + Sync + 'static>;

/// A task of the inward or outward call pipeline.
pub type CallTask = Task<Instance, CallData>;

/// Unit of work queued on a gate scope.
pub(crate) type GateJob = BoxFuture<'static, ()>;
