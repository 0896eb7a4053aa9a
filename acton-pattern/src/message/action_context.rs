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

use std::sync::Arc;

use acton_pattern_core::pattern::Msg;
use serde_json::Value;

use crate::common::ActResult;
use crate::instance::{Instance, Responder};
use crate::message::{ActError, IntoMessage, Meta};

/// Everything a handler gets for one call.
///
/// Cloning is cheap; all clones share the same single-use reply slot.
#[derive(Clone)]
pub struct ActionContext {
    message: Arc<Msg>,
    meta: Arc<Meta>,
    responder: Responder,
    instance: Instance,
}

impl ActionContext {
    pub(crate) const fn new(message: Arc<Msg>, meta: Arc<Meta>, responder: Responder, instance: Instance) -> Self {
        Self {
            message,
            meta,
            responder,
            instance,
        }
    }

    /// The message, with directives removed apart from `tx$`.
    #[must_use]
    pub fn message(&self) -> &Msg {
        &self.message
    }

    /// One message field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.message.get(key)
    }

    /// Call metadata.
    #[must_use]
    pub const fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    /// The action delegate. Calls made through it are children of this call.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Answers the call. Only the first reply counts; returns `false` otherwise.
    pub fn reply(&self, result: ActResult) -> bool {
        self.responder.send(result)
    }

    /// Answers with a value.
    pub fn ok(&self, value: Value) -> bool {
        self.reply(Ok(value))
    }

    /// Answers with an error.
    pub fn fail(&self, error: ActError) -> bool {
        self.reply(Err(error))
    }

    /// Returns `true` once the call was answered or timed out.
    #[must_use]
    pub fn replied(&self) -> bool {
        self.responder.is_settled()
    }

    /// Calls the definition this action overrides.
    ///
    /// # Errors
    /// See [`Instance::prior`].
    pub async fn prior(&self, msg: impl IntoMessage) -> ActResult {
        self.instance.prior(msg).await
    }

    /// Makes a child call.
    ///
    /// # Errors
    /// Whatever the child call fails with.
    pub async fn act(&self, msg: impl IntoMessage) -> ActResult {
        self.instance.act(msg).await
    }
}
