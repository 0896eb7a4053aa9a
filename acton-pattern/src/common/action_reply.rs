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

//! Convenient helpers for creating handler return types.
//!
//! ```rust,ignore
//! // Synchronous handler
//! instance.add("role:math,cmd:sum", |ctx| {
//!     let sum = ctx.message()["left"].as_i64().unwrap_or(0) + ctx.message()["right"].as_i64().unwrap_or(0);
//!     ActionReply::ok(ctx, json!({"answer": sum}))
//! }).await?;
//!
//! // Async handler whose result becomes the reply
//! instance.add("role:math,cmd:twice", |ctx| {
//!     let next = ctx.clone();
//!     ActionReply::respond(ctx, async move {
//!         let once = next.prior(next.message().clone()).await?;
//!         Ok::<_, ActError>(json!({"x": once["x"].as_i64().unwrap_or(0) * 2}))
//!     })
//! }).await?;
//! ```

use std::future::Future;

use serde_json::Value;

use crate::common::ActionFuture;
use crate::message::{ActError, ActionContext};

/// A utility namespace for creating handler return types.
pub struct ActionReply;

impl ActionReply {
    /// Creates an immediately resolving future for handlers that already replied,
    /// or that reply later from elsewhere.
    #[inline]
    #[must_use]
    pub fn ready() -> ActionFuture {
        Box::pin(async move {})
    }

    /// Wraps an async block into the handler return type.
    #[inline]
    pub fn pending<F>(future: F) -> ActionFuture
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Box::pin(future)
    }

    /// Replies with `value` right away.
    #[inline]
    pub fn ok(ctx: ActionContext, value: Value) -> ActionFuture {
        ctx.ok(value);
        Self::ready()
    }

    /// Replies with `error` right away.
    #[inline]
    pub fn fail(ctx: ActionContext, error: impl Into<ActError>) -> ActionFuture {
        ctx.fail(error.into());
        Self::ready()
    }

    /// Awaits `future` and replies with its outcome.
    ///
    /// Errors that are not already an [`ActError`] are reported as `act_execute`.
    #[inline]
    pub fn respond<F, E>(ctx: ActionContext, future: F) -> ActionFuture
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<ActError> + Send + 'static,
    {
        Box::pin(async move {
            let outcome = future.await.map_err(Into::into);
            ctx.reply(outcome);
        })
    }
}
