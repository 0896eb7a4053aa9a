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
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use super::operation::{Flow, Operation, PipelineData};

/// Boxed future returned by every task.
pub type TaskFuture<D> = BoxFuture<'static, anyhow::Result<Operation<D>>>;

/// Signature of a task body.
pub type TaskFn<C, D> = dyn Fn(&C, &D) -> TaskFuture<D> + Send + Sync + 'static;

/// Signature of a named operator.
pub type OperatorFn<C, D> = dyn Fn(&C, &mut D, Value) -> anyhow::Result<Flow<<D as PipelineData>::Output>>
    + Send
    + Sync
    + 'static;

/// A named pipeline step.
pub struct Task<C, D: PipelineData> {
    name: String,
    pub(crate) exec: Arc<TaskFn<C, D>>,
}

impl<C, D: PipelineData> Clone for Task<C, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            exec: Arc::clone(&self.exec),
        }
    }
}

impl<C, D: PipelineData> fmt::Debug for Task<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

impl<C: 'static, D: PipelineData> Task<C, D> {
    /// An asynchronous task. The returned future must own whatever it needs.
    pub fn new<F>(name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&C, &D) -> TaskFuture<D> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            exec: Arc::new(exec),
        }
    }

    /// A task that decides synchronously. It is awaited like any other.
    pub fn sync<F>(name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(&C, &D) -> anyhow::Result<Operation<D>> + Send + Sync + 'static,
    {
        Self::new(name, move |ctx, data| future::ready(exec(ctx, data)).boxed())
    }

    /// The task name, unique within its pipeline.
    pub fn name(&self) -> &str {
        &self.name
    }
}
