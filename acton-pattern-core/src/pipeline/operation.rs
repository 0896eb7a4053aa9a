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

use serde_json::Value;

use crate::merge::MergeMode;

/// Data carried through a [`TaskPipeline`](super::TaskPipeline).
///
/// `Patch` is what a task hands back to be merged into the data, `Output` is what a
/// task declares when it stops the pipeline early.
pub trait PipelineData: Send + 'static {
    /// Partial update produced by a task.
    type Patch: Send + 'static;
    /// Declared result of a stopping task.
    type Output: Send + 'static;

    /// Applies `patch` with the precedence chosen by the task that produced it.
    fn merge(&mut self, patch: Self::Patch, mode: MergeMode);
}

/// What a task asks the engine to do next.
pub enum Operation<D: PipelineData> {
    /// Move on to the next task.
    Continue,
    /// Merge a patch into the data, then move on.
    Merge {
        /// The partial update.
        patch: D::Patch,
        /// Whether decided values are kept or replaced.
        mode: MergeMode,
    },
    /// Halt and return the declared output without running later tasks.
    Stop(D::Output),
    /// Invoke a named, pipeline-scoped side effect.
    Operator {
        /// Operator name as registered with [`TaskPipeline::operator`](super::TaskPipeline::operator).
        name: String,
        /// Free-form argument for the operator.
        payload: Value,
    },
}

impl<D: PipelineData> Operation<D> {
    /// A merge that overwrites decided values.
    pub fn merge(patch: D::Patch) -> Self {
        Self::Merge {
            patch,
            mode: MergeMode::Overwrite,
        }
    }

    /// A merge that keeps decided values.
    pub fn preserve(patch: D::Patch) -> Self {
        Self::Merge {
            patch,
            mode: MergeMode::Preserve,
        }
    }

    /// A named operator call.
    pub fn operator(name: impl Into<String>, payload: Value) -> Self {
        Self::Operator {
            name: name.into(),
            payload,
        }
    }
}

impl<D: PipelineData> fmt::Debug for Operation<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::Merge { mode, .. } => f.debug_struct("Merge").field("mode", mode).finish(),
            Self::Stop(_) => f.write_str("Stop"),
            Self::Operator { name, .. } => f.debug_struct("Operator").field("name", name).finish(),
        }
    }
}

/// Result of an operator call.
#[derive(Debug)]
pub enum Flow<O> {
    /// Keep running the pipeline.
    Continue,
    /// Halt with this output.
    Stop(O),
}

/// How a pipeline run ended.
pub enum Outcome<D: PipelineData> {
    /// Every task ran.
    Done(D),
    /// A task or operator declared a stop.
    Stopped {
        /// Name of the stopping task.
        task: String,
        /// The declared output.
        output: D::Output,
        /// Data as it was when the pipeline stopped.
        data: D,
    },
    /// A task failed or panicked. This is an internal failure, never an expected branch.
    Failed {
        /// Name of the failing task.
        task: String,
        /// What went wrong.
        error: anyhow::Error,
        /// Data as it was when the task failed.
        data: D,
    },
}

impl<D: PipelineData> Outcome<D> {
    /// The data in whatever state the run left it.
    pub fn into_data(self) -> D {
        match self {
            Self::Done(data) | Self::Stopped { data, .. } | Self::Failed { data, .. } => data,
        }
    }

    /// Returns `true` if every task ran.
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

impl<D: PipelineData> fmt::Debug for Outcome<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(_) => f.write_str("Done"),
            Self::Stopped { task, .. } => f.debug_struct("Stopped").field("task", task).finish(),
            Self::Failed { task, error, .. } => f
                .debug_struct("Failed")
                .field("task", task)
                .field("error", error)
                .finish(),
        }
    }
}
