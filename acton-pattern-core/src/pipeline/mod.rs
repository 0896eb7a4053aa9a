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

//! Generic ordered-task executor.
//!
//! A [`TaskPipeline`] runs named tasks over a `(context, data)` pair, one at a time
//! and in list order. Each task answers with an [`Operation`]: continue, merge a
//! patch, stop with a declared output, or call a named operator. Operators are how a
//! concrete pipeline commits its own side effects without the engine knowing about
//! them. Tasks can be inserted before or after an existing task by name, which is
//! how extensions hook into a pipeline that is already built.
//!
//! A task that returns an error or panics aborts the run as [`Outcome::Failed`],
//! which is kept distinct from a declared [`Outcome::Stopped`].

mod operation;
mod task;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{instrument, trace};

pub use operation::{Flow, Operation, Outcome, PipelineData};
pub use task::{OperatorFn, Task, TaskFn, TaskFuture};

/// Errors raised while building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A task with this name is already present.
    DuplicateTask(String),
    /// No task with this name exists to insert next to.
    UnknownAnchor(String),
    /// A task called an operator that was never registered.
    UnknownOperator(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTask(name) => write!(f, "duplicate pipeline task '{name}'"),
            Self::UnknownAnchor(name) => write!(f, "no pipeline task named '{name}'"),
            Self::UnknownOperator(name) => write!(f, "no pipeline operator named '{name}'"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Where to put a task when extending a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Append to the end.
    End,
    /// Insert directly before the named task.
    Before(String),
    /// Insert directly after the named task.
    After(String),
}

/// An ordered list of named tasks plus the operators they may call.
pub struct TaskPipeline<C, D: PipelineData> {
    name: String,
    tasks: Vec<Task<C, D>>,
    operators: HashMap<String, Arc<OperatorFn<C, D>>>,
}

impl<C, D: PipelineData> Clone for TaskPipeline<C, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tasks: self.tasks.clone(),
            operators: self.operators.clone(),
        }
    }
}

impl<C, D: PipelineData> fmt::Debug for TaskPipeline<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPipeline")
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .field("operators", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C, D> TaskPipeline<C, D>
where
    C: Send + Sync + 'static,
    D: PipelineData,
{
    /// Creates an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            operators: HashMap::new(),
        }
    }

    /// The pipeline name, used in trace output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task names in execution order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(Task::name).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.name() == name)
    }

    fn ensure_unique(&self, task: &Task<C, D>) -> Result<(), PipelineError> {
        if self.position(task.name()).is_some() {
            return Err(PipelineError::DuplicateTask(task.name().to_string()));
        }
        Ok(())
    }

    /// Appends a task.
    ///
    /// # Errors
    /// Returns [`PipelineError::DuplicateTask`] if the name is taken.
    pub fn add(&mut self, task: Task<C, D>) -> Result<&mut Self, PipelineError> {
        self.ensure_unique(&task)?;
        self.tasks.push(task);
        Ok(self)
    }

    /// Inserts a task directly before `anchor`.
    ///
    /// # Errors
    /// Fails if `anchor` does not exist or the name is taken.
    pub fn insert_before(&mut self, anchor: &str, task: Task<C, D>) -> Result<&mut Self, PipelineError> {
        self.ensure_unique(&task)?;
        let index = self
            .position(anchor)
            .ok_or_else(|| PipelineError::UnknownAnchor(anchor.to_string()))?;
        self.tasks.insert(index, task);
        Ok(self)
    }

    /// Inserts a task directly after `anchor`.
    ///
    /// # Errors
    /// Fails if `anchor` does not exist or the name is taken.
    pub fn insert_after(&mut self, anchor: &str, task: Task<C, D>) -> Result<&mut Self, PipelineError> {
        self.ensure_unique(&task)?;
        let index = self
            .position(anchor)
            .ok_or_else(|| PipelineError::UnknownAnchor(anchor.to_string()))?;
        self.tasks.insert(index + 1, task);
        Ok(self)
    }

    /// Places a task according to `placement`.
    ///
    /// # Errors
    /// See [`add`](Self::add), [`insert_before`](Self::insert_before) and
    /// [`insert_after`](Self::insert_after).
    pub fn place(&mut self, placement: &Placement, task: Task<C, D>) -> Result<&mut Self, PipelineError> {
        match placement {
            Placement::End => self.add(task),
            Placement::Before(anchor) => self.insert_before(anchor, task),
            Placement::After(anchor) => self.insert_after(anchor, task),
        }
    }

    /// Registers a named operator, replacing any operator of the same name.
    pub fn operator<F>(&mut self, name: impl Into<String>, op: F) -> &mut Self
    where
        F: Fn(&C, &mut D, Value) -> anyhow::Result<Flow<D::Output>> + Send + Sync + 'static,
    {
        self.operators.insert(name.into(), Arc::new(op));
        self
    }

    /// A copy of this pipeline holding only the named tasks, in their current order.
    #[must_use]
    pub fn subset(&self, name: impl Into<String>, keep: &[&str]) -> Self {
        Self {
            name: name.into(),
            tasks: self
                .tasks
                .iter()
                .filter(|task| keep.contains(&task.name()))
                .cloned()
                .collect(),
            operators: self.operators.clone(),
        }
    }

    /// Runs every task in order against `data`.
    ///
    /// Sync and async tasks are awaited the same way, and the engine yields to the
    /// scheduler between steps so independent call chains interleave.
    #[instrument(skip_all, fields(pipeline = %self.name))]
    pub async fn exec(&self, ctx: &C, mut data: D) -> Outcome<D> {
        for task in &self.tasks {
            let name = task.name();
            trace!(task = name, "running task");

            let pending = match catch_unwind(AssertUnwindSafe(|| (task.exec)(ctx, &data))) {
                Ok(pending) => pending,
                Err(panic) => return failed(name, panicked(&*panic), data),
            };
            let operation = match AssertUnwindSafe(pending).catch_unwind().await {
                Ok(Ok(operation)) => operation,
                Ok(Err(error)) => return failed(name, error, data),
                Err(panic) => return failed(name, panicked(&*panic), data),
            };
            trace!(task = name, ?operation, "task finished");

            match operation {
                Operation::Continue => {}
                Operation::Merge { patch, mode } => data.merge(patch, mode),
                Operation::Stop(output) => {
                    return Outcome::Stopped {
                        task: name.to_string(),
                        output,
                        data,
                    }
                }
                Operation::Operator { name: op_name, payload } => {
                    let Some(op) = self.operators.get(&op_name) else {
                        return failed(name, PipelineError::UnknownOperator(op_name).into(), data);
                    };
                    match catch_unwind(AssertUnwindSafe(|| op(ctx, &mut data, payload))) {
                        Ok(Ok(Flow::Continue)) => {}
                        Ok(Ok(Flow::Stop(output))) => {
                            return Outcome::Stopped {
                                task: name.to_string(),
                                output,
                                data,
                            }
                        }
                        Ok(Err(error)) => return failed(name, error, data),
                        Err(panic) => return failed(name, panicked(&*panic), data),
                    }
                }
            }
            tokio::task::yield_now().await;
        }
        Outcome::Done(data)
    }
}

fn failed<D: PipelineData>(task: &str, error: anyhow::Error, data: D) -> Outcome<D> {
    trace!(task, %error, "task failed");
    Outcome::Failed {
        task: task.to_string(),
        error,
        data,
    }
}

fn panicked(payload: &(dyn Any + Send)) -> anyhow::Error {
    anyhow::anyhow!("task panicked: {}", panic_message(payload))
}

/// Extracts the text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::FutureExt;
    use serde_json::json;

    use super::*;
    use crate::merge::{merge_map, MergeMode};
    use crate::pattern::Msg;

    #[derive(Debug, Default)]
    struct Data {
        fields: Msg,
        log: Vec<String>,
    }

    impl PipelineData for Data {
        type Patch = Msg;
        type Output = String;

        fn merge(&mut self, patch: Msg, mode: MergeMode) {
            merge_map(&mut self.fields, patch, mode);
        }
    }

    type Ctx = Arc<AtomicUsize>;

    fn patch(value: Value) -> Msg {
        value.as_object().cloned().unwrap()
    }

    fn pipeline() -> TaskPipeline<Ctx, Data> {
        let mut p = TaskPipeline::new("test");
        p.add(Task::sync("first", |_, _| Ok(Operation::merge(patch(json!({"a": 1, "b": 1}))))))
            .unwrap()
            .add(Task::new("second", |_, _| {
                async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(Operation::preserve(patch(json!({"a": 2, "c": 3}))))
                }
                .boxed()
            }))
            .unwrap();
        p
    }

    #[tokio::test]
    async fn tasks_run_in_order_and_merge_explicitly() {
        let outcome = pipeline().exec(&Ctx::default(), Data::default()).await;
        let Outcome::Done(data) = outcome else {
            panic!("expected done, got {outcome:?}");
        };
        assert_eq!(Value::Object(data.fields), json!({"a": 1, "b": 1, "c": 3}));
    }

    #[tokio::test]
    async fn stop_halts_before_later_tasks() {
        let mut p = pipeline();
        let ran = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&ran);
        p.insert_after("first", Task::sync("halt", |_, _| Ok(Operation::Stop("halted".into()))))
            .unwrap()
            .add(Task::sync("never", move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Operation::Continue)
            }))
            .unwrap();
        assert_eq!(p.task_names(), vec!["first", "halt", "second", "never"]);

        match p.exec(&Ctx::default(), Data::default()).await {
            Outcome::Stopped { task, output, data } => {
                assert_eq!(task, "halt");
                assert_eq!(output, "halted");
                assert_eq!(data.fields.get("a"), Some(&json!(1)));
            }
            other => panic!("expected stop, got {other:?}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn operators_commit_side_effects_and_may_stop() {
        let mut p: TaskPipeline<Ctx, Data> = TaskPipeline::new("ops");
        p.operator("count", |ctx: &Ctx, data: &mut Data, payload| {
            let by = payload.as_u64().unwrap_or(1) as usize;
            let total = ctx.fetch_add(by, Ordering::SeqCst) + by;
            data.log.push(format!("count:{total}"));
            if total >= 3 {
                return Ok(Flow::Stop(format!("limit at {total}")));
            }
            Ok(Flow::Continue)
        });
        p.add(Task::sync("one", |_, _| Ok(Operation::operator("count", json!(1)))))
            .unwrap()
            .add(Task::sync("two", |_, _| Ok(Operation::operator("count", json!(2)))))
            .unwrap()
            .add(Task::sync("three", |_, _| Ok(Operation::operator("count", json!(5)))))
            .unwrap();

        let ctx = Ctx::default();
        match p.exec(&ctx, Data::default()).await {
            Outcome::Stopped { task, output, data } => {
                assert_eq!(task, "two");
                assert_eq!(output, "limit at 3");
                assert_eq!(data.log, vec!["count:1", "count:3"]);
            }
            other => panic!("expected stop, got {other:?}"),
        }
        assert_eq!(ctx.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_and_panics_are_internal_failures() {
        let mut p = pipeline();
        p.insert_before("second", Task::sync("boom", |_, _| anyhow::bail!("bad input")))
            .unwrap();
        match p.exec(&Ctx::default(), Data::default()).await {
            Outcome::Failed { task, error, .. } => {
                assert_eq!(task, "boom");
                assert_eq!(error.to_string(), "bad input");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let mut p: TaskPipeline<Ctx, Data> = TaskPipeline::new("panics");
        p.add(Task::new("async-panic", |_, _| {
            async {
                if true {
                    panic!("exploded");
                }
                Ok(Operation::Continue)
            }
            .boxed()
        }))
        .unwrap();
        match p.exec(&Ctx::default(), Data::default()).await {
            Outcome::Failed { error, .. } => assert!(error.to_string().contains("exploded")),
            other => panic!("expected failure, got {other:?}"),
        }

        let mut p: TaskPipeline<Ctx, Data> = TaskPipeline::new("missing-op");
        p.add(Task::sync("call", |_, _| Ok(Operation::operator("nope", Value::Null))))
            .unwrap();
        assert!(matches!(
            p.exec(&Ctx::default(), Data::default()).await,
            Outcome::Failed { .. }
        ));
    }

    #[test]
    fn insertion_checks_names() {
        let mut p = pipeline();
        assert_eq!(
            p.add(Task::sync("first", |_, _| Ok(Operation::Continue))).unwrap_err(),
            PipelineError::DuplicateTask("first".into())
        );
        assert_eq!(
            p.insert_before("zzz", Task::sync("x", |_, _| Ok(Operation::Continue)))
                .unwrap_err(),
            PipelineError::UnknownAnchor("zzz".into())
        );
        p.place(&Placement::Before("first".into()), Task::sync("zero", |_, _| Ok(Operation::Continue)))
            .unwrap();
        assert_eq!(p.task_names(), vec!["zero", "first", "second"]);
        assert_eq!(p.subset("reduced", &["second", "zero"]).task_names(), vec!["zero", "second"]);
    }
}
