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

//! Dispatch: turning a submitted message into exactly one reply.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::{panic_message, Outcome};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{error, instrument, trace};

use crate::common::{ActResult, ReplyCallback};
use crate::instance::{execute, CallData, Instance};
use crate::message::{directives, ActError, Directives, ErrorCode, IntoMessage, LogKind, LogRecord, Meta};

impl Instance {
    /// Submits a message without waiting.
    ///
    /// `reply`, if given, is called exactly once with the result and the call
    /// metadata. Calls made through a gated delegate queue behind earlier calls of
    /// the same scope; all others start right away.
    pub fn submit(&self, msg: impl IntoMessage, reply: Option<ReplyCallback>) {
        let instance = self.clone();
        let scope = self.delegate.gate_scope();
        let scoped = scope.is_some();
        let job = match msg.into_message() {
            Ok(msg) => async move {
                let (result, meta) = instance.invoke(msg, scoped).await;
                instance.deliver(result, meta, reply).await;
            }
            .boxed(),
            Err(error) => async move {
                let meta = instance.detached_meta();
                instance.deliver(Err(error), meta, reply).await;
            }
            .boxed(),
        };
        match scope {
            Some(scope) => scope.enqueue(job),
            None => {
                tokio::spawn(job);
            }
        }
    }

    /// Submits a message and waits for its result.
    ///
    /// # Errors
    /// Returns the call's error reply.
    pub async fn act(&self, msg: impl IntoMessage) -> ActResult {
        self.act_meta(msg).await.0
    }

    /// Submits a message and waits for its result and metadata.
    pub async fn act_meta(&self, msg: impl IntoMessage) -> (ActResult, Arc<Meta>) {
        let (done, reply) = oneshot::channel();
        self.submit(
            msg,
            Some(Box::new(move |result, meta| {
                let _ = done.send((result, meta));
                Ok(())
            })),
        );
        match reply.await {
            Ok(outcome) => outcome,
            Err(_) => (
                Err(ActError::new(ErrorCode::ActInternal, "call was dropped before replying")),
                Arc::new(self.detached_meta()),
            ),
        }
    }

    /// Metadata for a call that never got as far as the pipelines.
    pub(crate) fn detached_meta(&self) -> Meta {
        Meta::resolve(
            &Directives::default(),
            self.delegate.defaults(),
            None,
            &self.root.origin,
            &self.root.config.ids,
        )
    }

    /// Runs one call through the inward pipeline, the handler and the outward pipeline.
    #[instrument(skip_all)]
    pub(crate) async fn invoke(&self, mut msg: Msg, scoped: bool) -> (ActResult, Meta) {
        self.root.stats.record_submit();
        let fixed = self.delegate.fixed();
        if !fixed.is_empty() {
            merge_map(&mut msg, fixed, MergeMode::Overwrite);
        }
        let directives = Directives::extract(&mut msg);
        let parent = self.delegate.active();
        let meta = Meta::resolve(
            &directives,
            self.delegate.defaults(),
            parent.as_ref().map(|p| &*p.meta),
            &self.root.origin,
            &self.root.config.ids,
        );
        msg.insert(directives::TX.to_string(), Value::String(meta.tx.clone()));
        let def = self.root.find_action(&msg, directives.prior.as_deref());
        trace!(id = %meta.id, matched = def.is_some(), "dispatching");

        let data = CallData {
            msg,
            directives,
            meta,
            def,
            result: None,
            caller: Arc::clone(&self.delegate),
            delegate: None,
            scoped,
            cached: false,
        };

        let inward = Arc::clone(&self.root.inward.read());
        let mut data = match inward.exec(self, data).await {
            Outcome::Done(mut data) => {
                data.result = Some(execute(self, &data).await);
                data
            }
            Outcome::Stopped { output, mut data, .. } => {
                data.result = Some(output);
                data
            }
            Outcome::Failed { task, error, mut data } => {
                data.result = Some(Err(task_failure("inward", &task, &error)));
                data
            }
        };
        if let Some(delegate) = &data.delegate {
            if let Some(active) = delegate.active() {
                active.settled.store(true, Ordering::Release);
            }
        }

        let outward = Arc::clone(&self.root.outward.read());
        data = match outward.exec(self, data).await {
            Outcome::Done(data) => data,
            Outcome::Stopped { output, mut data, .. } => {
                data.result = Some(output);
                data
            }
            Outcome::Failed { task, error, mut data } => {
                data.result = Some(Err(task_failure("outward", &task, &error)));
                data
            }
        };
        (data.result.unwrap_or(Ok(Value::Null)), data.meta)
    }

    /// Hands the result to the caller's callback and escalates fatal errors.
    pub(crate) async fn deliver(&self, result: ActResult, meta: Meta, reply: Option<ReplyCallback>) {
        let meta = Arc::new(meta);
        let escalate = match &result {
            Err(error) if meta.fatal => Some(error.clone()),
            _ => None,
        };
        if let Some(reply) = reply {
            let failure = match catch_unwind(AssertUnwindSafe(|| reply(result, Arc::clone(&meta)))) {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(format!("{error:#}")),
                Err(panic) => Some(panic_message(&*panic)),
            };
            if let Some(reason) = failure {
                self.callback_failed(&meta, reason);
            }
        }
        if let Some(cause) = escalate {
            self.die(
                ActError::new(ErrorCode::InstanceFatal, format!("fatal$ call {} failed: {}", meta.id, cause.message()))
                    .with("cause", cause.to_value()),
            )
            .await;
        }
    }

    fn callback_failed(&self, meta: &Meta, reason: String) {
        let error = ActError::new(ErrorCode::ActCallback, reason)
            .with("pattern", meta.pattern.clone())
            .with("id", meta.id.clone());
        error!(pattern = %meta.pattern, id = %meta.id, %error, "reply callback failed");
        self.root.hooks.callback_error(&error);
        self.root
            .hooks
            .emit(&LogRecord::for_call(LogKind::Callback, meta, "reply callback failed").with_error(error));
    }

    /// Handles an unrecoverable error.
    ///
    /// With `behavior.stay_alive` the error is kept and reported by
    /// [`ready`](Instance::ready); otherwise the instance closes within the close
    /// deadline and the process exits.
    pub(crate) async fn die(&self, error: ActError) {
        let error = if error.is(ErrorCode::InstanceFatal) {
            error
        } else {
            ActError::new(ErrorCode::InstanceFatal, error.message().to_string()).with("cause", error.to_value())
        };
        error!(%error, "instance fatal");
        self.root
            .hooks
            .emit(&LogRecord::new(LogKind::Fatal, error.message().to_string()).with_error(error.clone()));
        self.root.hooks.fatal(&error);
        if self.root.config.behavior.stay_alive {
            self.root.fatal.lock().get_or_insert(error);
            return;
        }
        let deadline = self.root.config.close_deadline();
        if tokio::time::timeout(deadline, self.close()).await.is_err() {
            error!(?deadline, "close did not finish before the deadline");
        }
        std::process::exit(1);
    }
}

pub(crate) fn task_failure(pipeline: &str, task: &str, error: &anyhow::Error) -> ActError {
    match error.downcast_ref::<ActError>() {
        Some(act) => act.clone(),
        None => {
            error!(pipeline, task, %error, "pipeline task failed");
            ActError::new(ErrorCode::ActInternal, format!("{pipeline} task {task} failed: {error:#}"))
                .with("task", task)
        }
    }
}
