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

//! Calling the definition an action overrides.

use std::sync::Arc;

use acton_pattern_core::pattern::Msg;
use acton_pattern_core::pipeline::Outcome;
use serde_json::Value;
use tracing::trace;

use crate::common::ActResult;
use crate::instance::{execute, inward, task_failure, CallData, Instance};
use crate::message::{directives, ActError, Directives, ErrorCode, IntoMessage, Meta};

impl Instance {
    /// Calls the definition overridden by the action currently running on this
    /// delegate.
    ///
    /// Without an overridden definition the reply is the message's `default$`,
    /// or `null`. By default the call is routed through the full pipelines as a
    /// child call; with `prior.direct` it runs a reduced inward pipeline and the
    /// handler in place.
    ///
    /// # Errors
    /// `prior_inactive` when there is no running action or it already replied;
    /// otherwise whatever the overridden action replies.
    pub async fn prior(&self, msg: impl IntoMessage) -> ActResult {
        let Some(active) = self.delegate.active() else {
            return Err(ActError::new(ErrorCode::PriorInactive, "prior called outside of an action"));
        };
        if active.is_settled() {
            return Err(ActError::new(ErrorCode::PriorInactive, "prior called after the action replied")
                .with("pattern", active.meta.pattern.clone()));
        }
        let mut msg = msg.into_message()?;
        let Some(prior_id) = active.def.prior_id().map(str::to_string) else {
            trace!(pattern = %active.meta.pattern, "no prior definition");
            return Ok(msg.remove(directives::DEFAULT).unwrap_or(Value::Null));
        };
        if self.root.config.prior.direct {
            return self.prior_direct(msg, &prior_id).await;
        }
        msg.insert(directives::PRIOR.to_string(), Value::String(prior_id));
        self.act(msg).await
    }

    async fn prior_direct(&self, mut msg: Msg, prior_id: &str) -> ActResult {
        let def = self
            .root
            .actions
            .get(prior_id)
            .map(|def| Arc::clone(def.value()))
            .ok_or_else(|| ActError::new(ErrorCode::ActNotFound, format!("prior action {prior_id} is gone")))?;
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
        let data = CallData {
            msg,
            directives,
            meta,
            def: Some(def),
            result: None,
            caller: Arc::clone(&self.delegate),
            delegate: None,
            scoped: self.delegate.gate_scope().is_some(),
            cached: false,
        };
        let reduced = self.root.inward.read().subset("prior", inward::DIRECT_PRIOR_TASKS);
        match reduced.exec(self, data).await {
            Outcome::Done(data) => execute(self, &data).await,
            Outcome::Stopped { output, .. } => output,
            Outcome::Failed { task, error, .. } => Err(task_failure("prior", &task, &error)),
        }
    }
}
