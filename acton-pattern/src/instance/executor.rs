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

//! Runs a matched handler and waits for its single reply.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acton_pattern_core::pipeline::panic_message;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{instrument, trace, warn};

use crate::common::{ActResult, ActionHandler};
use crate::instance::{ActionKind, CallData, Instance};
use crate::message::{ActError, ActionContext, ErrorCode};

struct Latch {
    sender: Mutex<Option<oneshot::Sender<ActResult>>>,
    settled: Arc<AtomicBool>,
    pattern: String,
    id: String,
}

/// The single-use reply slot of one call.
///
/// The first reply, or the timeout, settles the call; anything after that is
/// logged and discarded.
#[derive(Clone)]
pub(crate) struct Responder(Arc<Latch>);

impl Responder {
    pub(crate) fn new(
        settled: Arc<AtomicBool>,
        pattern: impl Into<String>,
        id: impl Into<String>,
    ) -> (Self, oneshot::Receiver<ActResult>) {
        let (sender, receiver) = oneshot::channel();
        let latch = Latch {
            sender: Mutex::new(Some(sender)),
            settled,
            pattern: pattern.into(),
            id: id.into(),
        };
        (Self(Arc::new(latch)), receiver)
    }

    /// Delivers `result` if the call is still open. Returns `false` for a late reply.
    pub(crate) fn send(&self, result: ActResult) -> bool {
        let sender = self.0.sender.lock().take();
        match sender {
            Some(sender) => {
                self.0.settled.store(true, Ordering::Release);
                let _ = sender.send(result);
                true
            }
            None => {
                warn!(pattern = %self.0.pattern, id = %self.0.id, "late reply discarded");
                false
            }
        }
    }

    /// Settles the call without a reply. Returns `false` if a reply got there first.
    fn expire(&self) -> bool {
        let sender = self.0.sender.lock().take();
        self.0.settled.store(true, Ordering::Release);
        sender.is_some()
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.0.settled.load(Ordering::Acquire)
    }
}

/// Runs the handler of `data.def` and returns its reply.
#[instrument(skip_all, fields(pattern = %data.meta.pattern, id = %data.meta.id))]
pub(crate) async fn execute(instance: &Instance, data: &CallData) -> ActResult {
    let (Some(def), Some(delegate)) = (&data.def, &data.delegate) else {
        return Err(ActError::new(ErrorCode::ActInternal, "no action was prepared for the call"));
    };
    let ActionKind::Handler(handler) = &def.kind else {
        return Err(ActError::new(ErrorCode::ActInternal, "subscribers cannot be executed"));
    };
    let Some(active) = delegate.active() else {
        return Err(ActError::new(ErrorCode::ActInternal, "action delegate has no active call"));
    };

    let (responder, receiver) = Responder::new(Arc::clone(&active.settled), &data.meta.pattern, &data.meta.id);
    let ctx = ActionContext::new(
        Arc::new(data.msg.clone()),
        Arc::clone(&active.meta),
        responder.clone(),
        Instance {
            root: Arc::clone(&instance.root),
            delegate: Arc::clone(delegate),
        },
    );
    trace!("running handler");
    spawn_handler(Arc::clone(handler), ctx, responder.clone());
    await_reply(&responder, receiver, data.meta.timeout, &data.meta.pattern).await
}

fn spawn_handler(handler: Arc<ActionHandler>, ctx: ActionContext, responder: Responder) {
    let pending = match catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
        Ok(pending) => pending,
        Err(panic) => {
            responder.send(Err(ActError::execute(format!(
                "handler panicked: {}",
                panic_message(&*panic)
            ))));
            return;
        }
    };
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(pending).catch_unwind().await {
            responder.send(Err(ActError::execute(format!(
                "handler panicked: {}",
                panic_message(&*panic)
            ))));
        }
    });
}

async fn await_reply(
    responder: &Responder,
    mut receiver: oneshot::Receiver<ActResult>,
    timeout_ms: u64,
    pattern: &str,
) -> ActResult {
    if timeout_ms == 0 {
        return receiver.await.unwrap_or_else(|_| Err(dropped()));
    }
    tokio::select! {
        reply = &mut receiver => reply.unwrap_or_else(|_| Err(dropped())),
        () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            if responder.expire() {
                Err(ActError::new(
                    ErrorCode::ActionTimeout,
                    format!("action {pattern} timed out after {timeout_ms}ms"),
                )
                .with("pattern", pattern)
                .with("timeout", timeout_ms))
            } else {
                receiver.await.unwrap_or_else(|_| Err(dropped()))
            }
        }
    }
}

fn dropped() -> ActError {
    ActError::new(ErrorCode::ActInternal, "reply channel dropped")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn first_reply_wins_and_late_replies_are_dropped() {
        let settled = Arc::new(AtomicBool::new(false));
        let (responder, receiver) = Responder::new(Arc::clone(&settled), "a:1", "m/t");
        assert!(!responder.is_settled());
        assert!(responder.send(Ok(json!({"n": 1}))));
        assert!(!responder.send(Ok(json!({"n": 2}))));
        assert!(settled.load(Ordering::Acquire));
        assert_eq!(receiver.await.unwrap().unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn timeout_settles_the_call() {
        let (responder, receiver) = Responder::new(Arc::new(AtomicBool::new(false)), "a:1", "m/t");
        let result = await_reply(&responder, receiver, 20, "a:1").await;
        assert!(result.unwrap_err().is(ErrorCode::ActionTimeout));
        assert!(!responder.send(Ok(json!({}))));
    }
}
