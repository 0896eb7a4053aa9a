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

//! Gate scopes: serialization domains for calls.
//!
//! Every scope owns one worker task draining an unbounded queue, so jobs run
//! strictly one at a time in submission order. A job is a whole call (inward,
//! handler, outward and reply), which is what makes same-scope calls complete in
//! the order they were submitted.

use std::fmt;
use std::future::Future;

use acton_pattern_core::idgen::idgen;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::common::GateJob;

/// A serialization domain for calls.
#[derive(Clone)]
pub struct GateScope {
    id: String,
    queue: mpsc::UnboundedSender<GateJob>,
}

impl GateScope {
    /// Opens a scope and starts its worker. Must be called inside a Tokio runtime.
    ///
    /// The worker exits once `shutdown` is cancelled and the queue is drained.
    pub(crate) fn open(id_len: usize, shutdown: CancellationToken) -> Self {
        let (queue, inbox) = mpsc::unbounded_channel();
        let id = idgen(id_len);
        tokio::spawn(Self::wake(id.clone(), inbox, shutdown));
        trace!(gate = %id, "gate opened");
        Self { id, queue }
    }

    #[instrument(skip(inbox, shutdown))]
    async fn wake(id: String, mut inbox: mpsc::UnboundedReceiver<GateJob>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                job = inbox.recv() => match job {
                    Some(job) => {
                        trace!("gate running job");
                        job.await;
                    }
                    None => break,
                },
                () = shutdown.cancelled() => break,
            }
        }
        trace!("gate worker stopped");
    }

    /// Scope id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues `job` behind every job already in the scope.
    ///
    /// If the worker has stopped the job runs on its own task instead.
    pub(crate) fn enqueue(&self, job: GateJob) {
        if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
            trace!(gate = %self.id, "gate closed, running job unordered");
            tokio::spawn(job);
        }
    }

    /// Queues `future` and waits for its output.
    ///
    /// Returns `None` if the job was dropped without running.
    pub(crate) async fn run<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (done, result) = oneshot::channel();
        self.enqueue(
            async move {
                let _ = done.send(future.await);
            }
            .boxed(),
        );
        result.await.ok()
    }
}

impl fmt::Debug for GateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateScope").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn jobs_complete_in_submission_order() {
        let gate = GateScope::open(4, CancellationToken::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        for (i, delay) in [30u64, 20, 10, 0].into_iter().enumerate() {
            let order = Arc::clone(&order);
            gate.enqueue(
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    order.lock().push(i);
                }
                .boxed(),
            );
        }
        assert_eq!(gate.run(async { 42 }).await, Some(42));
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn stopped_gate_still_runs_jobs() {
        let shutdown = CancellationToken::new();
        let gate = GateScope::open(4, shutdown.clone());
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.run(async { "late" }).await, Some("late"));
    }
}
