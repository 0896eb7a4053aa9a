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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use acton_pattern::prelude::*;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::setup::{int, launch, launch_with};

mod setup;

/// Calls the overridden action and doubles its `x`.
fn doubling(ctx: ActionContext) -> ActionFuture {
    let next = ctx.clone();
    ActionReply::respond(ctx, async move {
        let once = next.prior(next.message().clone()).await?;
        Ok::<_, ActError>(json!({ "x": once["x"].as_i64().unwrap_or_default() * 2 }))
    })
}

fn increment(ctx: ActionContext) -> ActionFuture {
    let x = int(ctx.message(), "x");
    ActionReply::ok(ctx, json!({ "x": x + 1 }))
}

#[tokio::test]
async fn test_override_reaches_prior() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance.add("a:1", increment).await?;
    instance.add("a:1", doubling).await?;

    assert_eq!(instance.act("a:1,x:1").await?, json!({"x": 4}));

    let def = instance.find("a:1").expect("a:1 is registered");
    assert!(def.prior_id().is_some());
    Ok(())
}

#[tokio::test]
async fn test_direct_prior_skips_the_full_pipeline() -> anyhow::Result<()> {
    let instance = launch_with(|config| config.prior.direct = true).await?;
    instance.add("a:1", increment).await?;
    instance.add("a:1", doubling).await?;

    assert_eq!(instance.act("a:1,x:1").await?, json!({"x": 4}));
    // Only the outer call was submitted; the prior ran in place.
    assert_eq!(instance.stats().calls, 1);
    Ok(())
}

#[tokio::test]
async fn test_indirect_prior_is_a_child_call() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance.add("a:1", increment).await?;
    instance.add("a:1", doubling).await?;

    let (result, meta) = instance.act_meta("a:1,x:1").await;
    assert_eq!(result?, json!({"x": 4}));
    assert_eq!(instance.stats().calls, 2);

    let children = meta.trace.entries();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].pattern, "a:1");
    assert_ne!(children[0].action, meta.action);
    Ok(())
}

#[tokio::test]
async fn test_prior_without_overridden_action_returns_default() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance
        .add("solo:1", |ctx| {
            let next = ctx.clone();
            ActionReply::respond(ctx, async move {
                let fallback = next.prior(json!({"solo": 1, "default$": {"fallback": true}})).await?;
                let none = next.prior("solo:1").await?;
                Ok::<_, ActError>(json!({ "fallback": fallback, "none": none }))
            })
        })
        .await?;

    assert_eq!(
        instance.act("solo:1").await?,
        json!({"fallback": {"fallback": true}, "none": null})
    );
    Ok(())
}

#[tokio::test]
async fn test_prior_outside_a_handler_fails() -> anyhow::Result<()> {
    let instance = launch().await?;
    let error = instance.prior("a:1").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::PriorInactive);
    Ok(())
}

#[tokio::test]
async fn test_prior_after_reply_fails() -> anyhow::Result<()> {
    let instance = launch().await?;
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    instance.add("a:1", increment).await?;
    instance
        .add("a:1", move |ctx| {
            let tx = Arc::clone(&tx);
            ActionReply::pending(async move {
                ctx.ok(json!({"early": true}));
                let late = ctx.prior(ctx.message().clone()).await;
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(late);
                }
            })
        })
        .await?;

    assert_eq!(instance.act("a:1,x:1").await?, json!({"early": true}));
    let late = rx.await?;
    assert_eq!(late.unwrap_err().code(), ErrorCode::PriorInactive);
    Ok(())
}

#[tokio::test]
async fn test_timeout_fires_for_silent_handler() -> anyhow::Result<()> {
    let instance = launch_with(|config| config.timeouts.action_timeout_ms = 50).await?;
    instance.add("slow:1", |_ctx| ActionReply::ready()).await?;

    let started = Instant::now();
    let error = instance.act("slow:1").await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(error.code(), ErrorCode::ActionTimeout);
    assert_eq!(error.details()["timeout"], 50);
    assert!(elapsed >= Duration::from_millis(50), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_000), "fired late: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn test_late_reply_is_discarded_after_timeout() -> anyhow::Result<()> {
    let instance = launch().await?;
    let (late_tx, late_rx) = oneshot::channel();
    let late_tx = Arc::new(Mutex::new(Some(late_tx)));
    instance
        .add("slow:1", move |ctx| {
            let late_tx = Arc::clone(&late_tx);
            ActionReply::pending(async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                let accepted = ctx.ok(json!({"late": true}));
                if let Some(tx) = late_tx.lock().take() {
                    let _ = tx.send(accepted);
                }
            })
        })
        .await?;

    let callbacks = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = oneshot::channel();
    let counter = Arc::clone(&callbacks);
    instance.submit(
        "slow:1,timeout$:20",
        Some(Box::new(move |result, _meta| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = done_tx.send(result);
            Ok(())
        })),
    );

    let first = done_rx.await?;
    assert_eq!(first.unwrap_err().code(), ErrorCode::ActionTimeout);
    assert!(!late_rx.await?, "late reply must be rejected");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_first_reply_wins() -> anyhow::Result<()> {
    let instance = launch().await?;
    let flags = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&flags);
    instance
        .add("twice:1", move |ctx| {
            let first = ctx.ok(json!({"n": 1}));
            let second = ctx.ok(json!({"n": 2}));
            *seen.lock() = Some((first, second, ctx.replied()));
            ActionReply::ready()
        })
        .await?;

    assert_eq!(instance.act("twice:1").await?, json!({"n": 1}));
    assert_eq!(*flags.lock(), Some((true, false, true)));
    Ok(())
}

#[tokio::test]
async fn test_zero_timeout_waits_for_the_reply() -> anyhow::Result<()> {
    let instance = launch_with(|config| config.timeouts.action_timeout_ms = 10).await?;
    instance
        .add("slow:1", |ctx| {
            ActionReply::pending(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                ctx.ok(json!({"done": true}));
            })
        })
        .await?;

    assert_eq!(instance.act("slow:1").await.unwrap_err().code(), ErrorCode::ActionTimeout);
    assert_eq!(instance.act("slow:1,timeout$:0").await?, json!({"done": true}));
    let patient = instance.delegate(DelegateOptions::new().timeout(0));
    assert_eq!(patient.act("slow:1").await?, json!({"done": true}));
    Ok(())
}

#[tokio::test]
async fn test_gate_completes_calls_in_submission_order() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance
        .add("step:*", |ctx| {
            let wait = u64::try_from(int(ctx.message(), "wait")).unwrap_or_default();
            let step = int(ctx.message(), "step");
            ActionReply::pending(async move {
                tokio::time::sleep(Duration::from_millis(wait)).await;
                ctx.ok(json!({ "step": step }));
            })
        })
        .await?;

    let gate = instance.gate();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));
    for (step, wait) in [(1, 40), (2, 30), (3, 20), (4, 10), (5, 0)] {
        let order = Arc::clone(&order);
        let done_tx = Arc::clone(&done_tx);
        gate.submit(
            json!({ "step": step, "wait": wait }),
            Some(Box::new(move |result, _meta| {
                let mut order = order.lock();
                order.push(result?["step"].as_i64().unwrap_or_default());
                if order.len() == 5 {
                    if let Some(tx) = done_tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
                Ok(())
            })),
        );
    }

    tokio::time::timeout(Duration::from_secs(2), done_rx).await??;
    assert_eq!(*order.lock(), vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_ungated_calls_interleave() -> anyhow::Result<()> {
    let instance = launch().await?;
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    instance
        .add("step:*", move |ctx| {
            let wait = u64::try_from(int(ctx.message(), "wait")).unwrap_or_default();
            let step = int(ctx.message(), "step");
            let seen = Arc::clone(&seen);
            ActionReply::pending(async move {
                tokio::time::sleep(Duration::from_millis(wait)).await;
                seen.lock().push(step);
                ctx.ok(json!({}));
            })
        })
        .await?;

    let slow = instance.act(json!({"step": 1, "wait": 60}));
    let fast = instance.act(json!({"step": 2, "wait": 0}));
    let (slow, fast) = tokio::join!(slow, fast);
    slow?;
    fast?;
    assert_eq!(*order.lock(), vec![2, 1]);
    Ok(())
}

#[tokio::test]
async fn test_nested_calls_from_gated_handler_do_not_deadlock() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance.add("inner:1", |ctx| ActionReply::ok(ctx, json!({"inner": true}))).await?;
    instance
        .add("outer:1", |ctx| {
            let next = ctx.clone();
            ActionReply::respond(ctx, async move {
                let inner = next.act("inner:1").await?;
                Ok::<_, ActError>(json!({ "outer": true, "inner": inner }))
            })
        })
        .await?;

    let gate = instance.gate();
    let result = tokio::time::timeout(Duration::from_secs(2), gate.act("outer:1")).await??;
    assert_eq!(result, json!({"outer": true, "inner": {"inner": true}}));

    let gated_once = tokio::time::timeout(Duration::from_secs(2), instance.act("outer:1,gate$:true")).await??;
    assert_eq!(gated_once["outer"], true);
    Ok(())
}

#[tokio::test]
async fn test_recursion_stops_at_max_parents() -> anyhow::Result<()> {
    let instance = launch_with(|config| config.limits.max_parents = 5).await?;
    let depth = Arc::new(AtomicUsize::new(0));
    let deepest = Arc::clone(&depth);
    instance
        .add("loop:1", move |ctx| {
            deepest.fetch_max(ctx.meta().depth(), Ordering::SeqCst);
            let next = ctx.clone();
            ActionReply::respond(ctx, async move { next.act(next.message().clone()).await })
        })
        .await?;

    let error = instance.act("loop:1").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::MaxParents);
    assert_eq!(error.details()["max"], 5);
    assert_eq!(depth.load(Ordering::SeqCst), 5);
    Ok(())
}

#[tokio::test]
async fn test_custom_is_shared_across_the_call_tree() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance
        .add("leaf:1", |ctx| {
            if let Some(custom) = &ctx.meta().custom {
                custom.set("leaf", json!(true));
            }
            ActionReply::ok(ctx, json!({}))
        })
        .await?;
    instance
        .add("root:1", |ctx| {
            let next = ctx.clone();
            ActionReply::respond(ctx, async move {
                next.act("leaf:1").await?;
                let custom = next.meta().custom.as_ref().map(SharedMap::snapshot).unwrap_or_default();
                Ok::<_, ActError>(Value::Object(custom))
            })
        })
        .await?;

    let result = instance.act(json!({"root": 1, "custom$": {"user": "ada"}})).await?;
    assert_eq!(result, json!({"user": "ada", "leaf": true}));
    Ok(())
}

#[tokio::test]
async fn test_child_calls_inherit_tx_and_ancestry() -> anyhow::Result<()> {
    let instance = launch().await?;
    let child_meta = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&child_meta);
    instance
        .add("child:1", move |ctx| {
            *captured.lock() = Some(Arc::clone(ctx.meta()));
            ActionReply::ok(ctx, json!({}))
        })
        .await?;
    instance
        .add("parent:1", |ctx| {
            let next = ctx.clone();
            ActionReply::respond(ctx, async move { next.act("child:1").await })
        })
        .await?;

    let (result, parent) = instance.act_meta("parent:1").await;
    result?;
    let child = child_meta.lock().clone().expect("child ran");
    assert_eq!(child.tx, parent.tx);
    assert_ne!(child.mi, parent.mi);
    assert_eq!(child.parents.len(), 1);
    assert_eq!(child.parents[0].pattern, "parent:1");
    assert_eq!(child.parents[0].id, parent.id);
    Ok(())
}

#[tokio::test]
async fn test_explain_collects_entries_across_the_tree() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance.add("leaf:1", |ctx| ActionReply::ok(ctx, json!({}))).await?;
    instance
        .add("root:1", |ctx| {
            let next = ctx.clone();
            ActionReply::respond(ctx, async move { next.act("leaf:1").await })
        })
        .await?;

    let (result, meta) = instance.act_meta("root:1,explain$:true").await;
    result?;
    let entries = meta.explain.as_ref().expect("explain was requested").entries();
    let patterns: Vec<&str> = entries.iter().filter_map(|e| e["pattern"].as_str()).collect();
    assert_eq!(patterns, vec!["leaf:1", "root:1"]);
    Ok(())
}
