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
use std::time::Duration;

use acton_pattern::prelude::*;
use parking_lot::Mutex;

use crate::setup::{launch, launch_with, map};

mod setup;

/// A plugin written against the trait directly.
struct Counter;

#[async_trait]
impl Plugin for Counter {
    fn name(&self) -> &str {
        "acton-pattern-counter"
    }

    fn defaults(&self) -> PluginDefaults {
        PluginDefaults::Literal(map(json!({"step": 1, "label": "count"})))
    }

    async fn define(&self, instance: &Instance, options: Value) -> anyhow::Result<Option<PluginDefinition>> {
        let step = options["step"].as_i64().unwrap_or(1);
        let shared = instance.shared().expect("plugins have shared state");
        shared.set("total", json!(0));
        instance
            .add("role:counter,cmd:inc", move |ctx| {
                let shared = ctx.instance().shared().expect("actions see their plugin's state");
                let total = shared.get("total").and_then(|v| v.as_i64()).unwrap_or_default() + step;
                shared.set("total", json!(total));
                ActionReply::ok(ctx, json!({ "total": total }))
            })
            .await?;
        Ok(Some(PluginDefinition::new().export(json!({"step": step}))))
    }
}

/// Records `name` in `log` from its define step, after `delay`.
fn recording(name: &'static str, delay: u64, log: &Arc<Mutex<Vec<String>>>) -> PluginDescriptor {
    let log = Arc::clone(log);
    PluginDescriptor::new(name, move |_instance, _options| {
        let log = Arc::clone(&log);
        async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            log.lock().push(name.to_string());
            Ok::<_, anyhow::Error>(None)
        }
    })
}

#[tokio::test]
async fn test_trait_plugin_registers_actions_with_shared_state() -> anyhow::Result<()> {
    let instance = launch().await?;
    instance.use_plugin(PluginSource::of(Counter), json!({"step": 5}));
    instance.ready().await?;

    assert_eq!(instance.act("role:counter,cmd:inc").await?, json!({"total": 5}));
    assert_eq!(instance.act("role:counter,cmd:inc").await?, json!({"total": 10}));

    let counter = instance.plugin("acton-pattern-counter").expect("counter is loaded");
    assert_eq!(counter.shortname, "counter");
    assert_eq!(counter.options, json!({"step": 5, "label": "count"}));
    assert_eq!(counter.shared.get("total"), Some(json!(10)));
    assert_eq!(instance.export("acton-pattern-counter"), Some(json!({"step": 5})));

    let def = instance.find("role:counter,cmd:inc").expect("registered");
    assert_eq!(def.plugin().fullname, "acton-pattern-counter");
    Ok(())
}

#[tokio::test]
async fn test_plugins_load_one_at_a_time_in_order() -> anyhow::Result<()> {
    let instance = launch().await?;
    let log = Arc::new(Mutex::new(Vec::new()));
    instance
        .use_plugin(recording("first", 40, &log), json!({}))
        .use_plugin(recording("second", 20, &log), json!({}))
        .use_plugin(recording("third", 0, &log), json!({}));
    instance.ready().await?;

    assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    let names: Vec<String> = instance.plugins().iter().map(|p| p.fullname.clone()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    Ok(())
}

#[tokio::test]
async fn test_plugin_used_during_define_loads_after_it() -> anyhow::Result<()> {
    let instance = launch().await?;
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = recording("inner", 0, &log);
    let outer_log = Arc::clone(&log);
    let outer = PluginDescriptor::new("outer", move |instance: Instance, _options| {
        let inner = inner.clone();
        let log = Arc::clone(&outer_log);
        async move {
            instance.use_plugin(inner, json!({}));
            tokio::time::sleep(Duration::from_millis(20)).await;
            log.lock().push("outer".to_string());
            Ok::<_, anyhow::Error>(None)
        }
    });

    instance.use_plugin(outer, json!({}));
    // The first wait covers `outer`; `inner` was queued while it loaded.
    instance.ready().await?;
    instance.ready().await?;
    assert_eq!(*log.lock(), vec!["outer", "inner"]);
    Ok(())
}

#[tokio::test]
async fn test_option_precedence() -> anyhow::Result<()> {
    let instance = launch_with(|config| {
        config
            .plugins
            .insert("shop".to_string(), json!({"currency": "GBP", "limit": 5}));
        config
            .plugins
            .insert("acton-pattern-shop$eu".to_string(), json!({"currency": "EUR"}));
    })
    .await?;
    let seen = Arc::new(Mutex::new(Value::Null));
    let sink = Arc::clone(&seen);
    let shop = PluginDescriptor::new("acton-pattern-shop", move |_instance, options| {
        *sink.lock() = options;
        async { Ok::<_, anyhow::Error>(None) }
    })
    .with_tag("eu")
    .with_defaults(PluginDefaults::Literal(map(json!({
        "currency": "NONE",
        "limit": 0,
        "region": "",
    }))));

    instance.use_plugin(shop, json!({"currency": "USD", "limit": 1, "region": "west"}));
    instance.ready().await?;

    let expected = json!({"currency": "EUR", "limit": 5, "region": "west"});
    assert_eq!(*seen.lock(), expected);
    let loaded = instance.plugin("acton-pattern-shop$eu").expect("shop is loaded");
    assert_eq!(loaded.tag, "eu");
    assert_eq!(loaded.options, expected);
    Ok(())
}

#[tokio::test]
async fn test_computed_defaults_see_the_plugin_identity() -> anyhow::Result<()> {
    let instance = launch().await?;
    let seen = Arc::new(Mutex::new(Value::Null));
    let sink = Arc::clone(&seen);
    let plugin = PluginDescriptor::new("mailer", move |_instance, options| {
        *sink.lock() = options;
        async { Ok::<_, anyhow::Error>(None) }
    })
    .with_defaults(PluginDefaults::Builder(|helpers| {
        let mut defaults = Msg::new();
        defaults.insert("from".to_string(), json!(format!("{}@localhost", helpers.name())));
        defaults.insert("retries".to_string(), json!(helpers.config().limits.max_parents));
        defaults
    }));

    instance.use_plugin(plugin, json!({}));
    instance.ready().await?;
    assert_eq!(*seen.lock(), json!({"from": "mailer@localhost", "retries": 33}));
    Ok(())
}

#[tokio::test]
async fn test_bad_options_are_fatal() -> anyhow::Result<()> {
    let instance = launch().await?;
    let plugin = PluginDescriptor::new("strict", |_instance, _options| async { Ok::<_, anyhow::Error>(None) })
        .with_defaults(PluginDefaults::Literal(map(json!({"limit": 1}))));

    instance.use_plugin(plugin, json!({"limit": "many"}));
    let error = instance.ready().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InstanceFatal);
    assert_eq!(error.details()["cause"]["code"], "plugin_failed");
    assert!(instance.plugin("strict").is_none());
    Ok(())
}

#[tokio::test]
async fn test_failing_define_is_fatal_but_later_plugins_still_load() -> anyhow::Result<()> {
    let instance = launch().await?;
    let fatal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fatal);
    instance.on_fatal(Arc::new(move |error: &ActError| sink.lock().push(error.clone())));
    let log = Arc::new(Mutex::new(Vec::new()));
    let broken = PluginDescriptor::new("broken", |_instance, _options| async {
        Err::<Option<PluginDefinition>, _>(anyhow::anyhow!("database unreachable"))
    });

    instance
        .use_plugin(broken, json!({}))
        .use_plugin(recording("healthy", 0, &log), json!({}));
    let error = instance.ready().await.unwrap_err();

    assert!(error.message().contains("database unreachable"));
    assert_eq!(fatal.lock().len(), 1);
    assert_eq!(*log.lock(), vec!["healthy"]);
    assert!(instance.plugin("healthy").is_some());
    Ok(())
}

#[tokio::test]
async fn test_preload_and_define_rename_the_plugin() -> anyhow::Result<()> {
    let instance = launch().await?;
    let renamed = PluginDescriptor::new("draft", |instance: Instance, _options| async move {
        assert_eq!(instance.plugin_ref().fullname, "store");
        instance
            .add("role:store,cmd:get", |ctx| {
                let owner = ctx.instance().plugin_ref().fullname;
                ActionReply::ok(ctx, json!({ "owner": owner }))
            })
            .await?;
        Ok::<_, anyhow::Error>(Some(PluginDefinition::new().name("store").tag("v2")))
    })
    .with_preload(|ctx| {
        assert_eq!(ctx.name, "draft");
        Some(Preload::new().name("store"))
    });

    instance.use_plugin(renamed, json!({}));
    instance.ready().await?;

    assert!(instance.plugin("draft").is_none());
    assert!(instance.plugin("store$v2").is_some());
    let def = instance.find("role:store,cmd:get").expect("registered");
    assert_eq!(def.plugin().fullname, "store$v2");
    assert_eq!(instance.act("role:store,cmd:get").await?, json!({"owner": "store$v2"}));
    Ok(())
}

#[tokio::test]
async fn test_init_action_runs_unless_disabled() -> anyhow::Result<()> {
    fn with_init(name: &'static str, inits: &Arc<Mutex<Vec<String>>>) -> PluginDescriptor {
        let inits = Arc::clone(inits);
        PluginDescriptor::new(name, move |instance: Instance, _options| {
            let inits = Arc::clone(&inits);
            async move {
                instance
                    .add(format!("init:{name}"), move |ctx| {
                        inits.lock().push(name.to_string());
                        ActionReply::ok(ctx, json!({}))
                    })
                    .await?;
                Ok::<_, anyhow::Error>(None)
            }
        })
    }

    let instance = launch().await?;
    let inits = Arc::new(Mutex::new(Vec::new()));
    instance
        .use_plugin(with_init("cache", &inits), json!({}))
        .use_plugin(with_init("queue", &inits), json!({ "init$": false }));
    instance.ready().await?;

    assert_eq!(*inits.lock(), vec!["cache"]);
    assert!(instance.plugin("queue").is_some());
    Ok(())
}

#[tokio::test]
async fn test_failing_init_is_fatal() -> anyhow::Result<()> {
    let instance = launch().await?;
    let plugin = PluginDescriptor::new("db", |instance: Instance, _options| async move {
        instance
            .add("init:db", |ctx| ActionReply::fail(ctx, ActError::execute("no connection")))
            .await?;
        Ok::<_, anyhow::Error>(None)
    });

    instance.use_plugin(plugin, json!({}));
    let error = instance.ready().await.unwrap_err();
    assert_eq!(error.details()["cause"]["code"], "plugin_failed");
    assert!(error.message().contains("no connection"));
    Ok(())
}

#[tokio::test]
async fn test_exports_are_keyed_by_name_fullname_and_key() -> anyhow::Result<()> {
    let instance = launch().await?;
    let plugin = PluginDescriptor::new("store", |_instance, _options| async {
        Ok::<_, anyhow::Error>(Some(
            PluginDefinition::new()
                .export(json!({"driver": "mem"}))
                .export_key("limits", json!({"max": 10})),
        ))
    })
    .with_tag("t1");

    instance.use_plugin(plugin, json!({}));
    instance.ready().await?;

    assert_eq!(instance.export("store"), Some(json!({"driver": "mem"})));
    assert_eq!(instance.export("store$t1"), Some(json!({"driver": "mem"})));
    assert_eq!(instance.export("store/limits"), Some(json!({"max": 10})));
    assert_eq!(instance.export("store/other"), None);
    Ok(())
}

#[tokio::test]
async fn test_plugin_extensions_apply_to_later_calls() -> anyhow::Result<()> {
    let instance = launch().await?;
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let audit = PluginDescriptor::new("audit", move |_instance, _options| {
        let sink = Arc::clone(&sink);
        async move {
            let logger = Arc::new(move |record: &LogRecord| {
                if record.kind == LogKind::Finished {
                    sink.lock().push(record.pattern.clone());
                }
            });
            let redact = Task::sync("redact", |_: &Instance, data: &CallData| {
                if !data.msg.contains_key("password") {
                    return Ok(Operation::Continue);
                }
                let mut msg = Msg::new();
                msg.insert("password".to_string(), json!("***"));
                Ok(Operation::merge(CallPatch::with_message(msg)))
            });
            Ok::<_, anyhow::Error>(Some(
                PluginDefinition::new().extend(
                    Extension::new()
                        .inward(Placement::After("fields".to_string()), redact)
                        .logger(logger),
                ),
            ))
        }
    });

    instance.use_plugin(audit, json!({}));
    instance.ready().await?;
    instance
        .add("role:user,cmd:login", |ctx| {
            let password = ctx.field("password").cloned().unwrap_or(Value::Null);
            ActionReply::ok(ctx, json!({ "password": password }))
        })
        .await?;

    assert_eq!(
        instance.act("role:user,cmd:login,password:hunter2").await?,
        json!({"password": "***"})
    );
    assert!(records.lock().contains(&"cmd:login,role:user".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_named_plugins_resolve_through_the_catalog() -> anyhow::Result<()> {
    let instance = launch().await?;
    let log = Arc::new(Mutex::new(Vec::new()));
    instance.register_plugin(Arc::new(recording("metrics", 0, &log)));

    instance.use_plugin("metrics$prod", json!({}));
    instance.ready().await?;
    assert!(instance.plugin("metrics$prod").is_some());

    instance.use_plugin("missing", json!({}));
    let error = instance.ready().await.unwrap_err();
    assert!(error.message().contains("missing"));
    Ok(())
}

#[tokio::test]
async fn test_plugin_options_must_be_an_object() -> anyhow::Result<()> {
    let instance = launch().await?;
    let log = Arc::new(Mutex::new(Vec::new()));
    instance.use_plugin(recording("picky", 0, &log), json!([1, 2]));
    let error = instance.ready().await.unwrap_err();
    assert_eq!(error.details()["cause"]["code"], "plugin_failed");
    assert!(log.lock().is_empty());
    Ok(())
}
