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

use std::fs;
use std::path::Path;

use acton_pattern::prelude::*;
use parking_lot::{Mutex, MutexGuard};
use tempfile::TempDir;

use crate::setup::initialize_tracing;

mod setup;

// XDG_CONFIG_HOME is process-wide; tests touching it take turns.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Points XDG_CONFIG_HOME at a fresh directory, optionally holding a config file.
fn isolated(config: Option<&str>) -> anyhow::Result<(TempDir, MutexGuard<'static, ()>)> {
    initialize_tracing();
    let guard = ENV_LOCK.lock();
    let temp_dir = TempDir::new()?;
    if let Some(content) = config {
        write_config(temp_dir.path(), content)?;
    }
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    Ok((temp_dir, guard))
}

fn write_config(root: &Path, content: &str) -> anyhow::Result<()> {
    let config_dir = root.join("acton-pattern");
    fs::create_dir_all(&config_dir)?;
    fs::write(config_dir.join("config.toml"), content)?;
    Ok(())
}

/// No config file: every section keeps its defaults.
#[test]
fn test_missing_file_yields_defaults() -> anyhow::Result<()> {
    let (temp_dir, _guard) = isolated(None)?;

    let config = PatternConfig::load();
    assert_eq!(config.timeouts.action_timeout_ms, 22_222);
    assert_eq!(config.limits.max_parents, 33);
    assert!(config.strict.find);
    assert!(!config.prior.direct);
    assert!(config.plugins.is_empty());

    temp_dir.close()?;
    Ok(())
}

/// A partial file overrides only what it names.
#[test]
fn test_partial_file_overrides_named_keys() -> anyhow::Result<()> {
    let (temp_dir, _guard) = isolated(Some(
        r#"
        [timeouts]
        action_timeout_ms = 500

        [limits]
        max_parents = 8

        [prior]
        direct = true

        [instance]
        tag = "orders"

        [plugins."acton-pattern-shop$eu"]
        currency = "EUR"
        "#,
    ))?;

    let config = PatternConfig::load();
    assert_eq!(config.timeouts.action_timeout_ms, 500);
    assert_eq!(config.timeouts.close_deadline_ms, 3_333);
    assert_eq!(config.limits.max_parents, 8);
    assert_eq!(config.limits.history_capacity, 1_111);
    assert!(config.prior.direct);
    assert_eq!(config.instance.tag, "orders");
    assert_eq!(config.plugins["acton-pattern-shop$eu"], json!({"currency": "EUR"}));

    temp_dir.close()?;
    Ok(())
}

/// A malformed file is logged and ignored.
#[test]
fn test_malformed_file_falls_back_to_defaults() -> anyhow::Result<()> {
    let (temp_dir, _guard) = isolated(Some(
        r#"
        [timeouts]
        action_timeout_ms = "soon"

        [limits]
        max_parents = -1
        "#,
    ))?;

    let config = PatternConfig::load();
    assert_eq!(config.timeouts.action_timeout_ms, 22_222);
    assert_eq!(config.limits.max_parents, 33);

    temp_dir.close()?;
    Ok(())
}

/// A loaded configuration drives a launched instance.
#[tokio::test]
async fn test_loaded_configuration_applies_to_instance() -> anyhow::Result<()> {
    let (temp_dir, guard) = isolated(Some(
        r#"
        [timeouts]
        action_timeout_ms = 30

        [instance]
        tag = "loaded"

        [behavior]
        stay_alive = true
        "#,
    ))?;
    let config = PatternConfig::load();
    drop(guard);

    let instance = PatternApp::launch_with(config).await?;
    assert_eq!(instance.tag(), "loaded");
    instance.add("a:1", |_ctx| ActionReply::ready()).await?;

    let error = instance.act("a:1").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ActionTimeout);
    assert_eq!(error.details()["timeout"], 30);

    instance.close().await?;
    temp_dir.close()?;
    Ok(())
}
