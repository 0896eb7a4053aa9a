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
#![allow(dead_code)]

use std::sync::Once;

use acton_pattern::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/pattern_tests.txt` so failing runs can be inspected
/// without flooding the test harness.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "pattern_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("trace")
            .add_directive("acton_pattern::instance=trace".parse().unwrap())
            .add_directive("acton_pattern::plugin=trace".parse().unwrap())
            .add_directive("acton_pattern_core::pipeline=debug".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap())
            .add_directive(tracing_subscriber::filter::LevelFilter::TRACE.into());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

/// Test configuration: defaults, but fatal errors are raised instead of exiting.
pub fn test_config() -> PatternConfig {
    let mut config = PatternConfig::default();
    config.behavior.stay_alive = true;
    config
}

/// Launches an instance with [`test_config`].
pub async fn launch() -> anyhow::Result<Instance> {
    launch_with(|_| {}).await
}

/// Launches an instance with [`test_config`] adjusted by `configure`.
pub async fn launch_with(configure: impl FnOnce(&mut PatternConfig)) -> anyhow::Result<Instance> {
    initialize_tracing();
    let mut config = test_config();
    configure(&mut config);
    Ok(PatternApp::launch_with(config).await?)
}

/// Integer field of a message or result, `0` when missing.
pub fn int(value: &Msg, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or_default()
}

/// Object fixture from `json!`.
pub fn map(value: Value) -> Msg {
    value.as_object().cloned().expect("fixture must be an object")
}
