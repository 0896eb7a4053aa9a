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

//! Tracing subscriber setup for binaries embedding an instance.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::common::TracingConfig;

/// Installs a global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.log_file` is set the
/// output goes through a non-blocking daily-rolling file writer, and the returned
/// guard must be kept alive for buffered lines to be flushed.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: &TracingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    let builder = FmtSubscriber::builder()
        .with_span_events(FmtSpan::NONE)
        .compact()
        .with_line_number(true)
        .with_target(true)
        .with_env_filter(filter);

    match &config.log_file {
        Some(file) => {
            let directory = expand_home(&config.log_directory);
            std::fs::create_dir_all(&directory)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, directory, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing::subscriber::set_global_default(builder.with_writer(writer).finish())?;
            Ok(Some(guard))
        }
        None => {
            tracing::subscriber::set_global_default(builder.finish())?;
            Ok(None)
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_prefix_is_expanded() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/logs"), PathBuf::from(home).join("logs"));
        }
        assert_eq!(expand_home("/var/log"), PathBuf::from("/var/log"));
    }
}
