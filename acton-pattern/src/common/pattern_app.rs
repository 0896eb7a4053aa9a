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

use tracing::{info, trace};

use crate::common::{PatternConfig, CONFIG};
use crate::instance::{Instance, InstanceInner};
use crate::message::{ActError, ErrorCode};

/// Entry point for launching an [`Instance`].
///
/// - [`PatternApp::launch_async()`] inside an async context
/// - [`PatternApp::launch_with()`] with an explicit configuration
/// - [`PatternApp::launch()`] from synchronous code
#[derive(Default, Debug, Clone)]
pub struct PatternApp;

impl PatternApp {
    /// Launches an instance with the process-wide configuration.
    ///
    /// ```rust,ignore
    /// use acton_pattern::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let instance = PatternApp::launch_async().await?;
    ///     instance.add("role:math,cmd:sum", |ctx| ActionReply::ok(ctx, json!({"answer": 3}))).await?;
    ///     let out = instance.act("role:math,cmd:sum,left:1,right:2").await?;
    ///     instance.close().await?;
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Errors
    /// `act_internal` if the built-in actions cannot be registered.
    pub async fn launch_async() -> Result<Instance, ActError> {
        Self::launch_with(CONFIG.clone()).await
    }

    /// Launches an instance with `config`.
    ///
    /// # Errors
    /// See [`launch_async`](Self::launch_async).
    pub async fn launch_with(config: PatternConfig) -> Result<Instance, ActError> {
        trace!("Starting pattern instance initialization");
        trace!("Configuration: {:?}", config);
        let inner = InstanceInner::new(config)
            .map_err(|e| ActError::new(ErrorCode::ActInternal, format!("cannot build pipelines: {e}")))?;
        let instance = Instance::new(Arc::new(inner));
        instance.install_builtins().await?;
        info!(id = instance.id(), tag = instance.tag(), version = instance.version(), "instance started");
        Ok(instance)
    }

    /// Launches an instance from synchronous code.
    ///
    /// Returns the runtime the instance lives on; keep it alive for as long as the
    /// instance is used.
    ///
    /// # Panics
    ///
    /// Panics if called from within a Tokio runtime, or if the runtime cannot be
    /// created.
    ///
    /// # Errors
    /// See [`launch_async`](Self::launch_async).
    pub fn launch() -> Result<(tokio::runtime::Runtime, Instance), ActError> {
        assert!(
            tokio::runtime::Handle::try_current().is_err(),
            "PatternApp::launch() was called from within a Tokio runtime. \
             Use PatternApp::launch_async().await instead when in an async context."
        );
        let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime for the pattern instance");
        let instance = rt.block_on(Self::launch_async())?;
        Ok((rt, instance))
    }
}
