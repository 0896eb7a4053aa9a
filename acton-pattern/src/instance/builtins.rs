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

//! Actions every instance registers at launch.

use acton_pattern_core::pattern::{parse_message, Msg};
use serde_json::json;
use tracing::info;

use crate::common::ActionReply;
use crate::instance::Instance;
use crate::message::ActError;
use crate::plugin::options;

/// Run by [`Instance::close`]; override it to release resources, then call `prior`.
pub const CLOSE_PATTERN: &str = "sys:instance,cmd:close";

/// Resolves a plugin's options during loading; override it to change how options
/// are resolved.
pub const DEFINE_PATTERN: &str = "sys:plugin,cmd:define";

pub(crate) fn close_message() -> Msg {
    parse_message(CLOSE_PATTERN).unwrap_or_default()
}

pub(crate) fn define_message() -> Msg {
    parse_message(DEFINE_PATTERN).unwrap_or_default()
}

impl Instance {
    pub(crate) async fn install_builtins(&self) -> Result<(), ActError> {
        self.add(CLOSE_PATTERN, |ctx| {
            info!(instance = ctx.instance().id(), "running close action");
            ActionReply::ok(ctx, json!({"closed": true}))
        })
        .await?;
        self.add(DEFINE_PATTERN, |ctx| {
            match options::resolve(ctx.instance().config(), ctx.message()) {
                Ok(resolved) => ActionReply::ok(ctx, resolved),
                Err(error) => ActionReply::fail(ctx, error),
            }
        })
        .await?;
        Ok(())
    }
}
