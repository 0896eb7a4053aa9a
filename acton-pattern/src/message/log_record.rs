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

use std::fmt;

use crate::message::{ActError, Meta};

/// What a [`LogRecord`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// A handler is about to run.
    Starting,
    /// A call completed successfully.
    Finished,
    /// A call completed with an error.
    Error,
    /// A deprecated action was called.
    Deprecated,
    /// A caller's reply callback failed.
    Callback,
    /// A plugin finished loading.
    Plugin,
    /// The instance hit an unrecoverable error.
    Fatal,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Deprecated => "deprecated",
            Self::Callback => "callback",
            Self::Plugin => "plugin",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A structured log entry handed to every registered log hook.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Record kind.
    pub kind: LogKind,
    /// Canonical pattern of the action involved, if any.
    pub pattern: String,
    /// Call id, if any.
    pub id: String,
    /// Plugin fullname involved.
    pub plugin: String,
    /// Free text.
    pub message: String,
    /// The error, for error-like kinds.
    pub error: Option<ActError>,
}

impl LogRecord {
    /// A record without call context.
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: String::new(),
            id: String::new(),
            plugin: String::new(),
            message: message.into(),
            error: None,
        }
    }

    /// A record describing `meta`'s call.
    pub fn for_call(kind: LogKind, meta: &Meta, message: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: meta.pattern.clone(),
            id: meta.id.clone(),
            plugin: meta.plugin.fullname.clone(),
            message: message.into(),
            error: None,
        }
    }

    /// Attaches an error.
    #[must_use]
    pub fn with_error(mut self, error: ActError) -> Self {
        self.error = Some(error);
        self
    }
}
