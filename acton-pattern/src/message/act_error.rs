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

use acton_pattern_core::pattern::{Msg, PatternError};
use serde_json::Value;

/// Machine-readable reason attached to every [`ActError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No reply arrived before the call's deadline.
    ActionTimeout,
    /// The instance is closed.
    Closed,
    /// No pattern matched and no default was supplied.
    ActNotFound,
    /// The supplied `default$` was not an object or array.
    ActDefaultBad,
    /// The message failed action validation.
    ActInvalidMsg,
    /// The ancestor chain grew past the configured limit.
    MaxParents,
    /// An inward subscriber failed.
    SubInwardActionFailed,
    /// An outward subscriber failed.
    SubOutwardActionFailed,
    /// The caller's reply callback failed.
    ActCallback,
    /// The handler returned an error or panicked.
    ActExecute,
    /// The handler produced a scalar result while results must be objects or arrays.
    ResultNotObjarr,
    /// `prior` was called outside an active handler.
    PriorInactive,
    /// A pipeline task failed internally.
    ActInternal,
    /// A pattern or message literal could not be parsed.
    InvalidPattern,
    /// A plugin failed to load.
    PluginFailed,
    /// The instance hit an unrecoverable error.
    InstanceFatal,
}

impl ErrorCode {
    /// The wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActionTimeout => "action_timeout",
            Self::Closed => "closed",
            Self::ActNotFound => "act_not_found",
            Self::ActDefaultBad => "act_default_bad",
            Self::ActInvalidMsg => "act_invalid_msg",
            Self::MaxParents => "maxparents",
            Self::SubInwardActionFailed => "sub_inward_action_failed",
            Self::SubOutwardActionFailed => "sub_outward_action_failed",
            Self::ActCallback => "act_callback",
            Self::ActExecute => "act_execute",
            Self::ResultNotObjarr => "result_not_objarr",
            Self::PriorInactive => "prior_inactive",
            Self::ActInternal => "act_internal",
            Self::InvalidPattern => "invalid_pattern",
            Self::PluginFailed => "plugin_failed",
            Self::InstanceFatal => "instance_fatal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-visible failure: a code, a human-readable message and free-form details.
#[derive(Debug, Clone, PartialEq)]
pub struct ActError {
    code: ErrorCode,
    message: String,
    details: Msg,
}

impl ActError {
    /// Creates an error with no details.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Msg::new(),
        }
    }

    /// Shorthand for an [`ErrorCode::ActExecute`] error, the code handlers fail with.
    pub fn execute(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActExecute, message)
    }

    /// Adds a detail field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// The error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns `true` if the error carries `code`.
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Free-form details such as the pattern or the offending field.
    #[must_use]
    pub const fn details(&self) -> &Msg {
        &self.details
    }

    /// A JSON view of the error, used in log records and explain entries.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "details": self.details,
        })
    }
}

impl fmt::Display for ActError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ActError {}

impl From<anyhow::Error> for ActError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(act) => act,
            Err(other) => Self::execute(format!("{other:#}")),
        }
    }
}

impl From<PatternError> for ActError {
    fn from(error: PatternError) -> Self {
        Self::new(ErrorCode::InvalidPattern, error.to_string())
    }
}
