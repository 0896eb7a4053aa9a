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

use acton_pattern_core::pattern::{parse_message, Msg, Pattern};
use serde_json::Value;

use crate::message::{ActError, ErrorCode};

/// Anything that can be submitted as a message.
///
/// Strings use the `"key:value,key:value"` literal form, or JSON when they start with `{`.
pub trait IntoMessage {
    /// Converts into a message map.
    ///
    /// # Errors
    /// Fails with [`ErrorCode::ActInvalidMsg`] for non-object values and malformed literals.
    fn into_message(self) -> Result<Msg, ActError>;
}

impl IntoMessage for Msg {
    fn into_message(self) -> Result<Msg, ActError> {
        Ok(self)
    }
}

impl IntoMessage for &Msg {
    fn into_message(self) -> Result<Msg, ActError> {
        Ok(self.clone())
    }
}

impl IntoMessage for Value {
    fn into_message(self) -> Result<Msg, ActError> {
        match self {
            Self::Object(map) => Ok(map),
            other => Err(ActError::new(
                ErrorCode::ActInvalidMsg,
                format!("message must be an object, got {other}"),
            )),
        }
    }
}

impl IntoMessage for &str {
    fn into_message(self) -> Result<Msg, ActError> {
        parse_message(self).map_err(|e| ActError::new(ErrorCode::ActInvalidMsg, e.to_string()))
    }
}

impl IntoMessage for String {
    fn into_message(self) -> Result<Msg, ActError> {
        self.as_str().into_message()
    }
}

/// The pattern argument of a registration, parsed by the registration pipeline.
#[derive(Debug, Clone)]
pub enum PatternSource {
    /// `"key:value,..."` text or a JSON literal.
    Text(String),
    /// A map whose object-valued fields are a validation schema.
    Map(Msg),
    /// An already parsed pattern.
    Parsed(Pattern),
}

impl From<&str> for PatternSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for PatternSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Msg> for PatternSource {
    fn from(map: Msg) -> Self {
        Self::Map(map)
    }
}

impl From<Value> for PatternSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Map(map),
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<Pattern> for PatternSource {
    fn from(pattern: Pattern) -> Self {
        Self::Parsed(pattern)
    }
}
