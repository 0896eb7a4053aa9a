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

//! Canonical message patterns.
//!
//! A [`Pattern`] is a flat set of `field:value` criteria. Its canonical form sorts the
//! fields by name and joins them as `"field:value,field:value"`, so construction order
//! never changes the key a router stores it under.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// A message: a flat JSON object of named fields.
pub type Msg = Map<String, Value>;

/// Pattern value that matches any present message value.
pub const WILDCARD: &str = "*";

/// Suffix marking reserved directive fields such as `id$` or `timeout$`.
pub const DIRECTIVE_SIGIL: char = '$';

/// Errors raised while parsing a pattern or a message literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// A `key:value` entry had no `:` separator.
    MissingSeparator(String),
    /// A `key:value` entry had an empty key.
    EmptyField(String),
    /// A JSON literal could not be parsed.
    InvalidJson(String),
    /// A JSON literal parsed, but was not an object.
    NotAnObject,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator(entry) => write!(f, "pattern entry `{entry}` has no `:` separator"),
            Self::EmptyField(entry) => write!(f, "pattern entry `{entry}` has an empty field name"),
            Self::InvalidJson(e) => write!(f, "invalid JSON pattern: {e}"),
            Self::NotAnObject => write!(f, "pattern literal must be a JSON object"),
        }
    }
}

impl std::error::Error for PatternError {}

/// Canonical flat `field:value` criteria identifying a class of messages.
///
/// Fields are kept sorted, which makes [`Pattern::canonical`] independent of the
/// order the fields were supplied in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern {
    fields: BTreeMap<String, String>,
}

/// Result of splitting a map pattern into match literals and a validation schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternParts {
    /// Scalar fields, used as match literals.
    pub pattern: Pattern,
    /// Object-valued fields, treated as validation rules for those fields.
    pub schema: Msg,
}

impl Pattern {
    /// Creates an empty (catch-all) pattern.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a single `field:value` pair.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Inserts or replaces a `field:value` pair.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Parses `"key:value,key:value"` or a JSON object literal.
    ///
    /// Object-valued fields of a JSON literal are dropped here; use
    /// [`Pattern::split_map`] to keep them as a schema.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if an entry lacks a separator or the literal is malformed.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let trimmed = source.trim();
        if trimmed.starts_with('{') {
            let msg = parse_json_object(trimmed)?;
            return Ok(Self::split_map(&msg).pattern);
        }
        let mut pattern = Self::new();
        for (key, raw) in split_entries(trimmed)? {
            if key.ends_with(DIRECTIVE_SIGIL) {
                continue;
            }
            pattern.insert(key, unquote(raw));
        }
        Ok(pattern)
    }

    /// Splits a map pattern: scalar fields become match literals, object-valued
    /// fields become a validation schema. Directive fields are ignored.
    #[must_use]
    pub fn split_map(map: &Msg) -> PatternParts {
        let mut parts = PatternParts::default();
        for (key, value) in map {
            if key.ends_with(DIRECTIVE_SIGIL) {
                continue;
            }
            match value {
                Value::Object(_) | Value::Array(_) => {
                    parts.schema.insert(key.clone(), value.clone());
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        parts.pattern.insert(key.clone(), text);
                    }
                }
            }
        }
        parts
    }

    /// Returns the canonical `"field:value,..."` form.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.fields
            .iter()
            .map(|(field, value)| format!("{field}:{value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Number of fields; the specificity of the pattern.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` for the zero-field catch-all pattern.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the value for `field`, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Iterates the fields in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if every field of this pattern is present and equal in `msg`.
    ///
    /// Wildcard fields only require the field to be present with a scalar value.
    #[must_use]
    pub fn matches(&self, msg: &Msg) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| step_matches(field, value, msg))
    }

    /// Returns `true` if `other` is a subset of this pattern.
    ///
    /// A wildcard in `other` is satisfied by any value of the same field here.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.fields.iter().all(|(field, value)| {
            self.fields
                .get(field)
                .is_some_and(|mine| value == WILDCARD || mine == value)
        })
    }

    /// Converts the pattern back into a message, reparsing each value as a scalar.
    #[must_use]
    pub fn to_msg(&self) -> Msg {
        self.fields
            .iter()
            .map(|(field, value)| (field.clone(), parse_scalar(value)))
            .collect()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&Msg> for Pattern {
    fn from(msg: &Msg) -> Self {
        Self::split_map(msg).pattern
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Returns `true` if the single `field:value` step is satisfied by `msg`.
pub(crate) fn step_matches(field: &str, value: &str, msg: &Msg) -> bool {
    match msg.get(field).and_then(scalar_text) {
        Some(present) => value == WILDCARD || present == value,
        None => false,
    }
}

/// Canonical text of a scalar message value; `None` for null, objects and arrays.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

/// Parses a bare scalar the way `"key:value"` literals are read: integers, floats,
/// booleans and `null` are typed, quoted text is unquoted, anything else is a string.
///
/// A number is only typed when it reads back as the same text, so `007` and `1.10`
/// stay strings.
#[must_use]
pub fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    let number = raw
        .parse::<i64>()
        .map(Number::from)
        .or_else(|_| raw.parse::<u64>().map(Number::from))
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(Number::from_f64));
    match number {
        Some(n) if n.to_string() == raw => Value::Number(n),
        _ => Value::String(unquote(raw)),
    }
}

/// Pattern values are kept as written, minus one pair of surrounding quotes.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(raw)
        .to_string()
}

/// Parses a message literal: `"key:value,key:value"` or a JSON object.
///
/// Unlike [`Pattern::parse`], directive fields are kept and values stay typed.
///
/// # Errors
///
/// Returns a [`PatternError`] if the literal is malformed.
pub fn parse_message(source: &str) -> Result<Msg, PatternError> {
    let trimmed = source.trim();
    if trimmed.starts_with('{') {
        return parse_json_object(trimmed);
    }
    Ok(split_entries(trimmed)?
        .into_iter()
        .map(|(key, raw)| (key.to_string(), parse_scalar(raw)))
        .collect())
}

fn parse_json_object(source: &str) -> Result<Msg, PatternError> {
    match serde_json::from_str::<Value>(source) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PatternError::NotAnObject),
        Err(e) => Err(PatternError::InvalidJson(e.to_string())),
    }
}

fn split_entries(source: &str) -> Result<Vec<(&str, &str)>, PatternError> {
    source
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| PatternError::MissingSeparator(entry.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(PatternError::EmptyField(entry.to_string()));
            }
            Ok((key, value.trim()))
        })
        .collect()
}
