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

use std::collections::BTreeMap;
use std::fmt;

use acton_pattern_core::pattern::Msg;
use serde_json::Value;

/// Validates (and may normalize) a message before its handler runs.
pub trait MessageValidator: Send + Sync {
    /// Returns the message to hand to the action, or a reason for rejecting it.
    ///
    /// # Errors
    /// A human-readable description of the first problem found.
    fn validate(&self, msg: Msg) -> Result<Msg, String>;
}

impl<F> MessageValidator for F
where
    F: Fn(Msg) -> Result<Msg, String> + Send + Sync,
{
    fn validate(&self, msg: Msg) -> Result<Msg, String> {
        self(msg)
    }
}

/// JSON kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Any value.
    Any,
    /// `null`
    Null,
    /// `true` or `false`
    Boolean,
    /// A whole number.
    Integer,
    /// Any number.
    Number,
    /// A string.
    String,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl ValueKind {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "any" => Self::Any,
            "null" => Self::Null,
            "boolean" | "bool" => Self::Boolean,
            "integer" | "int" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        })
    }

    /// The kind of a concrete value; integers report as [`ValueKind::Integer`].
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Returns `true` if `value` satisfies this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, Self::of(value)) {
            (Self::Any, _) | (Self::Number, Self::Integer) => true,
            (expected, actual) => expected == actual,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Constraints on one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRule {
    kind: Option<ValueKind>,
    required: bool,
    default: Option<Value>,
    one_of: Option<Vec<Value>>,
}

impl FieldRule {
    /// A rule requiring `kind`.
    #[must_use]
    pub fn kind(kind: ValueKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Fills the field with `value` when it is missing.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Reads `{"type": "...", "required": bool, "default": ...}` or an array of
    /// allowed values.
    fn from_value(field: &str, spec: &Value) -> Result<Self, String> {
        match spec {
            Value::Array(allowed) => Ok(Self {
                one_of: Some(allowed.clone()),
                ..Self::default()
            }),
            Value::Object(spec) => {
                let kind = match spec.get("type") {
                    Some(Value::String(name)) => Some(
                        ValueKind::parse(name)
                            .ok_or_else(|| format!("field `{field}` has unknown type `{name}`"))?,
                    ),
                    Some(other) => return Err(format!("field `{field}` has invalid type {other}")),
                    None => None,
                };
                Ok(Self {
                    kind,
                    required: spec.get("required").and_then(Value::as_bool).unwrap_or(false),
                    default: spec.get("default").cloned(),
                    one_of: spec.get("enum").and_then(Value::as_array).cloned(),
                })
            }
            other => Err(format!("field `{field}` has invalid rule {other}")),
        }
    }

    fn check(&self, field: &str, value: &Value) -> Result<(), String> {
        if let Some(kind) = self.kind {
            if !kind.accepts(value) {
                return Err(format!(
                    "field `{field}` must be {kind}, got {}",
                    ValueKind::of(value)
                ));
            }
        }
        if let Some(allowed) = &self.one_of {
            if !allowed.contains(value) {
                return Err(format!("field `{field}` must be one of {}", Value::Array(allowed.clone())));
            }
        }
        Ok(())
    }
}

/// A small built-in validator: per-field kind, presence, default and allowed values.
///
/// Built from the object-valued fields of a map pattern, e.g.
/// `{"role": "user", "name": {"type": "string", "required": true}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    rules: BTreeMap<String, FieldRule>,
}

impl Schema {
    /// An empty schema that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for `field`.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    /// Builds a schema from `field -> rule` JSON.
    ///
    /// # Errors
    /// Fails on unknown type names and rules that are neither objects nor arrays.
    pub fn from_map(spec: &Msg) -> Result<Self, String> {
        let rules = spec
            .iter()
            .map(|(field, rule)| Ok((field.clone(), FieldRule::from_value(field, rule)?)))
            .collect::<Result<_, String>>()?;
        Ok(Self { rules })
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl MessageValidator for Schema {
    fn validate(&self, mut msg: Msg) -> Result<Msg, String> {
        for (field, rule) in &self.rules {
            match msg.get(field) {
                Some(value) => rule.check(field, value)?,
                None => match &rule.default {
                    Some(default) => {
                        msg.insert(field.clone(), default.clone());
                    }
                    None if rule.required => return Err(format!("field `{field}` is required")),
                    None => {}
                },
            }
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Msg {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn schema_checks_kind_presence_and_defaults() {
        let schema = Schema::from_map(&map(json!({
            "name": {"type": "string", "required": true},
            "size": {"type": "integer", "default": 1},
            "mode": ["fast", "slow"],
        })))
        .unwrap();

        let ok = schema.validate(map(json!({"name": "x"}))).unwrap();
        assert_eq!(ok["size"], 1);

        assert_eq!(
            schema.validate(map(json!({}))).unwrap_err(),
            "field `name` is required"
        );
        assert!(schema
            .validate(map(json!({"name": 3})))
            .unwrap_err()
            .contains("must be string"));
        assert!(schema
            .validate(map(json!({"name": "x", "mode": "medium"})))
            .unwrap_err()
            .contains("one of"));
    }

    #[test]
    fn unknown_types_are_rejected_at_build_time() {
        assert!(Schema::from_map(&map(json!({"a": {"type": "date"}}))).is_err());
        assert!(Schema::from_map(&map(json!({"a": 3}))).is_err());
    }

    #[test]
    fn number_accepts_integers() {
        assert!(ValueKind::Number.accepts(&json!(3)));
        assert!(!ValueKind::Integer.accepts(&json!(3.5)));
    }
}
