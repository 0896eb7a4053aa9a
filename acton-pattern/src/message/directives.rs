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

//! Reserved `$`-suffixed message fields.
//!
//! Directives steer a single call (ids, timeouts, gating, defaults) and never take part
//! in pattern matching. They are pulled off the message at submission; only `tx$`
//! is put back on the message the handler sees.

use acton_pattern_core::pattern::Msg;
use serde_json::Value;

/// Explicit message id, `"mi"` or `"mi/tx"`.
pub const ID: &str = "id$";
/// Transaction id.
pub const TX: &str = "tx$";
/// Open a gate scope for the call's nested calls.
pub const GATE: &str = "gate$";
/// Escalate an error reply to an instance-fatal error.
pub const FATAL: &str = "fatal$";
/// Reply expectation flag.
pub const SYNC: &str = "sync$";
/// Per-call timeout in milliseconds.
pub const TIMEOUT: &str = "timeout$";
/// Result to use when nothing matches.
pub const DEFAULT: &str = "default$";
/// Custom data shared across the call tree.
pub const CUSTOM: &str = "custom$";
/// Internal: dispatch straight to this action id.
pub const PRIOR: &str = "prior$";
/// Keep the call in-process.
pub const LOCAL: &str = "local$";
/// Marks a call that arrived over a transport.
pub const REMOTE: &str = "remote$";
/// Let the call through while the instance is closing.
pub const CLOSING: &str = "closing$";
/// Collect an explain log across the call tree.
pub const EXPLAIN: &str = "explain$";

/// Directives extracted from one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    /// Message id part of `id$`.
    pub id: Option<String>,
    /// Transaction id from `tx$`, or the tx part of `id$`.
    pub tx: Option<String>,
    /// `gate$`
    pub gate: Option<bool>,
    /// `fatal$`
    pub fatal: Option<bool>,
    /// `sync$`
    pub sync: Option<bool>,
    /// `timeout$`
    pub timeout: Option<u64>,
    /// `default$`
    pub default: Option<Value>,
    /// `custom$`
    pub custom: Option<Msg>,
    /// `prior$`
    pub prior: Option<String>,
    /// `local$`
    pub local: Option<bool>,
    /// `remote$`
    pub remote: Option<bool>,
    /// `closing$`
    pub closing: bool,
    /// `explain$`
    pub explain: bool,
}

impl Directives {
    /// Removes every reserved field from `msg` and returns them parsed.
    ///
    /// Malformed directive values are dropped as if absent.
    pub fn extract(msg: &mut Msg) -> Self {
        let mut directives = Self::default();
        if let Some(id) = msg.remove(ID).and_then(text) {
            match id.split_once('/') {
                Some((mi, tx)) => {
                    directives.id = Some(mi.to_string());
                    directives.tx = Some(tx.to_string());
                }
                None => directives.id = Some(id),
            }
        }
        if let Some(tx) = msg.remove(TX).and_then(text) {
            directives.tx = Some(tx);
        }
        directives.gate = msg.remove(GATE).and_then(flag);
        directives.fatal = msg.remove(FATAL).and_then(flag);
        directives.sync = msg.remove(SYNC).and_then(flag);
        directives.local = msg.remove(LOCAL).and_then(flag);
        directives.remote = msg.remove(REMOTE).and_then(flag);
        directives.closing = msg.remove(CLOSING).and_then(flag).unwrap_or(false);
        directives.explain = msg.remove(EXPLAIN).and_then(flag).unwrap_or(false);
        directives.timeout = msg.remove(TIMEOUT).and_then(|v| match v {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        directives.default = msg.remove(DEFAULT);
        directives.custom = match msg.remove(CUSTOM) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };
        directives.prior = msg.remove(PRIOR).and_then(text);
        directives
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(value: Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extract_strips_reserved_fields_only() {
        let mut msg = json!({
            "a": 1,
            "id$": "m1/t1",
            "timeout$": 50,
            "gate$": true,
            "default$": {"ok": true},
            "custom$": {"k": "v"},
            "entity$": "keep",
        })
        .as_object()
        .cloned()
        .unwrap();
        let d = Directives::extract(&mut msg);
        assert_eq!(d.id.as_deref(), Some("m1"));
        assert_eq!(d.tx.as_deref(), Some("t1"));
        assert_eq!(d.timeout, Some(50));
        assert_eq!(d.gate, Some(true));
        assert_eq!(d.default, Some(json!({"ok": true})));
        assert_eq!(d.custom.unwrap()["k"], "v");
        assert_eq!(Value::Object(msg), json!({"a": 1, "entity$": "keep"}));
    }

    #[test]
    fn explicit_tx_wins_over_id_suffix() {
        let mut msg = json!({"id$": "m1/t1", "tx$": "t2", "timeout$": "75", "fatal$": "true"})
            .as_object()
            .cloned()
            .unwrap();
        let d = Directives::extract(&mut msg);
        assert_eq!(d.tx.as_deref(), Some("t2"));
        assert_eq!(d.timeout, Some(75));
        assert_eq!(d.fatal, Some(true));
        assert!(msg.is_empty());
    }
}
