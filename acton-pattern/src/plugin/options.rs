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

//! Plugin option resolution.
//!
//! Options are layered, later layers winning: declared defaults, the options
//! passed to `use_plugin`, configured options under the short name, configured
//! options under the fullname. The result must keep the JSON kind of every
//! non-null default.

use acton_pattern_core::merge::{merge_map, MergeMode};
use acton_pattern_core::pattern::Msg;
use serde_json::Value;

use crate::common::PatternConfig;
use crate::message::{ActError, ErrorCode};
use crate::traits::ValueKind;

fn object(msg: &Msg, key: &str) -> Result<Msg, ActError> {
    match msg.get(key) {
        None | Some(Value::Null) => Ok(Msg::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(ActError::new(
            ErrorCode::PluginFailed,
            format!("plugin {key} must be an object, got {other}"),
        )),
    }
}

fn text<'a>(msg: &'a Msg, key: &str) -> &'a str {
    msg.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Resolves the options described by a `sys:plugin,cmd:define` message.
///
/// # Errors
/// `plugin_failed` if a layer is not an object or an option has the wrong kind.
pub fn resolve(config: &PatternConfig, msg: &Msg) -> Result<Value, ActError> {
    let fullname = text(msg, "fullname");
    let shortname = text(msg, "shortname");
    let defaults = object(msg, "defaults")?;
    let mut options = defaults.clone();
    merge_map(&mut options, object(msg, "options")?, MergeMode::Overwrite);

    let (by_fullname, by_shortname) = config.plugin_overrides(fullname, shortname);
    for layer in [by_shortname, by_fullname].into_iter().flatten() {
        match layer {
            Value::Object(map) => merge_map(&mut options, map.clone(), MergeMode::Overwrite),
            other => {
                return Err(ActError::new(
                    ErrorCode::PluginFailed,
                    format!("configured options for {fullname} must be a table, got {other}"),
                ))
            }
        }
    }

    check_shape(&defaults, &options).map_err(|reason| {
        ActError::new(ErrorCode::PluginFailed, format!("invalid options for plugin {fullname}: {reason}"))
            .with("plugin", fullname)
    })?;
    Ok(Value::Object(options))
}

fn check_shape(defaults: &Msg, options: &Msg) -> Result<(), String> {
    for (key, default) in defaults.iter().filter(|(_, v)| !v.is_null()) {
        let Some(value) = options.get(key) else {
            continue;
        };
        let expected = ValueKind::of(default);
        let expected = if expected == ValueKind::Integer { ValueKind::Number } else { expected };
        if !expected.accepts(value) {
            return Err(format!("option {key} must be {expected}, got {}", ValueKind::of(value)));
        }
        if let (Value::Object(inner_defaults), Value::Object(inner)) = (default, value) {
            check_shape(inner_defaults, inner).map_err(|reason| format!("{key}.{reason}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn define(options: Value, defaults: Value) -> Msg {
        json!({
            "sys": "plugin",
            "cmd": "define",
            "name": "acton-pattern-shop",
            "fullname": "acton-pattern-shop$eu",
            "shortname": "shop",
            "options": options,
            "defaults": defaults,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn fullname_beats_shortname_beats_literal_beats_defaults() {
        let mut config = PatternConfig::default();
        config.plugins.insert("shop".into(), json!({"currency": "GBP", "limit": 5}));
        config.plugins.insert("acton-pattern-shop$eu".into(), json!({"currency": "EUR"}));
        let resolved = resolve(
            &config,
            &define(
                json!({"currency": "USD", "limit": 1, "region": "x"}),
                json!({"currency": "NONE", "limit": 0, "region": "", "deep": {"a": 1}}),
            ),
        )
        .unwrap();
        assert_eq!(
            resolved,
            json!({"currency": "EUR", "limit": 5, "region": "x", "deep": {"a": 1}})
        );
    }

    #[test]
    fn options_must_keep_the_default_kinds() {
        let config = PatternConfig::default();
        let error = resolve(&config, &define(json!({"limit": "many"}), json!({"limit": 1}))).unwrap_err();
        assert!(error.is(ErrorCode::PluginFailed));
        assert!(error.message().contains("limit"));

        let fine = resolve(&config, &define(json!({"limit": 2.5, "free": [1]}), json!({"limit": 1, "free": null})));
        assert!(fine.is_ok());
    }
}
