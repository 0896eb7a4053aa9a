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

//! The one merge primitive every pipeline commit goes through.
//!
//! Whether already-decided values survive a merge is always passed explicitly by
//! the caller as a [`MergeMode`].

use serde_json::Value;

use crate::pattern::Msg;

/// Precedence rule for a single merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Incoming values replace existing ones.
    #[default]
    Overwrite,
    /// Existing non-null values are kept; only missing or null fields are filled.
    Preserve,
}

/// Deep-merges `patch` into `base`.
///
/// Objects merge field by field; any other pair is decided by `mode`.
pub fn merge_value(base: &mut Value, patch: Value, mode: MergeMode) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => merge_map(base, patch, mode),
        (base, patch) => {
            if mode == MergeMode::Overwrite || base.is_null() {
                *base = patch;
            }
        }
    }
}

/// Deep-merges the fields of `patch` into `base`.
pub fn merge_map(base: &mut Msg, patch: Msg, mode: MergeMode) {
    for (key, value) in patch {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, value, mode),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Returns a new map with `patch` merged over a copy of `base`.
#[must_use]
pub fn merged(base: &Msg, patch: Msg, mode: MergeMode) -> Msg {
    let mut out = base.clone();
    merge_map(&mut out, patch, mode);
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Msg {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn overwrite_replaces_decided_values_deeply() {
        let mut base = map(json!({"a": 1, "n": {"x": 1, "y": 2}}));
        merge_map(&mut base, map(json!({"a": 2, "n": {"y": 3, "z": 4}})), MergeMode::Overwrite);
        assert_eq!(Value::Object(base), json!({"a": 2, "n": {"x": 1, "y": 3, "z": 4}}));
    }

    #[test]
    fn preserve_only_fills_gaps() {
        let mut base = map(json!({"a": 1, "b": null, "n": {"x": 1}}));
        merge_map(
            &mut base,
            map(json!({"a": 2, "b": 5, "c": 6, "n": {"x": 9, "y": 2}})),
            MergeMode::Preserve,
        );
        assert_eq!(Value::Object(base), json!({"a": 1, "b": 5, "c": 6, "n": {"x": 1, "y": 2}}));
    }

    #[test]
    fn non_object_pairs_follow_mode() {
        let mut base = json!([1, 2]);
        merge_value(&mut base, json!({"a": 1}), MergeMode::Preserve);
        assert_eq!(base, json!([1, 2]));
        merge_value(&mut base, json!("x"), MergeMode::Overwrite);
        assert_eq!(base, json!("x"));
    }
}
