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

use serde_json::Value;

/// Result field marking an entity-shaped result.
pub const ENTITY_MARKER: &str = "entity$";

/// Storage collaborator: reshapes results that carry the [`ENTITY_MARKER`].
pub trait EntityNormalizer: Send + Sync {
    /// Returns the normalized result.
    fn normalize(&self, result: Value) -> Value;
}

impl<F> EntityNormalizer for F
where
    F: Fn(Value) -> Value + Send + Sync,
{
    fn normalize(&self, result: Value) -> Value {
        self(result)
    }
}

/// Returns `true` if `result` is an object carrying the entity marker.
#[must_use]
pub fn is_entity(result: &Value) -> bool {
    result
        .as_object()
        .is_some_and(|map| map.contains_key(ENTITY_MARKER))
}
