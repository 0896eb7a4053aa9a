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

use serde::Serialize;

/// Name separator between a plugin name and its tag in a fullname.
pub const TAG_SEPARATOR: char = '$';

/// Identity of the plugin that registered an action or owns a delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRef {
    /// Plugin name.
    pub name: String,
    /// Plugin tag, `-` when untagged.
    pub tag: String,
    /// `name` or `name$tag`.
    pub fullname: String,
}

impl PluginRef {
    /// Creates a reference, deriving the fullname from name and tag.
    pub fn new(name: impl Into<String>, tag: Option<&str>) -> Self {
        let name = name.into();
        match tag.filter(|t| !t.is_empty() && *t != "-") {
            Some(tag) => Self {
                fullname: format!("{name}{TAG_SEPARATOR}{tag}"),
                tag: tag.to_string(),
                name,
            },
            None => Self {
                fullname: name.clone(),
                tag: "-".to_string(),
                name,
            },
        }
    }

    /// The identity of registrations made outside any plugin.
    #[must_use]
    pub fn root() -> Self {
        Self::new("root$", None)
    }

    /// The tag, unless the plugin is untagged.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        (self.tag != "-").then_some(self.tag.as_str())
    }
}

impl Default for PluginRef {
    fn default() -> Self {
        Self::root()
    }
}

/// Splits `"name$tag"` into its parts.
#[must_use]
pub fn split_fullname(fullname: &str) -> (&str, Option<&str>) {
    match fullname.split_once(TAG_SEPARATOR) {
        Some((name, tag)) if !tag.is_empty() => (name, Some(tag)),
        Some((name, _)) => (name, None),
        None => (fullname, None),
    }
}

/// Strips the first matching naming prefix from `name`.
#[must_use]
pub fn shortname(name: &str, prefixes: &[String]) -> String {
    prefixes
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix.as_str()))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullnames_include_real_tags_only() {
        assert_eq!(PluginRef::new("shop", Some("eu")).fullname, "shop$eu");
        assert_eq!(PluginRef::new("shop", Some("-")).fullname, "shop");
        assert_eq!(PluginRef::new("shop", None).tag(), None);
        assert_eq!(split_fullname("shop$eu"), ("shop", Some("eu")));
        assert_eq!(split_fullname("shop"), ("shop", None));
    }

    #[test]
    fn shortnames_drop_known_prefixes() {
        let prefixes = vec!["acton-pattern-".to_string(), "pattern-".to_string()];
        assert_eq!(shortname("acton-pattern-shop", &prefixes), "shop");
        assert_eq!(shortname("pattern-shop", &prefixes), "shop");
        assert_eq!(shortname("shop", &prefixes), "shop");
        assert_eq!(shortname("pattern-", &prefixes), "pattern-");
    }
}
