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
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for an Acton Pattern instance.
///
/// Loaded from TOML in XDG-compliant directories, or built in code and handed to
/// [`PatternApp::launch_with`](crate::prelude::PatternApp::launch_with).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Strictness switches
    pub strict: StrictConfig,
    /// Prior resolution mode
    pub prior: PriorConfig,
    /// Identifier lengths
    pub ids: IdConfig,
    /// Instance identity
    pub instance: InstanceConfig,
    /// Plugin naming
    pub plugin: PluginNamingConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
    /// Behavioral configuration switches
    pub behavior: BehaviorConfig,
    /// Per-plugin option overrides, keyed by plugin fullname or short name
    pub plugins: BTreeMap<String, Value>,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default action timeout in milliseconds; `0` disables the deadline
    pub action_timeout_ms: u64,
    /// Hard deadline for a graceful close during a fatal shutdown, in milliseconds
    pub close_deadline_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum ancestor-chain length before a call stops with `maxparents`
    pub max_parents: usize,
    /// Maximum number of entries in the reply history
    pub history_capacity: usize,
    /// Lifetime of a reply history entry in milliseconds
    pub history_ttl_ms: u64,
    /// Number of recent durations kept per pattern for rolling statistics
    pub stats_window: usize,
}

/// Strictness switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictConfig {
    /// Results must be objects, arrays or null
    pub result: bool,
    /// Unmatched messages fail with `act_not_found`
    pub find: bool,
    /// Only exact canonical collisions link a prior
    pub add: bool,
}

/// Prior resolution mode
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PriorConfig {
    /// Call priors directly instead of resubmitting them through the full pipeline
    pub direct: bool,
}

/// Identifier lengths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    /// Length of generated message ids
    pub message_id_len: usize,
    /// Length of generated transaction ids
    pub tx_id_len: usize,
    /// Length of delegate discriminators
    pub delegate_id_len: usize,
}

/// Instance identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Instance tag, reported in trace descriptors
    pub tag: String,
    /// Instance version, reported in trace descriptors
    pub version: String,
}

/// Plugin naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginNamingConfig {
    /// Prefixes stripped from a plugin name to form its short name
    pub prefixes: Vec<String>,
}

/// Tracing and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Directory for log files
    pub log_directory: String,
    /// Log file name; when set, output goes to a rolling file instead of stdout
    pub log_file: Option<String>,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Raise instance-fatal errors instead of terminating the process
    pub stay_alive: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 22_222,
            close_deadline_ms: 3_333,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_parents: 33,
            history_capacity: 1_111,
            history_ttl_ms: 60_000,
            stats_window: 100,
        }
    }
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            result: true,
            find: true,
            add: false,
        }
    }
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            message_id_len: 12,
            tx_id_len: 12,
            delegate_id_len: 4,
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            tag: "-".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for PluginNamingConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["acton-pattern-".to_string(), "pattern-".to_string()],
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_directory: "~/.local/share/acton-pattern/logs".to_string(),
            log_file: None,
        }
    }
}

impl PatternConfig {
    /// Convert the close deadline to Duration
    #[must_use]
    pub const fn close_deadline(&self) -> Duration {
        Duration::from_millis(self.timeouts.close_deadline_ms)
    }

    /// Convert the history lifetime to Duration
    #[must_use]
    pub const fn history_ttl(&self) -> Duration {
        Duration::from_millis(self.limits.history_ttl_ms)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `acton-pattern/config.toml` under `$XDG_CONFIG_HOME` (or the platform
    /// fallback). A missing file yields the defaults; an unreadable or malformed file
    /// is logged and also yields the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("acton-pattern") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => match toml::from_str::<Self>(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration");
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Option overrides configured for a plugin, by fullname then short name.
    pub(crate) fn plugin_overrides(&self, fullname: &str, shortname: &str) -> (Option<&Value>, Option<&Value>) {
        (self.plugins.get(fullname), self.plugins.get(shortname))
    }
}

lazy_static! {
    /// Configuration loaded once from XDG-compliant locations
    pub static ref CONFIG: PatternConfig = PatternConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let config: PatternConfig = toml::from_str(
            r#"
            [timeouts]
            action_timeout_ms = 50

            [strict]
            find = false

            [plugins.shop]
            currency = "EUR"
            "#,
        )
        .unwrap();
        assert_eq!(config.timeouts.action_timeout_ms, 50);
        assert_eq!(config.timeouts.close_deadline_ms, 3_333);
        assert!(!config.strict.find);
        assert!(config.strict.result);
        assert_eq!(config.limits.max_parents, 33);
        assert_eq!(config.plugins["shop"]["currency"], "EUR");
    }
}
