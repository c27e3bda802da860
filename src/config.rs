// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving helper settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::discovery::DEFAULT_DISCOVERY_TIMEOUT_SECS;
use crate::pairing::DEFAULT_PAIRING_TIMEOUT_SECS;

/// Helper configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adapter power settings.
    pub adapter: AdapterConfig,

    /// Pairing settings.
    pub pairing: PairingConfig,

    /// Discovery settings.
    pub discovery: DiscoveryConfig,

    /// BlueZ backend settings.
    pub bluez: BluezConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Restart an adapter that is already on before pairing or scanning.
    pub power_cycle: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self { power_cycle: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds without progress before pairing is abandoned.
    pub timeout_secs: u64,

    /// Fail when the device reports "not bonded" before any progress.
    pub strict_not_done: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_PAIRING_TIMEOUT_SECS,
            strict_not_done: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Seconds to scan once discovery started.
    pub timeout_secs: u64,

    /// Only keep devices whose name starts with this.
    pub name_prefix: Option<String>,

    /// Only keep devices above this normalized signal (0..100).
    pub min_signal: Option<i32>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            name_prefix: None,
            min_signal: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluezConfig {
    /// Length of one scan cycle in seconds.
    pub scan_window_secs: u64,
}

impl Default for BluezConfig {
    fn default() -> Self {
        Self {
            scan_window_secs: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate's log output ("error" through "trace").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bluetooth-helper")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
