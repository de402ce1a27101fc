// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{defs, sys::retry::RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceRetryConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 0 keeps retrying forever.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    2000
}

impl Default for ServiceRetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: 0,
        }
    }
}

impl ServiceRetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let max_attempts = (self.max_attempts > 0).then_some(self.max_attempts);
        RetryPolicy::new(Duration::from_millis(self.interval_ms), max_attempts)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstab: Option<PathBuf>,
    #[serde(default)]
    pub auto_reboot: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_overlay_dir")]
    pub overlay_dir: PathBuf,
    #[serde(default = "default_by_name_dir")]
    pub by_name_dir: PathBuf,
    #[serde(default = "default_reboot_timeout_secs")]
    pub reboot_timeout_secs: u64,
    #[serde(default)]
    pub service_retry: ServiceRetryConfig,
}

fn default_overlay_dir() -> PathBuf {
    PathBuf::from(defs::OVERLAY_DIR)
}

fn default_by_name_dir() -> PathBuf {
    PathBuf::from(defs::BY_NAME_DIR)
}

fn default_reboot_timeout_secs() -> u64 {
    defs::DEFAULT_REBOOT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fstab: None,
            auto_reboot: false,
            verbose: false,
            overlay_dir: default_overlay_dir(),
            by_name_dir: default_by_name_dir(),
            reboot_timeout_secs: default_reboot_timeout_secs(),
            service_retry: ServiceRetryConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;

        let config: Config = toml::from_str(&content).context("failed to parse config file")?;

        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(defs::CONFIG_FILE)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }

        fs::write(path.as_ref(), content).context("failed to write config file")?;

        Ok(())
    }

    /// Command-line switches only ever turn things on; a given fstab replaces the file's.
    pub fn merge_with_cli(&mut self, fstab: Option<PathBuf>, auto_reboot: bool, verbose: bool) {
        if let Some(path) = fstab {
            self.fstab = Some(path);
        }

        self.auto_reboot |= auto_reboot;
        self.verbose |= verbose;
    }

    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.reboot_timeout_secs)
    }
}
