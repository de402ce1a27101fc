// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Result, bail};

use crate::utils::{run_captured, stdout_string};

pub trait PropertyStore {
    /// Value of `name`, or `None` when unset or empty.
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str) -> Result<()>;

    fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .and_then(|value| parse_bool(&value))
            .unwrap_or(default)
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

/// System properties through the `getprop`/`setprop` toolbox commands.
pub struct AndroidProperties;

impl PropertyStore for AndroidProperties {
    fn get(&self, name: &str) -> Option<String> {
        let output = run_captured("getprop", &[name]).ok()?;
        let value = stdout_string(&output);
        (!value.is_empty()).then_some(value)
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let output = run_captured("setprop", &[name, value])?;
        if !output.status.success() {
            bail!(
                "setprop {name} {value} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
