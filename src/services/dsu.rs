// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};

use super::{DSU_INSTALL_OK, DsuService};
use crate::{
    defs,
    sys::props::PropertyStore,
    utils::{find_in_path, run_captured, stdout_string},
};

/// The DSU (guest system) service, driven through `gsi_tool`.
pub struct GsiTool<'a> {
    binary: PathBuf,
    props: &'a dyn PropertyStore,
}

impl<'a> GsiTool<'a> {
    /// `None` when the device has no DSU support.
    pub fn connect(props: &'a dyn PropertyStore) -> Option<Self> {
        let binary = find_in_path("gsi_tool")?;
        Some(Self { binary, props })
    }

    fn binary(&self) -> Result<&str> {
        self.binary
            .to_str()
            .context("gsi_tool path is not valid UTF-8")
    }
}

fn status_reports_enabled(status: &str) -> bool {
    status.lines().any(|line| line.trim() == "enabled")
}

impl DsuService for GsiTool<'_> {
    fn is_running(&self) -> Result<bool> {
        Ok(self.props.get_bool(defs::PROP_GSID_RUNNING, false))
    }

    fn is_enabled(&self) -> Result<bool> {
        let output = run_captured(self.binary()?, &["status"])?;
        if !output.status.success() {
            bail!(
                "gsi_tool status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(status_reports_enabled(&stdout_string(&output)))
    }

    fn active_slot(&self) -> Result<String> {
        let slot = fs::read_to_string(defs::DSU_ACTIVE_FILE)
            .with_context(|| format!("Failed to read {}", defs::DSU_ACTIVE_FILE))?;
        let slot = slot.trim();
        if slot.is_empty() {
            bail!("No active DSU slot");
        }
        Ok(slot.to_string())
    }

    fn enable(&self, one_shot: bool, slot: &str) -> Result<i32> {
        let mut args = vec!["enable"];
        if one_shot {
            args.push("--single-boot");
        }
        args.extend(["--dsuslot", slot]);

        let output = run_captured(self.binary()?, &args)?;
        match output.status.code() {
            Some(0) => Ok(DSU_INSTALL_OK),
            Some(code) => Ok(code),
            None => bail!("gsi_tool enable was killed by a signal"),
        }
    }
}
