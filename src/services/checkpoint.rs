// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Result, bail};

use super::CheckpointService;
use crate::utils::{run_captured, stdout_string};

/// vold's checkpoint state, queried through `service` and `vdc`.
pub struct VoldCheckpoint;

impl CheckpointService for VoldCheckpoint {
    fn is_available(&self) -> bool {
        run_captured("service", &["check", "vold"])
            .map(|output| stdout_string(&output).ends_with(": found"))
            .unwrap_or(false)
    }

    fn is_checkpointing(&self) -> Result<bool> {
        let output = run_captured("vdc", &["checkpoint", "isCheckpointing"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => bail!(
                "vdc checkpoint isCheckpointing failed ({:?}): {}",
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }
}
