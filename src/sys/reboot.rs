// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{convert::Infallible, thread, time::Duration};

use anyhow::{Context, Result, bail};

use super::props::PropertyStore;
use crate::defs;

/// Asks init to reboot and waits for it. Only returns if the reboot never came.
pub fn reboot(props: &dyn PropertyStore, reason: &str, timeout: Duration) -> Result<Infallible> {
    log::info!("Rebooting device for new settings to take effect");

    rustix::fs::sync();
    props
        .set(defs::PROP_POWERCTL, &format!("reboot,{reason}"))
        .context("Failed to request reboot")?;

    thread::sleep(timeout);
    bail!("Failed to reboot")
}
