// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use anyhow::Result;
use log::{error, info};

use super::status::{Outcome, RemountCheckResult, RemountStatus};
use crate::{
    defs,
    services::{DSU_INSTALL_OK, DsuService},
    sys::{props::PropertyStore, reboot},
};

pub fn log_summary(outcome: &Outcome) {
    let RemountCheckResult {
        disabled_verity,
        setup_overlayfs,
        ..
    } = outcome.result;

    match (disabled_verity, setup_overlayfs) {
        (true, true) => info!("Verity disabled; overlayfs enabled."),
        (true, false) => info!("Verity disabled."),
        (false, true) => info!("Overlayfs enabled."),
        (false, false) => {}
    }

    if outcome.status.is_success() {
        info!("remount succeeded");
    } else {
        error!("remount failed");
    }
}

/// Inside a DSU guest that would not survive a reboot, re-enables it for one boot.
pub fn enable_dsu_if_needed(dsu: Option<&dyn DsuService>) -> RemountStatus {
    let Some(dsu) = dsu else {
        return RemountStatus::Success;
    };

    let running = match dsu.is_running() {
        Ok(running) => running,
        Err(e) => {
            error!("Failed to get DSU running state: {e:#}");
            return RemountStatus::BinderError;
        }
    };
    let enabled = match dsu.is_enabled() {
        Ok(enabled) => enabled,
        Err(e) => {
            error!("Failed to get DSU enabled state: {e:#}");
            return RemountStatus::BinderError;
        }
    };
    if !running || enabled {
        return RemountStatus::Success;
    }

    let slot = match dsu.active_slot() {
        Ok(slot) => slot,
        Err(e) => {
            error!("Failed to get active DSU slot: {e:#}");
            return RemountStatus::BinderError;
        }
    };

    info!("DSU is running but disabled, enable DSU so that we stay within the DSU guest system after reboot");
    match dsu.enable(true, &slot) {
        Ok(DSU_INSTALL_OK) => {
            info!("Successfully enabled DSU (one-shot mode)");
            RemountStatus::Success
        }
        Ok(code) => {
            error!("Failed to enable DSU, error code: {code}");
            RemountStatus::GsidError
        }
        Err(e) => {
            error!("Failed to enable DSU: {e:#}");
            RemountStatus::BinderError
        }
    }
}

/// Reports the run and, when changes need a reboot, reboots or says so.
///
/// Returns the exit status. An error means a reboot was requested but never happened.
pub fn finalize(
    outcome: &Outcome,
    props: &dyn PropertyStore,
    dsu: Option<&dyn DsuService>,
    auto_reboot: bool,
    reboot_timeout: Duration,
) -> Result<RemountStatus> {
    log_summary(outcome);

    if !outcome.result.reboot_later {
        return Ok(outcome.status);
    }

    if auto_reboot {
        let status = enable_dsu_if_needed(dsu);
        if !status.is_success() {
            error!("Unable to automatically enable DSU");
            return Ok(status);
        }
        match reboot::reboot(props, defs::REBOOT_REASON, reboot_timeout)? {}
    }

    info!("Now reboot your device for settings to take effect");
    Ok(RemountStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FakeDsu, FakeProperties};

    fn needs_reboot(status: RemountStatus) -> Outcome {
        Outcome {
            status,
            result: RemountCheckResult {
                reboot_later: true,
                disabled_verity: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn plain_outcome_passes_through() {
        let props = FakeProperties::default();
        let status = finalize(
            &Outcome::failed(RemountStatus::RemountFailed),
            &props,
            None,
            true,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(status, RemountStatus::RemountFailed);
        assert!(props.get(defs::PROP_POWERCTL).is_none());
    }

    #[test]
    fn pending_reboot_without_auto_reboot_is_success() {
        let props = FakeProperties::default();
        let status = finalize(
            &needs_reboot(RemountStatus::VerityPartition),
            &props,
            None,
            false,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(status, RemountStatus::Success);
        assert!(props.get(defs::PROP_POWERCTL).is_none());
    }

    #[test]
    fn auto_reboot_requests_reboot() {
        let props = FakeProperties::default();
        let err = finalize(
            &needs_reboot(RemountStatus::Success),
            &props,
            None,
            true,
            Duration::ZERO,
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "Failed to reboot");
        assert_eq!(
            props.get(defs::PROP_POWERCTL).as_deref(),
            Some("reboot,remount")
        );
    }

    #[test]
    fn disabled_dsu_guest_is_reenabled_once() {
        let dsu = FakeDsu::new(true, false);
        assert_eq!(enable_dsu_if_needed(Some(&dsu)), RemountStatus::Success);
        assert_eq!(*dsu.enable_calls.borrow(), vec![(true, "dsu".to_string())]);

        let enabled = FakeDsu::new(true, true);
        assert_eq!(enable_dsu_if_needed(Some(&enabled)), RemountStatus::Success);
        assert!(enabled.enable_calls.borrow().is_empty());

        let host = FakeDsu::new(false, false);
        assert_eq!(enable_dsu_if_needed(Some(&host)), RemountStatus::Success);
        assert!(host.enable_calls.borrow().is_empty());
    }

    #[test]
    fn dsu_failures_map_to_statuses() {
        let mut rejected = FakeDsu::new(true, false);
        rejected.enable_code = 3;
        assert_eq!(enable_dsu_if_needed(Some(&rejected)), RemountStatus::GsidError);

        let mut broken = FakeDsu::new(true, false);
        broken.broken = true;
        assert_eq!(enable_dsu_if_needed(Some(&broken)), RemountStatus::BinderError);
    }

    #[test]
    fn dsu_failure_stops_the_reboot() {
        let props = FakeProperties::default();
        let mut dsu = FakeDsu::new(true, false);
        dsu.enable_code = 1;

        let status = finalize(
            &needs_reboot(RemountStatus::Success),
            &props,
            Some(&dsu),
            true,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(status, RemountStatus::GsidError);
        assert!(props.get(defs::PROP_POWERCTL).is_none());
    }
}
