// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use log::{error, info};

use super::status::{RemountCheckResult, RemountStatus};
use crate::{
    defs,
    fstab::{Fstab, FstabEntry},
    services::Services,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub entry: FstabEntry,
    pub status: RemountStatus,
}

/// Result of the verity/overlay stage: which partitions go on to be mounted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prepared {
    pub surviving: Fstab,
    pub dropped: Vec<Dropped>,
    pub status: RemountStatus,
    pub result: RemountCheckResult,
}

fn check_verity(
    services: &Services,
    entry: &FstabEntry,
    slot_suffix: &str,
) -> Result<RemountCheckResult, RemountStatus> {
    if !services.verity.is_enabled(entry) {
        return Ok(RemountCheckResult::default());
    }

    let disabled = services
        .verity
        .open_session()
        .and_then(|mut session| session.disable_verity(slot_suffix));
    if let Err(e) = disabled {
        error!("Failed to disable verity for {}: {e:#}", entry.mount_point);
        return Err(RemountStatus::VerityPartition);
    }

    Ok(RemountCheckResult {
        disabled_verity: true,
        reboot_later: true,
        ..Default::default()
    })
}

fn check_overlay(
    services: &Services,
    entry: &FstabEntry,
    force: bool,
) -> Result<RemountCheckResult, RemountStatus> {
    if !services.overlay.wants_overlay(entry) {
        return Ok(RemountCheckResult::default());
    }

    let mount_point = &entry.mount_point;
    match services.overlay.setup(mount_point, force) {
        Ok(setup) if setup.wants_reboot => {
            info!("Using overlayfs for {mount_point}");
            Ok(RemountCheckResult {
                reboot_later: true,
                setup_overlayfs: true,
                ..Default::default()
            })
        }
        Ok(_) => Ok(RemountCheckResult::default()),
        Err(e) => {
            error!("Overlayfs setup for {mount_point} failed, skipping: {e:#}");
            Err(RemountStatus::BadOverlay)
        }
    }
}

/// Disables verity and prepares overlays for each partition in order.
///
/// A partition that fails either step is dropped and the rest carry on; the
/// stage status is the last failure seen. Work already done is never undone.
pub fn prepare(services: &Services, partitions: Fstab) -> Prepared {
    let slot_suffix = services.props.get(defs::PROP_SLOT_SUFFIX).unwrap_or_default();
    let mut prepared = Prepared::default();

    for entry in partitions {
        let verity = match check_verity(services, &entry, &slot_suffix) {
            Ok(verity) => verity,
            Err(status) => {
                error!("Skipping verified partition {} for remount", entry.mount_point);
                prepared.result.verity_error = true;
                prepared.drop_entry(entry, status);
                continue;
            }
        };
        prepared.result.merge(verity);

        // Forcing an overlay is only safe once verity is known to be off.
        let force = prepared.result.disabled_verity;
        match check_overlay(services, &entry, force) {
            Ok(overlay) => {
                prepared.result.merge(overlay);
                prepared.surviving.push(entry);
            }
            Err(status) => prepared.drop_entry(entry, status),
        }
    }

    prepared
}

impl Prepared {
    fn drop_entry(&mut self, entry: FstabEntry, status: RemountStatus) {
        self.status = self.status.then(status);
        self.dropped.push(Dropped { entry, status });
    }
}
