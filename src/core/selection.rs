// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use log::{error, info};

use super::{
    classify::{is_remountable, wrapped_entry},
    status::RemountStatus,
};
use crate::{
    fstab::{Fstab, FstabEntry, canonical_mount_point, live_mount_point},
    services::{OverlayService, Services},
};

/// Every row of `fstab` that can be remounted directly.
pub fn select_all(fstab: &Fstab, candidates: &Fstab) -> Fstab {
    fstab
        .iter()
        .filter(|entry| is_remountable(candidates, entry))
        .cloned()
        .collect()
}

/// Row named by `partition` (mount point or basename) whose filesystem type
/// matches what is really mounted there. Stale duplicate rows are passed over.
pub fn find_partition<'a>(
    fstab: &'a Fstab,
    live: &Fstab,
    partition: &str,
) -> Option<&'a FstabEntry> {
    fstab.iter().find(|entry| {
        let mount_point = entry.system_mount_point();
        if partition != mount_point && partition != entry.partition_name() {
            return false;
        }

        live.entry_for_mount_point(live_mount_point(mount_point))
            .is_some_and(|mounted| mounted.fs_type == entry.fs_type)
    })
}

/// Resolves user arguments into table rows, stopping at the first bad one.
pub fn select_explicit(
    fstab: &Fstab,
    candidates: &Fstab,
    live: &Fstab,
    args: &[String],
    overlay: &dyn OverlayService,
) -> Result<Fstab, RemountStatus> {
    let mut partitions = Fstab::new();

    for arg in args {
        let partition = canonical_mount_point(arg);

        let Some(mut entry) = find_partition(fstab, live, partition) else {
            error!("Unknown partition {arg}");
            return Err(RemountStatus::UnknownPartition);
        };

        if let Some(wrap) = wrapped_entry(candidates, entry) {
            info!(
                "partition {arg} covered by overlayfs for {}, switching",
                wrap.mount_point
            );
            entry = wrap;
        }

        // Already remounted partitions are kept so execution can skip them quietly.
        if !overlay.already_mounted(&entry.mount_point) && !is_remountable(candidates, entry) {
            error!("Invalid partition {arg}");
            return Err(RemountStatus::InvalidPartition);
        }

        if partitions.contains_mount_point(&entry.mount_point) {
            continue;
        }
        partitions.push(entry.clone());
    }

    Ok(partitions)
}

/// Partitions to work on: all remountable ones, or exactly those named in `args`.
pub fn select(services: &Services, fstab: &Fstab, args: &[String]) -> Result<Fstab, RemountStatus> {
    let candidates = services.overlay.candidate_list(fstab);

    if args.is_empty() {
        return Ok(select_all(fstab, &candidates));
    }

    let live = services.fstab.read_live_mounts().unwrap_or_else(|e| {
        error!("Failed to read /proc/mounts: {e:#}");
        Fstab::new()
    });

    select_explicit(fstab, &candidates, &live, args, services.overlay)
}
