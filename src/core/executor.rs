// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use log::{error, info, warn};
use nix::errno::Errno;

use super::status::{Outcome, RemountCheckResult, RemountStatus};
use crate::{
    defs,
    fstab::{Fstab, FstabEntry, canonical_mount_point, is_alias_pair, live_mount_point},
    services::Services,
    sys::block::BlockLayer,
};

/// Switches one partition to read-write against the live mount table `mounts`.
///
/// A partition with no live mount is skipped and reported as success.
pub fn remount_partition(
    fstab: &Fstab,
    mounts: &Fstab,
    entry: &FstabEntry,
    block: &dyn BlockLayer,
) -> RemountStatus {
    let mut entry = entry.clone();
    if entry.fs_mgr_flags.logical {
        match block.logical_device(&entry) {
            Some(device) => entry.blk_device = device,
            None => warn!("No device-mapper node for logical partition {}", entry.mount_point),
        }
    }

    let found = mounts.iter().rev().find_map(|mounted| {
        if mounted.mount_point == entry.mount_point {
            Some((mounted.blk_device.clone(), entry.mount_point.clone()))
        } else if is_alias_pair(&entry.mount_point, &mounted.mount_point) {
            Some((
                mounted.blk_device.clone(),
                canonical_mount_point(&entry.mount_point).to_string(),
            ))
        } else {
            None
        }
    });

    let Some((mut blk_device, mut mount_point)) = found else {
        info!(
            "skip unmounted partition dev:{} mnt:{}",
            entry.blk_device, entry.mount_point
        );
        return RemountStatus::Success;
    };

    if blk_device == defs::ROOT_PLACEHOLDER_DEVICE
        && let Some(from_fstab) = fstab.entry_for_mount_point(&mount_point)
    {
        blk_device = from_fstab.blk_device.clone();
    }

    if let Err(e) = block.set_read_only(&blk_device, false) {
        warn!("{e:#}");
    }

    // System-as-root: /system lives at / in the kernel's table.
    let live = live_mount_point(&mount_point);
    if live != mount_point
        && !mounts.contains_mount_point(&mount_point)
        && mounts.contains_mount_point(live)
    {
        mount_point = live.to_string();
    }

    let mut result = block.remount(&blk_device, &mount_point, &entry.fs_type);
    if result == Err(Errno::EINVAL) && mount_point != entry.mount_point {
        mount_point = entry.mount_point.clone();
        result = block.remount(&blk_device, &mount_point, &entry.fs_type);
    }

    match result {
        Ok(()) => RemountStatus::Success,
        Err(errno) => {
            error!("failed to remount partition dev:{blk_device} mnt:{mount_point}: {errno}");
            RemountStatus::RemountFailed
        }
    }
}

/// Mounts overlays, rereads the live table and remounts every partition.
///
/// `status` carries the verdict of earlier stages and is only replaced by a
/// later failure.
pub fn execute(
    services: &Services,
    fstab: &Fstab,
    partitions: &Fstab,
    status: RemountStatus,
) -> Outcome {
    if !services.overlay.mount_all(partitions) {
        warn!("Cannot mount overlayfs for some partitions");
    }

    let mounts = match services.fstab.read_live_mounts() {
        Ok(mounts) if !mounts.is_empty() => mounts,
        Ok(_) => {
            error!("Failed to read /proc/mounts: no mounts");
            return Outcome::failed(RemountStatus::NoMounts);
        }
        Err(e) => {
            error!("Failed to read /proc/mounts: {e:#}");
            return Outcome::failed(RemountStatus::NoMounts);
        }
    };

    let mut outcome = Outcome {
        status,
        result: RemountCheckResult::default(),
    };
    for entry in partitions {
        match remount_partition(fstab, &mounts, entry, services.block) {
            RemountStatus::Success => outcome.result.remounted_anything = true,
            failed => outcome.status = outcome.status.then(failed),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FakeBlock, FakeOverlay, FakeSystem, RemountCall, ro, table};

    #[test]
    fn system_as_root_remounts_at_root() {
        let fstab = table(&[ro("/dev/block/dm-0", "/", "erofs")]);
        let mounts = table(&[ro("/dev/root", "/", "erofs")]);
        let block = FakeBlock::default();

        let status = remount_partition(&fstab, &mounts, &fstab.entries()[0], &block);

        assert_eq!(status, RemountStatus::Success);
        assert_eq!(
            *block.remounts.borrow(),
            vec![RemountCall {
                device: "/dev/block/dm-0".to_string(),
                mount_point: "/".to_string(),
                fs_type: "erofs".to_string(),
            }]
        );
        assert_eq!(
            *block.read_only_calls.borrow(),
            vec![("/dev/block/dm-0".to_string(), false)]
        );
    }

    #[test]
    fn newest_live_mount_wins() {
        let entry = ro("/dev/block/dm-1", "/vendor", "ext4");
        let mounts = table(&[
            ro("/dev/block/dm-1", "/vendor", "ext4"),
            ro("overlay", "/vendor", "overlay"),
        ]);
        let block = FakeBlock::default();

        remount_partition(&table(&[entry.clone()]), &mounts, &entry, &block);
        assert_eq!(block.remounts.borrow()[0].device, "overlay");
    }

    #[test]
    fn unmounted_partition_is_skipped() {
        let entry = ro("/dev/block/dm-5", "/odm", "ext4");
        let mounts = table(&[ro("/dev/root", "/", "erofs")]);
        let block = FakeBlock::default();

        let status = remount_partition(&table(&[entry.clone()]), &mounts, &entry, &block);
        assert_eq!(status, RemountStatus::Success);
        assert!(block.remounts.borrow().is_empty());
    }

    #[test]
    fn invalid_argument_retries_original_mount_point() {
        let entry = ro("/dev/block/dm-0", "/", "erofs");
        let mounts = table(&[ro("/dev/block/dm-0", "/system", "erofs")]);
        let block = FakeBlock::default().failing_at("/system", Errno::EINVAL);

        let status = remount_partition(&table(&[entry.clone()]), &mounts, &entry, &block);

        assert_eq!(status, RemountStatus::Success);
        assert_eq!(block.remounted_mount_points(), vec!["/system", "/"]);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let entry = ro("/dev/block/dm-0", "/", "erofs");
        let mounts = table(&[ro("/dev/block/dm-0", "/system", "erofs")]);
        let block = FakeBlock::default().failing_at("/system", Errno::EBUSY);

        let status = remount_partition(&table(&[entry.clone()]), &mounts, &entry, &block);

        assert_eq!(status, RemountStatus::RemountFailed);
        assert_eq!(block.remounted_mount_points(), vec!["/system"]);
    }

    #[test]
    fn logical_partition_uses_mapper_device() {
        let mut entry = ro("system_b", "/product", "ext4");
        entry.fs_mgr_flags.logical = true;
        entry.logical_partition_name = "product_b".to_string();
        let mounts = table(&[ro("/dev/block/dm-7", "/product", "ext4")]);
        let block = FakeBlock::default().with_logical("product_b", "/dev/block/mapper/product_b");

        remount_partition(&table(&[entry.clone()]), &mounts, &entry, &block);
        assert_eq!(block.remounts.borrow()[0].device, "/dev/block/dm-7");
    }

    #[test]
    fn execution_keeps_going_after_a_failure() {
        let partitions = table(&[
            ro("/dev/block/dm-1", "/vendor", "ext4"),
            ro("/dev/block/dm-2", "/product", "ext4"),
        ]);
        let mut system = FakeSystem::new(partitions.clone(), partitions.clone());
        system.block = FakeBlock::default().failing_at("/vendor", Errno::EACCES);
        system.overlay = FakeOverlay::default().failing_mount_all();

        let outcome = execute(&system.services(), &partitions, &partitions, RemountStatus::Success);

        assert_eq!(outcome.status, RemountStatus::RemountFailed);
        assert!(outcome.result.remounted_anything);
        assert_eq!(system.block.remounted_mount_points(), vec!["/vendor", "/product"]);
    }

    #[test]
    fn earlier_failure_survives_clean_execution() {
        let partitions = table(&[ro("/dev/block/dm-1", "/vendor", "ext4")]);
        let system = FakeSystem::new(partitions.clone(), partitions.clone());

        let outcome = execute(
            &system.services(),
            &partitions,
            &partitions,
            RemountStatus::BadOverlay,
        );
        assert_eq!(outcome.status, RemountStatus::BadOverlay);
        assert!(outcome.result.remounted_anything);
    }

    #[test]
    fn empty_live_table_is_fatal() {
        let partitions = table(&[ro("/dev/block/dm-1", "/vendor", "ext4")]);
        let system = FakeSystem::new(partitions.clone(), Fstab::new());

        let outcome = execute(&system.services(), &partitions, &partitions, RemountStatus::Success);
        assert_eq!(outcome.status, RemountStatus::NoMounts);
        assert!(system.block.remounts.borrow().is_empty());
    }
}
