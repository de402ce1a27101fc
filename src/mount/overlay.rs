// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    ffi::CString,
    fs::{self, File},
    os::{
        fd::{AsRawFd, OwnedFd},
        unix::fs::FileExt,
    },
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use log::{info, warn};
use rustix::{fd::AsFd, fs::CWD, mount::*};

use crate::{
    defs,
    fstab::{Fstab, FstabEntry, canonical_mount_point},
    services::{OverlaySetup, OverlayService, VerityService},
    sys::mount::{mounted_fs_type, sub_mounts},
    utils::{copy_path_context, ensure_dir_exists},
};

const MOUNT_POINT_MARKER: &str = "mount_point";
const EXT4_SUPERBLOCK_OFFSET: u64 = 1024;
const EXT4_MAGIC: u16 = 0xEF53;
const EXT4_RO_COMPAT_SHARED_BLOCKS: u32 = 0x4000;

/// Writable overlays over read-only partitions, backed by directories under
/// `overlay_dir/<name>/{upper,work}`.
pub struct OverlayFs<'a> {
    overlay_dir: PathBuf,
    verity: &'a dyn VerityService,
}

impl<'a> OverlayFs<'a> {
    pub fn new(overlay_dir: impl AsRef<Path>, verity: &'a dyn VerityService) -> Self {
        Self {
            overlay_dir: overlay_dir.as_ref().to_path_buf(),
            verity,
        }
    }

    fn overlay_root(&self, mount_point: &str) -> PathBuf {
        let name = canonical_mount_point(mount_point)
            .trim_start_matches('/')
            .replace('/', "-");
        self.overlay_dir.join(name)
    }
}

fn ext4_has_shared_blocks(device: &str) -> bool {
    if !device.starts_with('/') {
        return false;
    }
    let Ok(file) = File::open(device) else {
        return false;
    };

    let mut superblock = [0u8; 0x68];
    if file
        .read_exact_at(&mut superblock, EXT4_SUPERBLOCK_OFFSET)
        .is_err()
    {
        return false;
    }

    let magic = u16::from_le_bytes([superblock[0x38], superblock[0x39]]);
    let ro_compat = u32::from_le_bytes([
        superblock[0x64],
        superblock[0x65],
        superblock[0x66],
        superblock[0x67],
    ]);
    magic == EXT4_MAGIC && ro_compat & EXT4_RO_COMPAT_SHARED_BLOCKS != 0
}

fn has_no_free_space(mount_point: &str) -> bool {
    rustix::fs::statvfs(canonical_mount_point(mount_point))
        .map(|stat| stat.f_bfree == 0)
        .unwrap_or(false)
}

impl OverlayService for OverlayFs<'_> {
    fn candidate_list(&self, fstab: &Fstab) -> Fstab {
        let mut candidates = Fstab::new();
        for entry in fstab {
            if self.wants_overlay(entry) && !candidates.contains_mount_point(&entry.mount_point) {
                candidates.push(entry.clone());
            }
        }
        candidates
    }

    fn wants_overlay(&self, entry: &FstabEntry) -> bool {
        let flags = &entry.fs_mgr_flags;
        if flags.vold_managed || flags.recovery_only || flags.slot_select_other {
            return false;
        }
        if !entry.is_read_only() || entry.flags.contains(nix::mount::MsFlags::MS_NOEXEC) {
            return false;
        }

        match entry.fs_type.as_str() {
            "erofs" | "squashfs" => true,
            "ext4" => {
                ext4_has_shared_blocks(&entry.blk_device) || has_no_free_space(&entry.mount_point)
            }
            defs::REMOVABLE_FS_TYPE => false,
            _ => has_no_free_space(&entry.mount_point),
        }
    }

    fn setup(&self, mount_point: &str, force: bool) -> Result<OverlaySetup> {
        if self.already_mounted(mount_point) {
            info!("Overlay already mounted on {mount_point}");
            return Ok(OverlaySetup::default());
        }

        if !force && self.verity.is_active(mount_point) {
            bail!("{mount_point} is still protected by dm-verity");
        }

        let root = self.overlay_root(mount_point);
        let upper = root.join("upper");
        let work = root.join("work");
        let created = !upper.is_dir() || !work.is_dir();

        ensure_dir_exists(&upper)?;
        ensure_dir_exists(&work)?;
        fs::write(root.join(MOUNT_POINT_MARKER), canonical_mount_point(mount_point))
            .with_context(|| format!("Failed to record overlay owner in {}", root.display()))?;

        if created {
            copy_path_context(canonical_mount_point(mount_point), &upper)?;
            info!("Prepared overlay backing for {mount_point} at {}", root.display());
        }

        Ok(OverlaySetup {
            wants_reboot: created,
        })
    }

    fn mount_all(&self, partitions: &Fstab) -> bool {
        let mut all_mounted = true;

        for entry in partitions {
            let target = entry.system_mount_point();
            if self.already_mounted(target) || !self.wants_overlay(entry) {
                continue;
            }

            let root = self.overlay_root(&entry.mount_point);
            let upper = root.join("upper");
            let work = root.join("work");
            if !upper.is_dir() || !work.is_dir() {
                log::debug!("No overlay prepared for {target}");
                continue;
            }

            info!("Mounting overlay on {target}");
            if let Err(e) = mount_overlay(target, &upper, &work) {
                log::error!("Failed to mount overlay on {target}: {e:#}");
                all_mounted = false;
            }
        }

        all_mounted
    }

    fn already_mounted(&self, mount_point: &str) -> bool {
        mounted_fs_type(canonical_mount_point(mount_point))
            .is_some_and(|fs_type| fs_type == defs::OVERLAY_FS_TYPE)
    }

    fn cleanup_stale_state(&self) -> Result<()> {
        if !self.overlay_dir.is_dir() {
            return Ok(());
        }

        let entries = fs::read_dir(&self.overlay_dir)
            .with_context(|| format!("Failed to list {}", self.overlay_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }

            let owner = fs::read_to_string(path.join(MOUNT_POINT_MARKER)).unwrap_or_default();
            if !owner.is_empty() && self.already_mounted(owner.trim()) {
                continue;
            }

            info!("Removing stale overlay state {}", path.display());
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

fn do_mount_overlay(lowerdir: &str, upperdir: &Path, workdir: &Path, dest: &str) -> Result<()> {
    let upperdir = upperdir.display().to_string();
    let workdir = workdir.display().to_string();

    let result = (|| {
        let fs = fsopen(defs::OVERLAY_FS_TYPE, FsOpenFlags::FSOPEN_CLOEXEC)?;
        let fs = fs.as_fd();

        fsconfig_set_string(fs, "lowerdir", lowerdir)?;
        fsconfig_set_string(fs, "upperdir", &upperdir)?;
        fsconfig_set_string(fs, "workdir", &workdir)?;
        fsconfig_set_string(fs, "source", defs::OVERLAY_SOURCE)?;
        fsconfig_create(fs)?;

        let mount = fsmount(fs, FsMountFlags::FSMOUNT_CLOEXEC, MountAttrFlags::empty())?;
        move_mount(
            mount.as_fd(),
            "",
            CWD,
            dest,
            MoveMountFlags::MOVE_MOUNT_F_EMPTY_PATH,
        )
    })();

    if let Err(fsopen_err) = result {
        let data = format!("lowerdir={lowerdir},upperdir={upperdir},workdir={workdir}");
        let data_c = CString::new(data).context("Invalid string for mount data")?;

        mount(
            defs::OVERLAY_SOURCE,
            dest,
            defs::OVERLAY_FS_TYPE,
            MountFlags::empty(),
            Some(data_c.as_c_str()),
        )
        .with_context(|| format!("Legacy mount failed (fsopen also failed: {fsopen_err})"))?;
    }

    Ok(())
}

/// Mounts a writable overlay on `target`, keeping the mounts that lived below it visible.
fn mount_overlay(target: &str, upperdir: &Path, workdir: &Path) -> Result<()> {
    let root_file =
        File::open(target).with_context(|| format!("failed to open target root {target}"))?;
    let stock_root = format!("/proc/self/fd/{}", root_file.as_raw_fd());

    let child_mounts = match sub_mounts(target) {
        Ok(mounts) => mounts,
        Err(e) => {
            warn!("Failed to detect sub-mounts of {target}: {e:#}");
            Vec::new()
        }
    };

    let mut stashed: Vec<(String, OwnedFd)> = Vec::new();
    for mount_point in child_mounts {
        let relative = mount_point
            .strip_prefix(target)
            .unwrap_or(&mount_point)
            .trim_start_matches('/')
            .to_string();

        match open_tree(
            root_file.as_fd(),
            relative.as_str(),
            OpenTreeFlags::OPEN_TREE_CLOEXEC
                | OpenTreeFlags::OPEN_TREE_CLONE
                | OpenTreeFlags::AT_RECURSIVE,
        ) {
            Ok(fd) => stashed.push((mount_point, fd)),
            Err(e) => warn!("Failed to stash mount {mount_point}: {e}"),
        }
    }

    do_mount_overlay(&stock_root, upperdir, workdir, target)
        .with_context(|| format!("mount overlayfs on {target} failed"))?;

    for (mount_point, fd) in stashed {
        if let Err(e) = move_mount(
            fd.as_fd(),
            "",
            CWD,
            mount_point.as_str(),
            MoveMountFlags::MOVE_MOUNT_F_EMPTY_PATH,
        ) {
            warn!("failed to restore child mount {mount_point}: {e}, revert overlay on {target}");
            if let Err(umount_err) = unmount(target, UnmountFlags::DETACH) {
                log::error!("CRITICAL: Failed to revert overlay on {target}: {umount_err}");
            }
            bail!("Child mount restoration failed for {mount_point}: {e}");
        }
    }

    Ok(())
}
