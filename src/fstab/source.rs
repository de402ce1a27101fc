// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use nix::mount::MsFlags;
use procfs::process::{MountInfo, Process};

use super::{Fstab, FstabEntry, parser};
use crate::{defs, sys::props::PropertyStore};

pub trait FstabSource {
    fn read_default(&self) -> Result<Fstab>;
    fn read_file(&self, path: &Path) -> Result<Fstab>;
    /// Snapshot of what is mounted right now, in mount order.
    fn read_live_mounts(&self) -> Result<Fstab>;
}

pub struct SystemFstab {
    suffixes: Vec<String>,
    slot_suffix: String,
}

impl SystemFstab {
    pub fn new(props: &dyn PropertyStore) -> Self {
        let suffixes = defs::FSTAB_SUFFIX_PROPS
            .iter()
            .filter_map(|prop| props.get(prop))
            .filter(|value| !value.is_empty())
            .collect();

        Self {
            suffixes,
            slot_suffix: props.get(defs::PROP_SLOT_SUFFIX).unwrap_or_default(),
        }
    }

    fn default_path(&self) -> Option<PathBuf> {
        if Path::new(defs::RECOVERY_BINARY).exists() {
            let recovery = PathBuf::from(defs::RECOVERY_FSTAB);
            if recovery.exists() {
                return Some(recovery);
            }
        }

        self.suffixes.iter().find_map(|suffix| {
            defs::FSTAB_SEARCH_DIRS
                .iter()
                .map(|dir| Path::new(dir).join(format!("fstab.{suffix}")))
                .find(|path| path.exists())
        })
    }
}

impl FstabSource for SystemFstab {
    fn read_default(&self) -> Result<Fstab> {
        let path = self
            .default_path()
            .context("No default fstab found for this hardware")?;
        log::debug!("Using default fstab {}", path.display());

        let mut fstab = self.read_file(&path)?;
        apply_slot_suffix(&mut fstab, &self.slot_suffix);
        Ok(fstab)
    }

    fn read_file(&self, path: &Path) -> Result<Fstab> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parser::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn read_live_mounts(&self) -> Result<Fstab> {
        match Process::myself().and_then(|process| process.mountinfo()) {
            Ok(mountinfo) => Ok(mountinfo.into_iter().map(entry_from_mountinfo).collect()),
            Err(e) => {
                log::debug!("mountinfo unavailable ({e}), falling back to {}", defs::PROC_MOUNTS);
                self.read_file(Path::new(defs::PROC_MOUNTS))
            }
        }
    }
}

fn entry_from_mountinfo(info: MountInfo) -> FstabEntry {
    let flags = if info.mount_options.contains_key("ro") {
        MsFlags::MS_RDONLY
    } else {
        MsFlags::empty()
    };

    FstabEntry::new(
        info.mount_source.as_deref().unwrap_or("none"),
        &info.mount_point.to_string_lossy(),
        &info.fs_type,
        flags,
    )
}

fn other_slot_suffix(suffix: &str) -> &'static str {
    match suffix {
        "_a" => "_b",
        "_b" => "_a",
        _ => "",
    }
}

/// Binds `slotselect` rows to the running slot and `slotselect_other` rows to the
/// inactive one.
pub(crate) fn apply_slot_suffix(fstab: &mut Fstab, suffix: &str) {
    if suffix.is_empty() {
        return;
    }

    for entry in fstab.entries_mut() {
        let applied = if entry.fs_mgr_flags.slot_select {
            suffix
        } else if entry.fs_mgr_flags.slot_select_other {
            other_slot_suffix(suffix)
        } else {
            continue;
        };

        entry.blk_device.push_str(applied);
        if entry.fs_mgr_flags.logical {
            entry.logical_partition_name.push_str(applied);
        }
    }
}

/// Reads the table to operate on: the custom file when one is given, otherwise
/// the default table with a `/` row borrowed from the live mounts if it lacks
/// both `/` and `/system`.
pub fn load(source: &dyn FstabSource, custom: Option<&Path>) -> Result<Fstab> {
    if let Some(path) = custom {
        return source.read_file(path);
    }

    let mut fstab = source.read_default()?;

    if !fstab.contains_mount_point("/system") && !fstab.contains_mount_point("/") {
        match source.read_live_mounts() {
            Ok(mounts) => {
                if let Some(root) = mounts.entry_for_mount_point("/")
                    && root.fs_type != "rootfs"
                {
                    log::debug!("Adding live root entry {} ({})", root.blk_device, root.fs_type);
                    fstab.push(root.clone());
                }
            }
            Err(e) => log::debug!("Cannot read live mounts for root entry: {e:#}"),
        }
    }

    Ok(fstab)
}
