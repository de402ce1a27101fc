// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod parser;
pub mod source;

use std::path::Path;

use nix::mount::MsFlags;

pub use self::source::{FstabSource, SystemFstab};

/// Spellings that name the same partition: `(fstab spelling, canonical spelling)`.
///
/// On system-as-root devices the system image is listed as `/` but users and
/// overlays refer to it as `/system`.
pub const MOUNT_POINT_ALIASES: &[(&str, &str)] = &[("/", "/system")];

/// Canonical name of a mount point (`/` becomes `/system`).
pub fn canonical_mount_point(mount_point: &str) -> &str {
    MOUNT_POINT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == mount_point)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(mount_point)
}

/// Where the kernel reports a canonical mount point in the live table
/// (`/system` is mounted at `/` on system-as-root devices).
pub fn live_mount_point(mount_point: &str) -> &str {
    MOUNT_POINT_ALIASES
        .iter()
        .find(|(_, canonical)| *canonical == mount_point)
        .map(|(alias, _)| *alias)
        .unwrap_or(mount_point)
}

/// True when `a` and `b` are two different spellings of one aliased partition.
pub fn is_alias_pair(a: &str, b: &str) -> bool {
    MOUNT_POINT_ALIASES
        .iter()
        .any(|(alias, canonical)| (a == *alias && b == *canonical) || (a == *canonical && b == *alias))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsMgrFlags {
    pub vold_managed: bool,
    pub recovery_only: bool,
    pub slot_select: bool,
    pub slot_select_other: bool,
    pub logical: bool,
    pub avb: bool,
    pub verify: bool,
    pub first_stage_mount: bool,
    pub wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub blk_device: String,
    pub logical_partition_name: String,
    pub mount_point: String,
    pub fs_type: String,
    pub flags: MsFlags,
    pub fs_options: String,
    pub fs_mgr_flags: FsMgrFlags,
}

impl FstabEntry {
    pub fn new(blk_device: &str, mount_point: &str, fs_type: &str, flags: MsFlags) -> Self {
        Self {
            blk_device: blk_device.to_string(),
            logical_partition_name: String::new(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            flags,
            fs_options: String::new(),
            fs_mgr_flags: FsMgrFlags::default(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(MsFlags::MS_RDONLY)
    }

    pub fn system_mount_point(&self) -> &str {
        canonical_mount_point(&self.mount_point)
    }

    /// Last path component of the canonical mount point, e.g. `vendor`.
    pub fn partition_name(&self) -> &str {
        let mount_point = self.system_mount_point();
        Path::new(mount_point)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(mount_point)
    }
}

/// Ordered mount table. Lookups return the first matching row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    entries: Vec<FstabEntry>,
}

impl Fstab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FstabEntry) {
        self.entries.push(entry);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FstabEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FstabEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [FstabEntry] {
        &mut self.entries
    }

    pub fn entry_for_mount_point(&self, mount_point: &str) -> Option<&FstabEntry> {
        self.entries.iter().find(|e| e.mount_point == mount_point)
    }

    pub fn contains_mount_point(&self, mount_point: &str) -> bool {
        self.entry_for_mount_point(mount_point).is_some()
    }

    pub fn mount_points(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.mount_point.as_str()).collect()
    }
}

impl FromIterator<FstabEntry> for Fstab {
    fn from_iter<I: IntoIterator<Item = FstabEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Fstab {
    type Item = FstabEntry;
    type IntoIter = std::vec::IntoIter<FstabEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Fstab {
    type Item = &'a FstabEntry;
    type IntoIter = std::slice::Iter<'a, FstabEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
