// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs::File,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use nix::mount::{MsFlags, mount};

use crate::fstab::FstabEntry;

// BLKROSET = _IO(0x12, 93)
nix::ioctl_write_ptr_bad!(blk_ro_set, nix::request_code_none!(0x12, 93), libc::c_int);

pub trait BlockLayer {
    fn set_read_only(&self, device: &str, read_only: bool) -> Result<()>;
    /// `mount(2)` with `MS_REMOUNT` and no data. The errno is kept so callers
    /// can react to `EINVAL`.
    fn remount(&self, device: &str, mount_point: &str, fs_type: &str) -> nix::Result<()>;
    /// Concrete device node backing a logical (dynamic) partition.
    fn logical_device(&self, entry: &FstabEntry) -> Option<String>;
}

pub struct LinuxBlockLayer {
    mapper_dir: PathBuf,
}

impl LinuxBlockLayer {
    pub fn new(mapper_dir: impl AsRef<Path>) -> Self {
        Self {
            mapper_dir: mapper_dir.as_ref().to_path_buf(),
        }
    }
}

impl BlockLayer for LinuxBlockLayer {
    fn set_read_only(&self, device: &str, read_only: bool) -> Result<()> {
        // The descriptor is closed when `file` drops, on every path.
        let file = File::open(device).with_context(|| format!("Failed to open {device}"))?;
        let value = libc::c_int::from(read_only);

        unsafe { blk_ro_set(file.as_raw_fd(), &value) }
            .with_context(|| format!("BLKROSET {value} failed on {device}"))?;
        Ok(())
    }

    fn remount(&self, device: &str, mount_point: &str, fs_type: &str) -> nix::Result<()> {
        mount(
            Some(device),
            mount_point,
            Some(fs_type),
            MsFlags::MS_REMOUNT,
            None::<&str>,
        )
    }

    fn logical_device(&self, entry: &FstabEntry) -> Option<String> {
        let name = if entry.logical_partition_name.is_empty() {
            &entry.blk_device
        } else {
            &entry.logical_partition_name
        };

        if name.starts_with('/') {
            return Some(name.clone());
        }

        let path = self.mapper_dir.join(name);
        path.exists().then(|| path.to_string_lossy().into_owned())
    }
}
