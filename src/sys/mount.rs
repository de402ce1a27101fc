// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use procfs::process::Process;

use crate::defs;

/// Filesystem type of the topmost mount at `path`, if anything is mounted there.
pub fn mounted_fs_type<P: AsRef<Path>>(path: P) -> Option<String> {
    let path_str = path.as_ref().to_string_lossy();
    let search = match path_str.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if let Ok(process) = Process::myself()
        && let Ok(mountinfo) = process.mountinfo()
    {
        return mountinfo
            .into_iter()
            .filter(|m| m.mount_point.to_string_lossy() == search)
            .last()
            .map(|m| m.fs_type);
    }

    let content = fs::read_to_string(defs::PROC_MOUNTS).ok()?;
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            (parts.len() > 2 && parts[1] == search).then(|| parts[2].to_string())
        })
        .last()
}

/// Mount points strictly below `parent`, shallowest first.
pub fn sub_mounts(parent: &str) -> Result<Vec<String>> {
    let file = fs::File::open(defs::PROC_MOUNTS).context("Failed to open /proc/mounts")?;
    let reader = BufReader::new(file);

    let parent_prefix = if parent.ends_with('/') {
        parent.to_string()
    } else {
        format!("{parent}/")
    };

    let mut mounts = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let mount_point = parts[1];
        if mount_point.starts_with(&parent_prefix) && !mounts.iter().any(|m| m == mount_point) {
            mounts.push(mount_point.to_string());
        }
    }

    mounts.sort_by_key(|m| m.len());
    Ok(mounts)
}
