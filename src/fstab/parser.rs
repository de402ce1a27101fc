// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{Result, bail};
use nix::mount::MsFlags;

use super::{FsMgrFlags, Fstab, FstabEntry};

const MOUNT_FLAGS: &[(&str, MsFlags)] = &[
    ("noatime", MsFlags::MS_NOATIME),
    ("noexec", MsFlags::MS_NOEXEC),
    ("nosuid", MsFlags::MS_NOSUID),
    ("nodev", MsFlags::MS_NODEV),
    ("nodiratime", MsFlags::MS_NODIRATIME),
    ("ro", MsFlags::MS_RDONLY),
    ("rw", MsFlags::empty()),
    ("sync", MsFlags::MS_SYNCHRONOUS),
    ("remount", MsFlags::MS_REMOUNT),
    ("bind", MsFlags::MS_BIND),
    ("rec", MsFlags::MS_REC),
    ("unbindable", MsFlags::MS_UNBINDABLE),
    ("private", MsFlags::MS_PRIVATE),
    ("slave", MsFlags::MS_SLAVE),
    ("shared", MsFlags::MS_SHARED),
    ("defaults", MsFlags::empty()),
];

/// Parses fstab text. Accepts both Android fstab files and `/proc/mounts`.
pub fn parse(content: &str) -> Result<Fstab> {
    let mut fstab = Fstab::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            bail!(
                "line {}: expected at least 5 fields, found {}",
                index + 1,
                fields.len()
            );
        }

        let (flags, fs_options) = parse_mount_flags(fields[3]);
        let mut entry = FstabEntry {
            blk_device: unescape(fields[0]),
            logical_partition_name: String::new(),
            mount_point: unescape(fields[1]),
            fs_type: fields[2].to_string(),
            flags,
            fs_options,
            fs_mgr_flags: FsMgrFlags::default(),
        };
        apply_fs_mgr_flags(&mut entry, fields[4]);

        fstab.push(entry);
    }

    Ok(fstab)
}

fn parse_mount_flags(field: &str) -> (MsFlags, String) {
    let mut flags = MsFlags::empty();
    let mut options = Vec::new();

    for option in field.split(',').filter(|o| !o.is_empty()) {
        match MOUNT_FLAGS.iter().find(|(name, _)| *name == option) {
            Some((_, flag)) => flags |= *flag,
            None => options.push(option),
        }
    }

    (flags, options.join(","))
}

fn apply_fs_mgr_flags(entry: &mut FstabEntry, field: &str) {
    for flag in field.split(',').filter(|f| !f.is_empty()) {
        let key = flag.split_once('=').map_or(flag, |(k, _)| k);

        let flags = &mut entry.fs_mgr_flags;
        match key {
            "voldmanaged" => flags.vold_managed = true,
            "recoveryonly" => flags.recovery_only = true,
            "slotselect" => flags.slot_select = true,
            "slotselect_other" => flags.slot_select_other = true,
            "first_stage_mount" => flags.first_stage_mount = true,
            "wait" => flags.wait = true,
            "verify" => flags.verify = true,
            "avb" => flags.avb = true,
            "logical" => {
                flags.logical = true;
                entry.logical_partition_name = entry.blk_device.clone();
            }
            _ => log::trace!("ignoring fs_mgr flag {flag}"),
        }
    }
}

/// Decodes the octal escapes the kernel uses for whitespace in mount tables.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let code = bytes[i + 1..=i + 3]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
