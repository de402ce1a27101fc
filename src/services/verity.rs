// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs::OpenOptions,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, bail, ensure};
use regex_lite::Regex;

use super::{VerityService, VeritySession};
use crate::{
    fstab::{FstabEntry, canonical_mount_point},
    utils::{run_captured, stdout_string},
};

const VBMETA_MAGIC: &[u8; 4] = b"AVB0";
const VBMETA_FLAGS_OFFSET: u64 = 120;
const VBMETA_HEADER_SIZE: usize = 256;
const HASHTREE_DISABLED: u32 = 1 << 0;

static VERITY_TARGET_REGEX: OnceLock<Regex> = OnceLock::new();

/// Name of the device-mapper device verity sets up for `entry`.
pub fn verity_device_name(entry: &FstabEntry) -> String {
    if entry.mount_point == "/" {
        if entry.fs_mgr_flags.avb {
            return "vroot".to_string();
        }
        return "system-verity".to_string();
    }

    format!("{}-verity", entry.partition_name())
}

/// Every device name verity may use for `mount_point`.
fn verity_device_names(mount_point: &str) -> Vec<String> {
    match canonical_mount_point(mount_point) {
        "/system" => vec!["vroot".to_string(), "system-verity".to_string()],
        canonical => {
            let name = Path::new(canonical)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(canonical);
            vec![format!("{name}-verity")]
        }
    }
}

fn table_has_verity_target(table: &str) -> bool {
    let re = VERITY_TARGET_REGEX.get_or_init(|| {
        Regex::new(r"(?m)^\s*\d+-\d+:\s*verity\b").expect("Invalid Regex pattern")
    });
    re.is_match(table)
}

/// Verity state from the live device-mapper tables, disabled through the vbmeta
/// partitions under `by_name_dir`.
pub struct AvbVerity {
    by_name_dir: PathBuf,
}

impl AvbVerity {
    pub fn new(by_name_dir: impl AsRef<Path>) -> Self {
        Self {
            by_name_dir: by_name_dir.as_ref().to_path_buf(),
        }
    }

    fn device_has_verity(&self, name: &str) -> bool {
        match run_captured("dmctl", &["table", name]) {
            Ok(output) if output.status.success() => {
                table_has_verity_target(&stdout_string(&output))
            }
            Ok(_) => false,
            Err(e) => {
                log::debug!("Cannot query dm table for {name}: {e:#}");
                false
            }
        }
    }
}

impl VerityService for AvbVerity {
    fn is_enabled(&self, entry: &FstabEntry) -> bool {
        (entry.fs_mgr_flags.avb || entry.fs_mgr_flags.verify)
            && self.device_has_verity(&verity_device_name(entry))
    }

    fn is_active(&self, mount_point: &str) -> bool {
        verity_device_names(mount_point)
            .iter()
            .any(|name| self.device_has_verity(name))
    }

    fn open_session(&self) -> Result<Box<dyn VeritySession + '_>> {
        ensure!(
            self.by_name_dir.is_dir(),
            "Partition directory {} is missing",
            self.by_name_dir.display()
        );
        Ok(Box::new(AvbSession {
            by_name_dir: &self.by_name_dir,
        }))
    }
}

pub struct AvbSession<'a> {
    by_name_dir: &'a Path,
}

impl VeritySession for AvbSession<'_> {
    fn disable_verity(&mut self, slot_suffix: &str) -> Result<()> {
        let path = self.by_name_dir.join(format!("vbmeta{slot_suffix}"));
        set_hashtree_disabled(&path)
    }
}

/// Sets the hashtree-disabled bit in the vbmeta header stored at `path`.
pub fn set_hashtree_disabled(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut header = [0u8; VBMETA_HEADER_SIZE];
    file.read_exact_at(&mut header, 0)
        .with_context(|| format!("Failed to read vbmeta header from {}", path.display()))?;

    if &header[..VBMETA_MAGIC.len()] != VBMETA_MAGIC {
        bail!("{} does not contain a vbmeta image", path.display());
    }

    let offset = VBMETA_FLAGS_OFFSET as usize;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&header[offset..offset + 4]);
    let flags = u32::from_be_bytes(raw);

    if flags & HASHTREE_DISABLED != 0 {
        log::debug!("Verity already disabled in {}", path.display());
        return Ok(());
    }

    file.write_all_at(&(flags | HASHTREE_DISABLED).to_be_bytes(), VBMETA_FLAGS_OFFSET)
        .with_context(|| format!("Failed to write vbmeta flags to {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;

    log::info!("Disabled verity in {}", path.display());
    Ok(())
}
