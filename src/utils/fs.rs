// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs::create_dir_all, path::Path};

use anyhow::{Context, Result};
#[cfg(any(target_os = "linux", target_os = "android"))]
use extattr::{Flags as XattrFlags, lgetxattr, lsetxattr};

const SELINUX_XATTR: &str = "security.selinux";
const CONTEXT_SYSTEM: &str = "u:object_r:system_file:s0";
const CONTEXT_ROOTFS: &str = "u:object_r:rootfs:s0";

pub fn ensure_dir_exists<T: AsRef<Path>>(dir: T) -> Result<()> {
    if !dir.as_ref().exists() {
        create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.as_ref().display()))?;
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn lsetfilecon<P: AsRef<Path>>(path: P, con: &str) -> Result<()> {
    if let Err(e) = lsetxattr(
        path.as_ref(),
        SELINUX_XATTR,
        con.as_bytes(),
        XattrFlags::empty(),
    ) {
        let io_err = std::io::Error::from(e);
        log::debug!(
            "lsetfilecon: {} -> {} failed: {}",
            path.as_ref().display(),
            con,
            io_err
        );
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn lsetfilecon<P: AsRef<Path>>(_path: P, _con: &str) -> Result<()> {
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn lgetfilecon<P: AsRef<Path>>(path: P) -> Result<String> {
    let con = lgetxattr(path.as_ref(), SELINUX_XATTR).with_context(|| {
        format!(
            "Failed to get SELinux context for {}",
            path.as_ref().display()
        )
    })?;
    Ok(String::from_utf8_lossy(&con).trim_matches('\0').to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn lgetfilecon<P: AsRef<Path>>(_path: P) -> Result<String> {
    Ok(CONTEXT_SYSTEM.to_string())
}

/// Labels `dst` like `src`, falling back to `system_file` for unlabeled or rootfs sources.
pub fn copy_path_context<S: AsRef<Path>, D: AsRef<Path>>(src: S, dst: D) -> Result<()> {
    let mut context = if src.as_ref().exists() {
        lgetfilecon(&src).unwrap_or_else(|_| CONTEXT_SYSTEM.to_string())
    } else {
        CONTEXT_SYSTEM.to_string()
    };

    if context.contains(CONTEXT_ROOTFS) {
        context = CONTEXT_SYSTEM.to_string();
    }

    lsetfilecon(dst, &context)
}
