// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

// Remount Constants

// Config
pub const CONFIG_FILE: &str = "/data/adb/remount/config.toml";

// Mount tables
pub const PROC_MOUNTS: &str = "/proc/mounts";
pub const FSTAB_SEARCH_DIRS: &[&str] = &[
    "/odm/etc",
    "/vendor/etc",
    "/system/etc",
    "/first_stage_ramdisk",
    "/",
];
pub const RECOVERY_FSTAB: &str = "/etc/recovery.fstab";
pub const RECOVERY_BINARY: &str = "/system/bin/recovery";

// Block devices
pub const BY_NAME_DIR: &str = "/dev/block/by-name";
pub const MAPPER_DIR: &str = "/dev/block/mapper";
pub const ROOT_PLACEHOLDER_DEVICE: &str = "/dev/root";

// Overlay backing storage: <OVERLAY_DIR>/<partition>/{upper,work}
pub const OVERLAY_DIR: &str = "/data/adb/remount/overlay";
pub const OVERLAY_SOURCE: &str = "overlay";
pub const OVERLAY_FS_TYPE: &str = "overlay";

// Filesystems that never get verity or overlays.
pub const REMOVABLE_FS_TYPE: &str = "vfat";

// DSU metadata
pub const DSU_ACTIVE_FILE: &str = "/metadata/gsi/dsu/active";

// Properties
pub const PROP_DEBUGGABLE: &str = "ro.debuggable";
pub const PROP_DEVICE_STATE: &str = "ro.boot.vbmeta.device_state";
pub const PROP_SLOT_SUFFIX: &str = "ro.boot.slot_suffix";
pub const PROP_VIRTUAL_AB: &str = "ro.virtual_ab.enabled";
pub const PROP_VIRTUAL_AB_RETROFIT: &str = "ro.virtual_ab.retrofit";
pub const PROP_GSID_RUNNING: &str = "ro.gsid.image_running";
pub const PROP_POWERCTL: &str = "sys.powerctl";
pub const FSTAB_SUFFIX_PROPS: &[&str] = &[
    "ro.boot.fstab_suffix",
    "ro.hardware",
    "ro.boot.hardware.platform",
];

// Reboot
pub const REBOOT_REASON: &str = "remount";
pub const DEFAULT_REBOOT_TIMEOUT_SECS: u64 = 60;

// Maintenance entry point name (argv[0])
pub const CLEAN_SCRATCH_NAME: &str = "clean_scratch_files";

// Generic failure exit code for everything outside the remount engine.
pub const EXIT_FAILURE: u8 = 1;
