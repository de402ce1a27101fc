// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod checkpoint;
pub mod dsu;
pub mod verity;

use anyhow::Result;

use crate::{
    fstab::{Fstab, FstabEntry, FstabSource},
    sys::{block::BlockLayer, props::PropertyStore},
};

pub trait CheckpointService {
    /// Whether the service can be reached right now.
    fn is_available(&self) -> bool;
    fn is_checkpointing(&self) -> Result<bool>;
}

pub trait VerityService {
    /// Verity is configured for `entry` and its device is live.
    fn is_enabled(&self, entry: &FstabEntry) -> bool;
    /// A verity device is live under `mount_point`, whatever the table says.
    fn is_active(&self, mount_point: &str) -> bool;
    fn open_session(&self) -> Result<Box<dyn VeritySession + '_>>;
}

pub trait VeritySession {
    /// Turns off hashtree verification for the given slot on next boot.
    fn disable_verity(&mut self, slot_suffix: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlaySetup {
    pub wants_reboot: bool,
}

pub trait OverlayService {
    /// Entries able to host an overlay. Pure and deterministic for a given table.
    fn candidate_list(&self, fstab: &Fstab) -> Fstab;
    fn wants_overlay(&self, entry: &FstabEntry) -> bool;
    fn setup(&self, mount_point: &str, force: bool) -> Result<OverlaySetup>;
    /// Mounts overlays over every partition that has one prepared. False if any failed.
    fn mount_all(&self, partitions: &Fstab) -> bool;
    fn already_mounted(&self, mount_point: &str) -> bool;
    fn cleanup_stale_state(&self) -> Result<()>;
}

pub const DSU_INSTALL_OK: i32 = 0;

pub trait DsuService {
    fn is_running(&self) -> Result<bool>;
    fn is_enabled(&self) -> Result<bool>;
    fn active_slot(&self) -> Result<String>;
    /// Returns the service error code, `DSU_INSTALL_OK` on success.
    fn enable(&self, one_shot: bool, slot: &str) -> Result<i32>;
}

/// Everything the remount engine talks to outside its own process state.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub fstab: &'a dyn FstabSource,
    pub props: &'a dyn PropertyStore,
    pub checkpoint: &'a dyn CheckpointService,
    pub verity: &'a dyn VerityService,
    pub overlay: &'a dyn OverlayService,
    pub dsu: Option<&'a dyn DsuService>,
    pub block: &'a dyn BlockLayer,
}
