// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory stand-ins for every system collaborator.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow, bail};
use nix::{errno::Errno, mount::MsFlags};

use crate::{
    fstab::{Fstab, FstabEntry, FstabSource},
    services::{
        CheckpointService, DSU_INSTALL_OK, DsuService, OverlaySetup, OverlayService,
        Services, VerityService, VeritySession,
    },
    sys::{block::BlockLayer, props::PropertyStore},
};

pub fn ro(blk_device: &str, mount_point: &str, fs_type: &str) -> FstabEntry {
    FstabEntry::new(blk_device, mount_point, fs_type, MsFlags::MS_RDONLY)
}

pub fn table(entries: &[FstabEntry]) -> Fstab {
    entries.iter().cloned().collect()
}

#[derive(Default)]
pub struct FakeFstabSource {
    default: Fstab,
    live: Fstab,
    files: HashMap<PathBuf, Fstab>,
    live_fails: bool,
    pub live_reads: Cell<usize>,
}

impl FakeFstabSource {
    pub fn new(default: Fstab, live: Fstab) -> Self {
        Self {
            default,
            live,
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, fstab: Fstab) -> Self {
        self.files.insert(path.as_ref().to_path_buf(), fstab);
        self
    }

    pub fn with_unreadable_live_mounts(mut self) -> Self {
        self.live_fails = true;
        self
    }
}

impl FstabSource for FakeFstabSource {
    fn read_default(&self) -> Result<Fstab> {
        Ok(self.default.clone())
    }

    fn read_file(&self, path: &Path) -> Result<Fstab> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such fstab {}", path.display()))
    }

    fn read_live_mounts(&self) -> Result<Fstab> {
        self.live_reads.set(self.live_reads.get() + 1);
        if self.live_fails {
            bail!("mount table unavailable");
        }
        Ok(self.live.clone())
    }
}

#[derive(Default)]
pub struct FakeProperties {
    values: RefCell<HashMap<String, String>>,
}

impl FakeProperties {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let props = Self::default();
        for (name, value) in pairs {
            props
                .values
                .borrow_mut()
                .insert((*name).to_string(), (*value).to_string());
        }
        props
    }
}

impl PropertyStore for FakeProperties {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .borrow()
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// `state` of `None` makes the status query fail.
pub struct FakeCheckpoint {
    pub unavailable_polls: Cell<u32>,
    pub polls: Cell<u32>,
    pub state: Option<bool>,
}

impl FakeCheckpoint {
    pub fn new(state: Option<bool>) -> Self {
        Self {
            unavailable_polls: Cell::new(0),
            polls: Cell::new(0),
            state,
        }
    }

    pub fn available_after(self, polls: u32) -> Self {
        self.unavailable_polls.set(polls);
        self
    }
}

impl Default for FakeCheckpoint {
    fn default() -> Self {
        Self::new(Some(false))
    }
}

impl CheckpointService for FakeCheckpoint {
    fn is_available(&self) -> bool {
        self.polls.set(self.polls.get() + 1);
        let remaining = self.unavailable_polls.get();
        if remaining == 0 {
            return true;
        }
        self.unavailable_polls.set(remaining - 1);
        false
    }

    fn is_checkpointing(&self) -> Result<bool> {
        self.state.ok_or_else(|| anyhow!("vold did not answer"))
    }
}

#[derive(Default)]
pub struct FakeVerity {
    enabled: Vec<String>,
    fail_session: bool,
    fail_disable: bool,
    pub disabled_slots: RefCell<Vec<String>>,
}

impl FakeVerity {
    pub fn enabled_for(mount_points: &[&str]) -> Self {
        Self {
            enabled: mount_points.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_session(mut self) -> Self {
        self.fail_session = true;
        self
    }

    pub fn failing_disable(mut self) -> Self {
        self.fail_disable = true;
        self
    }
}

impl VerityService for FakeVerity {
    fn is_enabled(&self, entry: &FstabEntry) -> bool {
        self.is_active(&entry.mount_point)
    }

    fn is_active(&self, mount_point: &str) -> bool {
        self.enabled.iter().any(|m| m == mount_point)
    }

    fn open_session(&self) -> Result<Box<dyn VeritySession + '_>> {
        if self.fail_session {
            bail!("no avb ops");
        }
        Ok(Box::new(FakeVeritySession { verity: self }))
    }
}

struct FakeVeritySession<'a> {
    verity: &'a FakeVerity,
}

impl VeritySession for FakeVeritySession<'_> {
    fn disable_verity(&mut self, slot_suffix: &str) -> Result<()> {
        if self.verity.fail_disable {
            bail!("vbmeta is read-only");
        }
        self.verity
            .disabled_slots
            .borrow_mut()
            .push(slot_suffix.to_string());
        Ok(())
    }
}

pub struct FakeOverlay {
    candidates: Vec<String>,
    wants: Vec<String>,
    failing_setup: Vec<String>,
    mounted: Vec<String>,
    setup_wants_reboot: bool,
    mount_all_ok: bool,
    cleanup_ok: bool,
    pub setups: RefCell<Vec<(String, bool)>>,
    pub mount_all_calls: RefCell<Vec<Vec<String>>>,
}

impl Default for FakeOverlay {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            wants: Vec::new(),
            failing_setup: Vec::new(),
            mounted: Vec::new(),
            setup_wants_reboot: false,
            mount_all_ok: true,
            cleanup_ok: true,
            setups: RefCell::new(Vec::new()),
            mount_all_calls: RefCell::new(Vec::new()),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl FakeOverlay {
    pub fn with_candidates(mut self, mount_points: &[&str]) -> Self {
        self.candidates = owned(mount_points);
        self
    }

    pub fn wanting(mut self, mount_points: &[&str]) -> Self {
        self.wants = owned(mount_points);
        self
    }

    pub fn failing_setup(mut self, mount_points: &[&str]) -> Self {
        self.failing_setup = owned(mount_points);
        self
    }

    pub fn already_mounted_on(mut self, mount_points: &[&str]) -> Self {
        self.mounted = owned(mount_points);
        self
    }

    pub fn setup_wants_reboot(mut self) -> Self {
        self.setup_wants_reboot = true;
        self
    }

    pub fn failing_mount_all(mut self) -> Self {
        self.mount_all_ok = false;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.cleanup_ok = false;
        self
    }
}

impl OverlayService for FakeOverlay {
    fn candidate_list(&self, fstab: &Fstab) -> Fstab {
        let mut candidates = Fstab::new();
        for entry in fstab {
            if self.candidates.contains(&entry.mount_point)
                && !candidates.contains_mount_point(&entry.mount_point)
            {
                candidates.push(entry.clone());
            }
        }
        candidates
    }

    fn wants_overlay(&self, entry: &FstabEntry) -> bool {
        self.wants.contains(&entry.mount_point)
    }

    fn setup(&self, mount_point: &str, force: bool) -> Result<OverlaySetup> {
        self.setups
            .borrow_mut()
            .push((mount_point.to_string(), force));
        if self.failing_setup.iter().any(|m| m == mount_point) {
            bail!("no scratch space for {mount_point}");
        }
        Ok(OverlaySetup {
            wants_reboot: self.setup_wants_reboot,
        })
    }

    fn mount_all(&self, partitions: &Fstab) -> bool {
        self.mount_all_calls.borrow_mut().push(
            partitions
                .mount_points()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        self.mount_all_ok
    }

    fn already_mounted(&self, mount_point: &str) -> bool {
        self.mounted.iter().any(|m| m == mount_point)
    }

    fn cleanup_stale_state(&self) -> Result<()> {
        if !self.cleanup_ok {
            bail!("overlay state busy");
        }
        Ok(())
    }
}

pub struct FakeDsu {
    pub running: bool,
    pub enabled: bool,
    pub slot: String,
    pub enable_code: i32,
    pub broken: bool,
    pub enable_calls: RefCell<Vec<(bool, String)>>,
}

impl FakeDsu {
    pub fn new(running: bool, enabled: bool) -> Self {
        Self {
            running,
            enabled,
            slot: "dsu".to_string(),
            enable_code: DSU_INSTALL_OK,
            broken: false,
            enable_calls: RefCell::new(Vec::new()),
        }
    }
}

impl DsuService for FakeDsu {
    fn is_running(&self) -> Result<bool> {
        if self.broken {
            bail!("gsid is gone");
        }
        Ok(self.running)
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled)
    }

    fn active_slot(&self) -> Result<String> {
        Ok(self.slot.clone())
    }

    fn enable(&self, one_shot: bool, slot: &str) -> Result<i32> {
        self.enable_calls
            .borrow_mut()
            .push((one_shot, slot.to_string()));
        Ok(self.enable_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemountCall {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

#[derive(Default)]
pub struct FakeBlock {
    logical: HashMap<String, String>,
    failures: HashMap<String, Errno>,
    pub read_only_calls: RefCell<Vec<(String, bool)>>,
    pub remounts: RefCell<Vec<RemountCall>>,
}

impl FakeBlock {
    pub fn with_logical(mut self, name: &str, device: &str) -> Self {
        self.logical.insert(name.to_string(), device.to_string());
        self
    }

    /// Every remount attempted at `mount_point` fails with `errno`.
    pub fn failing_at(mut self, mount_point: &str, errno: Errno) -> Self {
        self.failures.insert(mount_point.to_string(), errno);
        self
    }

    pub fn remounted_mount_points(&self) -> Vec<String> {
        self.remounts
            .borrow()
            .iter()
            .map(|call| call.mount_point.clone())
            .collect()
    }
}

impl BlockLayer for FakeBlock {
    fn set_read_only(&self, device: &str, read_only: bool) -> Result<()> {
        self.read_only_calls
            .borrow_mut()
            .push((device.to_string(), read_only));
        Ok(())
    }

    fn remount(&self, device: &str, mount_point: &str, fs_type: &str) -> nix::Result<()> {
        self.remounts.borrow_mut().push(RemountCall {
            device: device.to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
        });
        match self.failures.get(mount_point) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }

    fn logical_device(&self, entry: &FstabEntry) -> Option<String> {
        self.logical.get(&entry.logical_partition_name).cloned()
    }
}

/// One fake of each collaborator, wired together by [`FakeSystem::services`].
#[derive(Default)]
pub struct FakeSystem {
    pub fstab: FakeFstabSource,
    pub props: FakeProperties,
    pub checkpoint: FakeCheckpoint,
    pub verity: FakeVerity,
    pub overlay: FakeOverlay,
    pub dsu: Option<FakeDsu>,
    pub block: FakeBlock,
}

impl FakeSystem {
    pub fn new(default: Fstab, live: Fstab) -> Self {
        Self {
            fstab: FakeFstabSource::new(default, live),
            ..Default::default()
        }
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            fstab: &self.fstab,
            props: &self.props,
            checkpoint: &self.checkpoint,
            verity: &self.verity,
            overlay: &self.overlay,
            dsu: self.dsu.as_ref().map(|dsu| dsu as &dyn DsuService),
            block: &self.block,
        }
    }
}
