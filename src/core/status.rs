// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// Outcome of a remount run. The discriminant is the process exit code.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RemountStatus {
    #[default]
    Success = 0,
    UnknownPartition = 5,
    InvalidPartition = 6,
    VerityPartition = 7,
    BadOverlay = 8,
    NoMounts = 9,
    RemountFailed = 10,
    BinderError = 11,
    Checkpointing = 12,
    GsidError = 13,
}

impl RemountStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Keeps the most recent failure: `later` wins unless it is a success.
    pub fn then(self, later: Self) -> Self {
        if later.is_success() { self } else { later }
    }
}

impl fmt::Display for RemountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::UnknownPartition => "unknown partition",
            Self::InvalidPartition => "invalid partition",
            Self::VerityPartition => "verity partition",
            Self::BadOverlay => "bad overlay",
            Self::NoMounts => "no mounts",
            Self::RemountFailed => "remount failed",
            Self::BinderError => "binder error",
            Self::Checkpointing => "checkpointing",
            Self::GsidError => "gsid error",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Run-wide flags gathered across every stage. Flags only ever turn on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemountCheckResult {
    pub reboot_later: bool,
    pub setup_overlayfs: bool,
    pub disabled_verity: bool,
    pub verity_error: bool,
    pub remounted_anything: bool,
}

impl RemountCheckResult {
    pub fn merge(&mut self, other: Self) {
        self.reboot_later |= other.reboot_later;
        self.setup_overlayfs |= other.setup_overlayfs;
        self.disabled_verity |= other.disabled_verity;
        self.verity_error |= other.verity_error;
        self.remounted_anything |= other.remounted_anything;
    }

    pub fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }
}

/// What a finished run hands to reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub status: RemountStatus,
    pub result: RemountCheckResult,
}

impl Outcome {
    pub fn failed(status: RemountStatus) -> Self {
        Self {
            status,
            result: RemountCheckResult::default(),
        }
    }
}
