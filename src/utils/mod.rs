// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod fs;
pub mod log;
pub mod process;

pub use self::{fs::*, log::*, process::*};
