// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod classify;
pub mod executor;
pub mod manager;
pub mod prepare;
pub mod report;
pub mod selection;
pub mod status;
#[cfg(test)]
pub mod testing;

pub use manager::RemountController;
pub use status::RemountStatus;
