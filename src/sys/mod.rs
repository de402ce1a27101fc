// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod block;
pub mod mount;
pub mod props;
pub mod reboot;
pub mod retry;
