// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::defs;

#[derive(Parser, Debug)]
#[command(
    name = "remount",
    version,
    about = "Remount specified partition(s) read-write, by name or mount point",
    after_help = "-R notwithstanding, verity must be disabled on partition(s).\n\
                  -R within a DSU guest system reboots into the DSU instead of the host system,\n\
                  this command would enable DSU (one-shot) if not already enabled."
)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Automatic reboot if needed for new settings to take effect
    #[arg(short = 'R', long = "reboot")]
    pub reboot: bool,
    /// Use fstab FILE instead of the default
    #[arg(short = 'T', long = "fstab", value_name = "FILE")]
    pub fstab: Option<PathBuf>,
    /// Be more verbose
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    /// Partitions to remount, by name or mount point. Defaults to all.
    pub partitions: Vec<String>,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    GenConfig {
        #[arg(short = 'o', long = "output", default_value = defs::CONFIG_FILE)]
        output: PathBuf,
    },
    ShowConfig,
    /// Remove overlay state that no longer backs a mounted overlay
    CleanScratch,
}
