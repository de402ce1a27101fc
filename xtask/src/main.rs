// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

const BIN_NAME: &str = "remount";
const CLEAN_SCRATCH_ALIAS: &str = "clean_scratch_files";
const OUTPUT_DIR: &str = "output/system/bin";
const DEVICE_DIR: &str = "/data/local/tmp";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Arch {
    #[value(name = "arm64")]
    Arm64,
    #[value(name = "arm")]
    Arm,
    #[value(name = "x86_64")]
    X86_64,
    #[value(name = "riscv64")]
    Riscv64,
}

impl Arch {
    fn target(&self) -> &'static str {
        match self {
            Arch::Arm64 => "aarch64-linux-android",
            Arch::Arm => "armv7-linux-androideabi",
            Arch::X86_64 => "x86_64-linux-android",
            Arch::Riscv64 => "riscv64-linux-android",
        }
    }

    fn android_abi(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64-v8a",
            Arch::Arm => "armeabi-v7a",
            Arch::X86_64 => "x86_64",
            Arch::Riscv64 => "riscv64",
        }
    }

    fn api_level(&self) -> &'static str {
        match self {
            Arch::Riscv64 => "35",
            _ => "29",
        }
    }
}

#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Cross-build `remount` and copy it to output/system/bin
    Build {
        #[arg(long, default_value = "false")]
        release: bool,
        #[arg(long, default_value = "arm64")]
        arch: Arch,
    },
    /// Push the built binary to a rooted device over adb
    Push {
        #[arg(long, default_value = DEVICE_DIR)]
        dest: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release, arch } => build(release, arch)?,
        Commands::Push { dest } => push(&dest)?,
    }
    Ok(())
}

fn run(cmd: &mut Command, what: &str) -> Result<()> {
    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {what}"))?;
    if !status.success() {
        bail!("{what} failed with {status}");
    }
    Ok(())
}

fn build(release: bool, arch: Arch) -> Result<()> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

    if !matches!(arch, Arch::Riscv64) {
        let status = Command::new("rustup")
            .args(["target", "add", arch.target()])
            .status()
            .context("Failed to add rust target")?;

        if !status.success() {
            eprintln!("Warning: Failed to auto-install target {}", arch.target());
        }
    }
    println!(
        "Building {BIN_NAME} for ABI: {} (API {})",
        arch.android_abi(),
        arch.api_level()
    );

    let mut cmd = Command::new(&cargo);
    cmd.arg("ndk")
        .arg("-t")
        .arg(arch.target())
        .arg("-p")
        .arg(arch.api_level())
        .arg("build")
        .arg("--bin")
        .arg(BIN_NAME);

    if matches!(arch, Arch::Riscv64) {
        cmd.arg("-Z").arg("build-std");
        cmd.arg("--target").arg(arch.target());
    }

    if release {
        cmd.arg("--release");
    }

    run(&mut cmd, "cargo ndk build")?;

    let profile = if release { "release" } else { "debug" };
    let src_path = PathBuf::from("target")
        .join(arch.target())
        .join(profile)
        .join(BIN_NAME);
    if !src_path.exists() {
        bail!(
            "Build finished but binary not found at: {}",
            src_path.display()
        );
    }

    let output_dir = Path::new(OUTPUT_DIR);
    fs::create_dir_all(output_dir).context("Failed to create output directory")?;

    let dst_path = output_dir.join(BIN_NAME);
    fs::copy(&src_path, &dst_path).context("Failed to copy binary to output")?;
    println!("Artifact copied to: {}", dst_path.display());

    Ok(())
}

fn push(dest: &str) -> Result<()> {
    let local = Path::new(OUTPUT_DIR).join(BIN_NAME);
    if !local.exists() {
        bail!("{} not found, run `cargo xtask build` first", local.display());
    }

    let remote = format!("{dest}/{BIN_NAME}");
    let alias = format!("{dest}/{CLEAN_SCRATCH_ALIAS}");

    run(Command::new("adb").arg("root"), "adb root")?;
    run(
        Command::new("adb").arg("push").arg(&local).arg(&remote),
        "adb push",
    )?;
    run(
        Command::new("adb").args(["shell", "chmod", "0755", &remote]),
        "adb shell chmod",
    )?;
    run(
        Command::new("adb").args(["shell", "ln", "-sf", BIN_NAME, &alias]),
        "adb shell ln",
    )?;

    println!("Installed {remote} (and {alias})");
    Ok(())
}
