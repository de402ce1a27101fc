// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later
mod conf;
mod core;
mod defs;
mod fstab;
mod mount;
mod services;
mod sys;
mod utils;

use std::{env, path::Path, process::ExitCode};

use anyhow::{Context, Result, bail};
use clap::Parser;
use conf::{
    cli::{Cli, Commands},
    cli_handlers,
};
use mimalloc::MiMalloc;

use crate::{
    core::{RemountController, RemountStatus, report},
    fstab::SystemFstab,
    mount::OverlayFs,
    services::{
        DsuService, Services, checkpoint::VoldCheckpoint, dsu::GsiTool, verity::AvbVerity,
    },
    sys::{
        block::LinuxBlockLayer,
        props::{AndroidProperties, PropertyStore},
    },
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn invoked_as_clean_scratch() -> bool {
    env::args_os()
        .next()
        .and_then(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name == defs::CLEAN_SCRATCH_NAME)
        })
        .unwrap_or(false)
}

fn check_preconditions(props: &dyn PropertyStore) -> Result<()> {
    if !rustix::process::getuid().is_root() {
        bail!("Not running as root. Try \"adb root\" first.");
    }

    if !props.get_bool(defs::PROP_DEBUGGABLE, false) {
        bail!("Device must be userdebug build");
    }

    if props.get(defs::PROP_DEVICE_STATE).as_deref() == Some("locked") {
        bail!("Device must be bootloader unlocked");
    }

    Ok(())
}

fn run(cli: &Cli) -> Result<RemountStatus> {
    if let Some(command) = &cli.command {
        match command {
            Commands::GenConfig { output } => cli_handlers::handle_gen_config(output)?,
            Commands::ShowConfig => cli_handlers::handle_show_config(cli)?,
            Commands::CleanScratch => cli_handlers::handle_clean_scratch(cli)?,
        }

        return Ok(RemountStatus::Success);
    }

    let mut config = cli_handlers::load_config(cli)?;
    config.merge_with_cli(cli.fstab.clone(), cli.reboot, cli.verbose);

    utils::init_logging(config.verbose)?;

    let props = AndroidProperties;
    check_preconditions(&props)?;

    let fstab_source = SystemFstab::new(&props);
    let checkpoint = VoldCheckpoint;
    let verity = AvbVerity::new(&config.by_name_dir);
    let overlay = OverlayFs::new(&config.overlay_dir, &verity);
    let block = LinuxBlockLayer::new(defs::MAPPER_DIR);
    let dsu = GsiTool::connect(&props);

    let services = Services {
        fstab: &fstab_source,
        props: &props,
        checkpoint: &checkpoint,
        verity: &verity,
        overlay: &overlay,
        dsu: dsu.as_ref().map(|dsu| dsu as &dyn DsuService),
        block: &block,
    };

    let verified = match RemountController::new(services, config.service_retry.policy())
        .verify_checkpoint()
    {
        Ok(verified) => verified,
        Err(status) => return Ok(status),
    };

    let outcome = verified
        .load_fstab(config.fstab.as_deref())
        .context("Failed to read fstab")?
        .remount(&cli.partitions);

    report::finalize(
        &outcome,
        services.props,
        services.dsu,
        config.auto_reboot,
        config.reboot_timeout(),
    )
}

fn main() -> ExitCode {
    // The daemon that runs this discards stdout and stderr, so stay quiet.
    if invoked_as_clean_scratch() {
        utils::init_system_logging();
        cli_handlers::clean_scratch_silently();
        return ExitCode::SUCCESS;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(defs::EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&cli) {
        Ok(status) => ExitCode::from(status.code() as u8),
        Err(e) => {
            if log::log_enabled!(log::Level::Error) {
                log::error!("{e:#}");
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(defs::EXIT_FAILURE)
        }
    }
}
