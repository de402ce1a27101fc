// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    conf::{cli::Cli, config::Config},
    defs,
    mount::OverlayFs,
    services::{OverlayService, verity::AvbVerity},
};

pub fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(config_path) = &cli.config {
        return Config::from_file(config_path).with_context(|| {
            format!(
                "Failed to load config from custom path: {}",
                config_path.display()
            )
        });
    }

    load_default_config()
}

/// The default config file, or built-in defaults when it does not exist.
pub fn load_default_config() -> Result<Config> {
    match Config::load_default() {
        Ok(config) => Ok(config),
        Err(e) => {
            let is_not_found = e
                .root_cause()
                .downcast_ref::<std::io::Error>()
                .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                .unwrap_or(false);

            if is_not_found {
                Ok(Config::default())
            } else {
                Err(e).context(format!(
                    "Failed to load default config from {}",
                    defs::CONFIG_FILE
                ))
            }
        }
    }
}

pub fn handle_gen_config(output: &Path) -> Result<()> {
    Config::default()
        .save_to_file(output)
        .with_context(|| format!("Failed to save generated config to {}", output.display()))
}

pub fn handle_show_config(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    config.merge_with_cli(cli.fstab.clone(), cli.reboot, cli.verbose);

    let json = serde_json::to_string(&config).context("Failed to serialize config to JSON")?;

    println!("{}", json);

    Ok(())
}

pub fn clean_scratch(config: &Config) -> Result<()> {
    let verity = AvbVerity::new(&config.by_name_dir);

    OverlayFs::new(&config.overlay_dir, &verity)
        .cleanup_stale_state()
        .context("Failed to clean up overlay scratch state")
}

pub fn handle_clean_scratch(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    clean_scratch(&config)
}

/// Cleanup for the `clean_scratch_files` alias. Failures only reach the log.
pub fn clean_scratch_silently() -> bool {
    match load_default_config() {
        Ok(config) => {
            let verity = AvbVerity::new(&config.by_name_dir);
            cleanup_or_log(&OverlayFs::new(&config.overlay_dir, &verity))
        }
        Err(e) => {
            log::debug!("clean_scratch_files: {e:#}");
            false
        }
    }
}

fn cleanup_or_log(overlay: &dyn OverlayService) -> bool {
    match overlay.cleanup_stale_state() {
        Ok(()) => true,
        Err(e) => {
            log::debug!("clean_scratch_files: failed to clean up overlay scratch state: {e:#}");
            false
        }
    }
}
