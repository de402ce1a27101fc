// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use anyhow::{Result, ensure};
use log::{error, info, warn};

use super::{
    executor,
    prepare::{self, Prepared},
    selection,
    status::{Outcome, RemountStatus},
};
use crate::{
    defs,
    fstab::{self, Fstab},
    services::Services,
    sys::retry::RetryPolicy,
};

pub struct Init;

pub struct Verified;

pub struct Loaded {
    pub fstab: Fstab,
}

pub struct Selected {
    pub fstab: Fstab,
    pub partitions: Fstab,
}

pub struct PreparedState {
    pub fstab: Fstab,
    pub prepared: Prepared,
}

/// Drives one remount run through its stages. Each stage either hands over to
/// the next or ends the run with a status.
pub struct RemountController<'a, S> {
    services: Services<'a>,
    retry: RetryPolicy,
    state: S,
}

impl<'a, S> RemountController<'a, S> {
    fn advance<N>(self, state: N) -> RemountController<'a, N> {
        RemountController {
            services: self.services,
            retry: self.retry,
            state,
        }
    }
}

impl<'a> RemountController<'a, Init> {
    pub fn new(services: Services<'a>, retry: RetryPolicy) -> Self {
        Self {
            services,
            retry,
            state: Init,
        }
    }

    /// Refuses to run while a virtual A/B checkpoint is pending.
    pub fn verify_checkpoint(self) -> Result<RemountController<'a, Verified>, RemountStatus> {
        let props = self.services.props;
        if !props.get_bool(defs::PROP_VIRTUAL_AB, false)
            && !props.get_bool(defs::PROP_VIRTUAL_AB_RETROFIT, false)
        {
            return Ok(self.advance(Verified));
        }

        let checkpoint = self.services.checkpoint;
        let reachable = self.retry.run(|attempt| {
            if checkpoint.is_available() {
                return Some(());
            }
            if attempt == 1 {
                info!("Waiting for vold");
            }
            None
        });
        if reachable.is_none() {
            error!("Could not reach vold.");
            return Err(RemountStatus::BinderError);
        }

        match checkpoint.is_checkpointing() {
            Ok(false) => Ok(self.advance(Verified)),
            Ok(true) => {
                error!("Cannot use remount when a checkpoint is in progress.");
                Err(RemountStatus::Checkpointing)
            }
            Err(e) => {
                error!("Could not determine checkpointing status: {e:#}");
                Err(RemountStatus::BinderError)
            }
        }
    }
}

impl<'a> RemountController<'a, Verified> {
    pub fn load_fstab(self, custom: Option<&Path>) -> Result<RemountController<'a, Loaded>> {
        let fstab = fstab::source::load(self.services.fstab, custom)?;
        ensure!(!fstab.is_empty(), "Failed to read fstab: table is empty");

        log::debug!("fstab has {} entries", fstab.len());
        Ok(self.advance(Loaded { fstab }))
    }
}

impl<'a> RemountController<'a, Loaded> {
    pub fn select(self, args: &[String]) -> Result<RemountController<'a, Selected>, RemountStatus> {
        let partitions = selection::select(&self.services, &self.state.fstab, args)?;
        let fstab = self.state.fstab;
        Ok(RemountController {
            services: self.services,
            retry: self.retry,
            state: Selected { fstab, partitions },
        })
    }

    /// Runs every remaining stage and returns the merged outcome.
    pub fn remount(self, args: &[String]) -> Outcome {
        match self.select(args) {
            Ok(selected) => selected.prepare().execute(),
            Err(status) => Outcome::failed(status),
        }
    }
}

impl<'a> RemountController<'a, Selected> {
    pub fn prepare(self) -> RemountController<'a, PreparedState> {
        let Selected { fstab, partitions } = self.state;
        let prepared = prepare::prepare(&self.services, partitions);
        RemountController {
            services: self.services,
            retry: self.retry,
            state: PreparedState { fstab, prepared },
        }
    }
}

impl RemountController<'_, PreparedState> {
    pub fn execute(self) -> Outcome {
        let PreparedState { fstab, prepared } = self.state;

        // Freshly disabled verity only takes effect after a reboot.
        if prepared.surviving.is_empty() || prepared.result.disabled_verity {
            if prepared.surviving.is_empty() {
                warn!("No remountable partitions were found.");
            }
            return Outcome {
                status: prepared.status,
                result: prepared.result,
            };
        }

        let executed =
            executor::execute(&self.services, &fstab, &prepared.surviving, prepared.status);
        Outcome {
            status: executed.status,
            result: prepared.result.merged(executed.result),
        }
    }
}
