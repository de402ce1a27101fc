// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Write;

use anyhow::{Context, Result};
use log::{LevelFilter, Log, Metadata, Record};

const SYSTEM_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// A second log destination with its own level, independent of `-v`.
struct SystemSink {
    logger: Box<dyn Log>,
    level: LevelFilter,
}

#[cfg(target_os = "android")]
fn system_sink() -> Option<SystemSink> {
    let logger = android_logger::AndroidLogger::new(
        android_logger::Config::default()
            .with_max_level(SYSTEM_LOG_LEVEL)
            .with_tag("remount"),
    );
    Some(SystemSink {
        logger: Box::new(logger),
        level: SYSTEM_LOG_LEVEL,
    })
}

#[cfg(not(target_os = "android"))]
fn system_sink() -> Option<SystemSink> {
    None
}

/// Stderr filtered by the requested verbosity, plus logd (on Android) which
/// receives everything up to debug.
struct TeeLogger {
    stderr: env_logger::Logger,
    system: Option<SystemSink>,
}

impl TeeLogger {
    fn max_level(&self) -> LevelFilter {
        let stderr = self.stderr.filter();
        match &self.system {
            Some(sink) => stderr.max(sink.level),
            None => stderr,
        }
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.stderr.enabled(metadata)
            || self
                .system
                .as_ref()
                .is_some_and(|sink| metadata.level() <= sink.level)
    }

    fn log(&self, record: &Record) {
        if self.stderr.enabled(record.metadata()) {
            self.stderr.log(record);
        }
        if let Some(sink) = &self.system
            && record.level() <= sink.level
        {
            sink.logger.log(record);
        }
    }

    fn flush(&self) {
        self.stderr.flush();
        if let Some(sink) = &self.system {
            sink.logger.flush();
        }
    }
}

pub fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn build_logger(level: LevelFilter, system: Option<SystemSink>) -> TeeLogger {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| {
        if record.level() <= log::Level::Warn {
            writeln!(buf, "{}: {}", record.level(), record.args())
        } else {
            writeln!(buf, "{}", record.args())
        }
    });
    builder.filter_level(level);

    TeeLogger {
        stderr: builder.build(),
        system,
    }
}

pub fn init_logging(verbose: bool) -> Result<()> {
    let logger = build_logger(log_level(verbose), system_sink());
    let max_level = logger.max_level();

    log::set_boxed_logger(Box::new(logger)).context("Logger already initialized")?;
    log::set_max_level(max_level);
    Ok(())
}

/// Installs only the system log, for runs whose stderr nobody reads.
pub fn init_system_logging() {
    let Some(sink) = system_sink() else {
        return;
    };
    if log::set_boxed_logger(sink.logger).is_ok() {
        log::set_max_level(sink.level);
    }
}
