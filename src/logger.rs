/*
 * This file is part of axetune.
 *
 * Copyright (C) 2025 axetune contributors
 *
 * axetune is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * axetune is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with axetune. If not, see <https://www.gnu.org/licenses/>.
 */

//! Logging setup
//!
//! Human-readable `tracing` output to stdout, optionally mirrored without
//! colour codes into a log file.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "AXETUNE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Filter from `AXETUNE_LOG`, or `info` when unset or unparsable.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_level(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}
