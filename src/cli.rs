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

//! Command Line Interface
//!
//! Argument parsing and the mapping from flags onto a `TunerConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use at_core::{SearchPolicy, TunerConfig};

#[derive(Parser, Debug)]
#[command(name = "axetune")]
#[command(version)]
#[command(about = "axetune - Safety-bounded tuning for BitAxe miners")]
#[command(long_about = "axetune - Safety-bounded tuning for BitAxe miners

Sweeps core frequency and voltage over a bounded grid, measures hash-rate
stability at each point under live thermal and power limits, and always
leaves the miner either on the best stable point or on its original settings.

EXAMPLES:
    axetune status                                 Print one reading as JSON
    axetune sweep                                  Sweep the configured range
    axetune sweep --frequency-min 550 --frequency-max 650 --sample-duration 300
    axetune sweep --policy climb-frequency --auto-apply
    axetune --simulate sweep                       Dry run against a simulated miner
    axetune apply-csv axetune_results_20250101_120000.csv --dry-run
    axetune monitor --interval 60 --duration 3600 --log-file perf.csv

ENVIRONMENT VARIABLES:
    AXETUNE_LOG=debug      Log filter (default: info)

FILES:
    ~/.config/axetune/config.json          Limits, sampling and sweep defaults
    ./axetune_results_<timestamp>.csv      Results written after each sweep")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Miner address (overrides the config file)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long = "log-to", id = "log_to", global = true)]
    pub log_to: Option<PathBuf>,

    /// Talk to an in-process simulated miner with a virtual clock
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a frequency/voltage sweep
    Sweep(SweepArgs),

    /// Apply the best stable row from a results file
    ApplyCsv {
        /// Results file written by a previous sweep
        file: PathBuf,

        /// Show what would be applied without touching the miner
        #[arg(long)]
        dry_run: bool,
    },

    /// Log miner performance at a fixed interval
    Monitor {
        /// Seconds between readings
        #[arg(long, default_value_t = at_core::constants::timing::MONITOR_INTERVAL_SECS)]
        interval: u64,

        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// CSV file to append readings to
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Print one reading as JSON
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    FrequencyFirst,
    ClimbFrequency,
}

impl From<PolicyArg> for SearchPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::FrequencyFirst => SearchPolicy::FrequencyFirst,
            PolicyArg::ClimbFrequency => SearchPolicy::ClimbFrequency,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    #[arg(long)]
    pub voltage_min: Option<u32>,
    #[arg(long)]
    pub voltage_max: Option<u32>,
    #[arg(long)]
    pub voltage_step: Option<u32>,
    #[arg(long)]
    pub frequency_min: Option<u32>,
    #[arg(long)]
    pub frequency_max: Option<u32>,
    #[arg(long)]
    pub frequency_step: Option<u32>,

    /// Length of each stability window in seconds
    #[arg(long)]
    pub sample_duration: Option<u64>,

    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Apply the best result without asking
    #[arg(long)]
    pub auto_apply: bool,

    /// Where the results CSV is written
    #[arg(long, default_value = ".")]
    pub results_dir: PathBuf,
}

impl SweepArgs {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_to(&self, config: &mut TunerConfig) {
        let range = &mut config.sweep;
        let overrides = [
            (&mut range.voltage_min_mv, self.voltage_min),
            (&mut range.voltage_max_mv, self.voltage_max),
            (&mut range.voltage_step_mv, self.voltage_step),
            (&mut range.frequency_min_mhz, self.frequency_min),
            (&mut range.frequency_max_mhz, self.frequency_max),
            (&mut range.frequency_step_mhz, self.frequency_step),
        ];
        for (field, value) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }
        if let Some(policy) = self.policy {
            range.policy = policy.into();
        }
        if let Some(secs) = self.sample_duration {
            config.stability = config.stability.clone().with_duration(secs);
        }
    }
}

impl Cli {
    /// Global flags that change the loaded configuration
    pub fn apply_to(&self, config: &mut TunerConfig) {
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Commands::Sweep(args) = &self.command {
            args.apply_to(config);
        }
    }
}
