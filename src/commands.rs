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

//! Subcommand implementations
//!
//! Each command returns the process exit status; errors that should end
//! the process are returned through `anyhow`.

use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};

use at_core::{
    load_results, save_results, select_best, CancelToken, CandidateConfig, Clock,
    DeviceGateway, HttpTransport, Operator, Pacer, PerformanceMonitor, SettingsManager,
    SimulatedDevice, SweepController, SystemClock, Transport, TunerConfig, VirtualClock,
};

use crate::cli::SweepArgs;
use crate::operator::ConsoleOperator;

/// Settings a freshly simulated miner boots with
const SIMULATED_START: CandidateConfig = CandidateConfig {
    frequency_mhz: 525,
    core_voltage_mv: 1150,
};

/// Everything a command needs to talk to one miner
pub struct Session {
    pub config: TunerConfig,
    pub gateway: DeviceGateway,
    pub pacer: Pacer,
}

impl Session {
    /// Connect to the configured miner, or to a simulated one running on a
    /// virtual clock.
    pub fn open(config: TunerConfig, simulate: bool, cancel: CancelToken) -> Self {
        let (transport, clock): (Box<dyn Transport>, Arc<dyn Clock>) = if simulate {
            info!("Using simulated miner; no hardware will be touched");
            (
                Box::new(SimulatedDevice::new(SIMULATED_START)),
                Arc::new(VirtualClock::new()),
            )
        } else {
            (
                Box::new(HttpTransport::new(&config.device.host, config.device.timeout())),
                Arc::new(SystemClock),
            )
        };
        Self::with_transport(config, transport, clock, cancel)
    }

    pub fn with_transport(
        config: TunerConfig,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Self {
        let gateway = DeviceGateway::new(transport, Arc::clone(&clock));
        let pacer = Pacer::new(clock, cancel);
        Self {
            config,
            gateway,
            pacer,
        }
    }
}

// ============================================================================
// Status Command
// ============================================================================

pub fn cmd_status(session: &Session, out: &mut impl Write) -> anyhow::Result<i32> {
    let state = session
        .gateway
        .read_state()
        .with_context(|| format!("reading {}", session.gateway.endpoint()))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
    Ok(0)
}

// ============================================================================
// Sweep Command
// ============================================================================

pub fn cmd_sweep<R: BufRead, W: Write>(
    session: Session,
    args: &SweepArgs,
    operator: &mut ConsoleOperator<R, W>,
) -> anyhow::Result<i32> {
    if !operator.acknowledge_risks(session.config.safety.danger_voltage_mv) {
        info!("Operator declined the risk acknowledgment, nothing changed");
        return Ok(1);
    }

    let Session {
        config,
        gateway,
        pacer,
    } = session;
    let report = SweepController::new(config, gateway, pacer).run(operator);

    match save_results(&args.results_dir, &report.results) {
        Ok(Some(path)) => info!(path = %path.display(), "Results written"),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Failed to save results"),
    }

    let out = operator.output();
    writeln!(out)?;
    writeln!(out, "Sweep results")?;
    writeln!(out, "=============")?;
    for r in &report.results {
        writeln!(
            out,
            "{:<14} {:>8.1} GH/s  cv {:>6.3}  {:>5.1}°C  {:>5.1}W  {}",
            r.candidate.to_string(),
            r.mean_hashrate_ghs,
            r.coefficient_of_variation,
            r.temperature_c,
            r.power_w,
            r.outcome
        )?;
    }
    writeln!(out, "Status: {:?}", report.status)?;
    writeln!(out, "Final:  {}", report.final_action)?;
    Ok(report.exit_code())
}

// ============================================================================
// Apply-from-CSV Command
// ============================================================================

pub fn cmd_apply_csv<R: BufRead, W: Write>(
    session: Session,
    file: &Path,
    dry_run: bool,
    operator: &mut ConsoleOperator<R, W>,
) -> anyhow::Result<i32> {
    let results = load_results(file)?;
    let best = match select_best(&results) {
        Some(best) => best,
        None => bail!("{} contains no stable configuration", file.display()),
    };
    let candidate = best.candidate;
    let limits = &session.config.safety;
    if candidate.core_voltage_mv > limits.voltage_ceiling_mv
        || candidate.frequency_mhz > limits.frequency_ceiling_mhz
    {
        bail!(
            "{} exceeds the hard ceiling of {}MHz@{}mV",
            candidate,
            limits.frequency_ceiling_mhz,
            limits.voltage_ceiling_mv
        );
    }

    writeln!(
        operator.output(),
        "Best stable row: {} at {:.1} GH/s ({} rows read)",
        candidate,
        best.mean_hashrate_ghs,
        results.len()
    )?;
    if dry_run {
        writeln!(operator.output(), "Dry run: {} would be applied", candidate)?;
        return Ok(0);
    }
    if candidate.core_voltage_mv >= limits.danger_voltage_mv
        && !operator.confirm_danger_voltage(candidate, limits.danger_voltage_mv)
    {
        return Ok(1);
    }
    if !operator.confirm(&format!("Apply {} to {}?", candidate, session.gateway.endpoint())) {
        info!("Operator declined, nothing changed");
        return Ok(0);
    }

    let settle = session.config.stability.settle_secs;
    let manager = SettingsManager::new(session.gateway, session.pacer, settle);
    match manager.commit(candidate) {
        Ok(()) => {
            info!(settings = %candidate, "Applied settings from results file");
            Ok(0)
        }
        Err(e) => {
            error!(settings = %candidate, error = %e, "Failed to apply settings");
            Ok(3)
        }
    }
}

// ============================================================================
// Monitor Command
// ============================================================================

pub fn cmd_monitor(
    session: &Session,
    interval: u64,
    duration: Option<u64>,
    log_file: Option<&Path>,
) -> anyhow::Result<i32> {
    let mut monitor = PerformanceMonitor::new(
        session.pacer.clone(),
        interval,
        session.config.safety.temp_warning_c,
    );
    if let Some(secs) = duration {
        monitor = monitor.with_duration(secs);
    }

    let summary = match log_file {
        Some(path) => {
            let fresh = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(fresh)
                .from_writer(file);
            monitor.run(&session.gateway, Some(&mut writer))?
        }
        None => monitor.run::<std::fs::File>(&session.gateway, None)?,
    };

    if summary.readings == 0 {
        warn!("No readings were collected");
        return Ok(1);
    }
    Ok(0)
}
