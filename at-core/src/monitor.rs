//! Performance monitor
//!
//! Polls the miner at a fixed interval without touching its settings and
//! optionally appends each snapshot to a CSV log. Runs until cancelled or
//! until the requested duration has passed.

use serde::Serialize;
use std::io::Write;
use tracing::{info, warn};

use crate::data::DeviceState;
use crate::device::DeviceGateway;
use crate::engine::Pacer;
use crate::error::{Result, TuneError};

#[derive(Debug, Serialize)]
struct MonitorRow {
    timestamp: String,
    voltage: u32,
    frequency: u32,
    hashrate: f64,
    temperature: f64,
    power: f64,
    efficiency: f64,
}

impl From<&DeviceState> for MonitorRow {
    fn from(s: &DeviceState) -> Self {
        Self {
            timestamp: s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            voltage: s.core_voltage_mv,
            frequency: s.frequency_mhz,
            hashrate: s.hashrate_ghs,
            temperature: s.temperature_c,
            power: s.power_w,
            efficiency: s.efficiency(),
        }
    }
}

/// Counts for a finished monitoring session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub readings: u64,
    pub failures: u64,
    pub warnings: u64,
}

pub struct PerformanceMonitor {
    pacer: Pacer,
    interval_secs: u64,
    duration_secs: Option<u64>,
    warning_temp_c: f64,
}

impl PerformanceMonitor {
    pub fn new(pacer: Pacer, interval_secs: u64, warning_temp_c: f64) -> Self {
        Self {
            pacer,
            interval_secs: interval_secs.max(1),
            duration_secs: None,
            warning_temp_c,
        }
    }

    /// Stop after `secs` seconds instead of running until cancelled.
    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Poll until cancelled or the duration elapses.
    ///
    /// Cancellation is the normal way to end an open-ended session and is
    /// not reported as an error.
    pub fn run<W: Write>(
        &self,
        gateway: &DeviceGateway,
        mut log: Option<&mut csv::Writer<W>>,
    ) -> Result<MonitorSummary> {
        info!(
            endpoint = %gateway.endpoint(),
            interval_secs = self.interval_secs,
            duration_secs = ?self.duration_secs,
            "Starting performance monitor"
        );
        let mut summary = MonitorSummary::default();
        let mut elapsed = 0u64;

        loop {
            if self.pacer.check().is_err() {
                break;
            }
            match gateway.read_state() {
                Ok(state) => {
                    summary.readings += 1;
                    info!(
                        settings = %state.settings(),
                        hashrate_ghs = state.hashrate_ghs,
                        temperature_c = state.temperature_c,
                        power_w = state.power_w,
                        efficiency = state.efficiency(),
                        "Reading"
                    );
                    if state.temperature_c > self.warning_temp_c {
                        summary.warnings += 1;
                        warn!(
                            temp = state.temperature_c,
                            limit = self.warning_temp_c,
                            "SAFETY: temperature above warning threshold"
                        );
                    }
                    if let Some(writer) = log.as_mut() {
                        write_row(writer, &state)?;
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(error = %e, "Failed to read miner");
                }
            }

            let wait = match self.duration_secs {
                Some(limit) if elapsed >= limit => break,
                Some(limit) => self.interval_secs.min(limit - elapsed),
                None => self.interval_secs,
            };
            if self.pacer.wait(wait).is_err() {
                break;
            }
            elapsed += wait;
        }

        info!(
            readings = summary.readings,
            failures = summary.failures,
            "Monitor stopped"
        );
        Ok(summary)
    }
}

fn write_row<W: Write>(writer: &mut csv::Writer<W>, state: &DeviceState) -> Result<()> {
    writer
        .serialize(MonitorRow::from(state))
        .map_err(|e| TuneError::Generic(format!("monitor log: {}", e)))?;
    writer.flush()?;
    Ok(())
}
