//! Core data types for axetune
//!
//! Snapshots read from the device and the records a sweep produces.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use at_protocol::InfoResponse;

/// One snapshot of the miner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub frequency_mhz: u32,
    pub core_voltage_mv: u32,
    pub temperature_c: f64,
    pub vr_temperature_c: f64,
    pub hashrate_ghs: f64,
    pub power_w: f64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub uptime_secs: u64,
    pub fan_duty: u8,
    /// GH/s per watt, derived at construction
    efficiency: f64,
    pub timestamp: DateTime<Local>,
}

/// Raw readings used to build a [`DeviceState`]
#[derive(Debug, Clone, Default)]
pub struct Reading {
    pub frequency_mhz: u32,
    pub core_voltage_mv: u32,
    pub temperature_c: f64,
    pub vr_temperature_c: f64,
    pub hashrate_ghs: f64,
    pub power_w: f64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub uptime_secs: u64,
    pub fan_duty: u8,
}

impl DeviceState {
    pub fn new(reading: Reading) -> Self {
        Self::at(reading, Local::now())
    }

    pub fn at(reading: Reading, timestamp: DateTime<Local>) -> Self {
        let efficiency = if reading.power_w > 0.0 {
            reading.hashrate_ghs / reading.power_w
        } else {
            0.0
        };
        Self {
            frequency_mhz: reading.frequency_mhz,
            core_voltage_mv: reading.core_voltage_mv,
            temperature_c: reading.temperature_c,
            vr_temperature_c: reading.vr_temperature_c,
            hashrate_ghs: reading.hashrate_ghs,
            power_w: reading.power_w,
            shares_accepted: reading.shares_accepted,
            shares_rejected: reading.shares_rejected,
            uptime_secs: reading.uptime_secs,
            fan_duty: reading.fan_duty,
            efficiency,
            timestamp,
        }
    }

    /// Hash rate per watt; 0 when the device reports no power draw.
    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn settings(&self) -> CandidateConfig {
        CandidateConfig::new(self.frequency_mhz, self.core_voltage_mv)
    }
}

impl From<&InfoResponse> for Reading {
    fn from(info: &InfoResponse) -> Self {
        Self {
            frequency_mhz: non_negative(info.frequency).round() as u32,
            core_voltage_mv: non_negative(info.core_voltage).round() as u32,
            temperature_c: info.temp,
            vr_temperature_c: info.vr_temp,
            hashrate_ghs: info.hash_rate,
            power_w: info.power,
            shares_accepted: non_negative(info.shares_accepted) as u64,
            shares_rejected: non_negative(info.shares_rejected) as u64,
            uptime_secs: non_negative(info.uptime_seconds) as u64,
            fan_duty: non_negative(info.fanspeed).min(100.0).round() as u8,
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// A (frequency, core voltage) pair under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub frequency_mhz: u32,
    pub core_voltage_mv: u32,
}

impl CandidateConfig {
    pub fn new(frequency_mhz: u32, core_voltage_mv: u32) -> Self {
        Self {
            frequency_mhz,
            core_voltage_mv,
        }
    }
}

impl fmt::Display for CandidateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz@{}mV", self.frequency_mhz, self.core_voltage_mv)
    }
}

/// Settings captured before the first candidate is applied
pub type OriginalSettings = CandidateConfig;

/// Why a trial ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTag {
    /// First stable voltage found for a frequency
    StableMinVoltage,
    Stable,
    /// Stable at the top of the frequency range
    FreqLimitReached,
    Unstable,
    /// Fewer than two valid readings in the window
    InsufficientData,
    /// A trial-level safety limit was crossed
    SafetyAbort,
}

impl OutcomeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::StableMinVoltage => "stable_min_voltage",
            OutcomeTag::Stable => "stable",
            OutcomeTag::FreqLimitReached => "freq_limit_reached",
            OutcomeTag::Unstable => "unstable",
            OutcomeTag::InsufficientData => "insufficient_data",
            OutcomeTag::SafetyAbort => "safety_abort",
        }
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permanent record of one tested candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub timestamp: DateTime<Local>,
    pub candidate: CandidateConfig,
    pub mean_hashrate_ghs: f64,
    pub coefficient_of_variation: f64,
    pub temperature_c: f64,
    pub power_w: f64,
    pub stable: bool,
    pub outcome: OutcomeTag,
}
