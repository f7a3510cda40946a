//! Configuration management
//!
//! Every threshold the engine uses lives in [`TunerConfig`]. It is loaded
//! once at start-up and handed to each component by value; nothing reads
//! thresholds from global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{device, fan, paths, safety, stability, sweep};
use crate::data::validation::validate_config;
use crate::engine::SearchPolicy;
use crate::error::{Result, TuneError};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub safety: SafetyLimits,
    #[serde(default)]
    pub stability: StabilityPolicy,
    #[serde(default)]
    pub fan: FanPolicy,
    #[serde(default)]
    pub sweep: SweepRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeviceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Hard thermal and electrical limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    #[serde(default = "default_temp_warning")]
    pub temp_warning_c: f64,
    #[serde(default = "default_temp_critical")]
    pub temp_critical_c: f64,
    #[serde(default = "default_temp_absolute")]
    pub temp_absolute_c: f64,
    #[serde(default = "default_vr_temp_max")]
    pub vr_temp_max_c: f64,
    #[serde(default = "default_power_max")]
    pub power_max_w: f64,
    /// GH/s per watt; 0 disables the check
    #[serde(default = "default_efficiency_min")]
    pub efficiency_min: f64,
    #[serde(default = "default_danger_voltage")]
    pub danger_voltage_mv: u32,
    #[serde(default = "default_voltage_ceiling")]
    pub voltage_ceiling_mv: u32,
    #[serde(default = "default_frequency_ceiling")]
    pub frequency_ceiling_mhz: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            temp_warning_c: default_temp_warning(),
            temp_critical_c: default_temp_critical(),
            temp_absolute_c: default_temp_absolute(),
            vr_temp_max_c: default_vr_temp_max(),
            power_max_w: default_power_max(),
            efficiency_min: default_efficiency_min(),
            danger_voltage_mv: default_danger_voltage(),
            voltage_ceiling_mv: default_voltage_ceiling(),
            frequency_ceiling_mhz: default_frequency_ceiling(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// How a sampling window is collected and judged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityPolicy {
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
    #[serde(default = "default_max_cv")]
    pub max_cv: f64,
    #[serde(default = "default_min_hashrate")]
    pub min_hashrate_ghs: f64,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            sample_interval_secs: default_sample_interval(),
            settle_secs: default_settle(),
            max_cv: default_max_cv(),
            min_hashrate_ghs: default_min_hashrate(),
        }
    }
}

impl StabilityPolicy {
    /// Derive the sample count from a total window length.
    ///
    /// Never drops below the two readings a verdict needs.
    pub fn with_duration(mut self, window_secs: u64) -> Self {
        let interval = self.sample_interval_secs.max(1);
        let count = (window_secs / interval) as u32;
        self.sample_count = count.max(stability::MIN_VALID_SAMPLES as u32);
        self
    }
}

/// One fan duty tier and the temperature that selects it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FanTier {
    pub at_c: f64,
    pub duty: u8,
}

/// Temperature to duty mapping
///
/// Below the first tier the fan runs at `min_duty`; at or above `max_at_c`
/// it is pinned to `max_duty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_duty")]
    pub min_duty: u8,
    /// Low, medium and high tiers in ascending order
    #[serde(default = "default_fan_tiers")]
    pub tiers: Vec<FanTier>,
    #[serde(default = "default_max_at")]
    pub max_at_c: f64,
    #[serde(default = "default_max_duty")]
    pub max_duty: u8,
    #[serde(default = "default_hysteresis")]
    pub hysteresis_c: f64,
}

impl Default for FanPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_duty: default_min_duty(),
            tiers: default_fan_tiers(),
            max_at_c: default_max_at(),
            max_duty: default_max_duty(),
            hysteresis_c: default_hysteresis(),
        }
    }
}

/// Ranges walked by the sweep, inclusive on both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    #[serde(default = "default_voltage_min")]
    pub voltage_min_mv: u32,
    #[serde(default = "default_voltage_max")]
    pub voltage_max_mv: u32,
    #[serde(default = "default_voltage_step")]
    pub voltage_step_mv: u32,
    #[serde(default = "default_frequency_min")]
    pub frequency_min_mhz: u32,
    #[serde(default = "default_frequency_max")]
    pub frequency_max_mhz: u32,
    #[serde(default = "default_frequency_step")]
    pub frequency_step_mhz: u32,
    #[serde(default)]
    pub policy: SearchPolicy,
}

impl Default for SweepRange {
    fn default() -> Self {
        Self {
            voltage_min_mv: default_voltage_min(),
            voltage_max_mv: default_voltage_max(),
            voltage_step_mv: default_voltage_step(),
            frequency_min_mhz: default_frequency_min(),
            frequency_max_mhz: default_frequency_max(),
            frequency_step_mhz: default_frequency_step(),
            policy: SearchPolicy::default(),
        }
    }
}

impl SweepRange {
    /// Upper bound on the number of candidates the range can produce
    pub fn candidate_count(&self) -> usize {
        let steps = |min: u32, max: u32, step: u32| -> usize {
            if step == 0 || max < min {
                0
            } else {
                ((max - min) / step + 1) as usize
            }
        };
        steps(self.voltage_min_mv, self.voltage_max_mv, self.voltage_step_mv)
            * steps(self.frequency_min_mhz, self.frequency_max_mhz, self.frequency_step_mhz)
    }
}

fn default_host() -> String {
    device::DEFAULT_HOST.to_string()
}
fn default_timeout_secs() -> u64 {
    device::HTTP_TIMEOUT.as_secs()
}
fn default_temp_warning() -> f64 {
    safety::TEMP_WARNING
}
fn default_temp_critical() -> f64 {
    safety::TEMP_CRITICAL
}
fn default_temp_absolute() -> f64 {
    safety::TEMP_ABSOLUTE
}
fn default_vr_temp_max() -> f64 {
    safety::VR_TEMP_MAX
}
fn default_power_max() -> f64 {
    safety::POWER_MAX
}
fn default_efficiency_min() -> f64 {
    safety::EFFICIENCY_MIN
}
fn default_danger_voltage() -> u32 {
    safety::DANGER_VOLTAGE
}
fn default_voltage_ceiling() -> u32 {
    safety::VOLTAGE_CEILING
}
fn default_frequency_ceiling() -> u32 {
    safety::FREQUENCY_CEILING
}
fn default_cooldown_secs() -> u64 {
    safety::EMERGENCY_COOLDOWN_SECS
}
fn default_sample_count() -> u32 {
    stability::SAMPLE_COUNT
}
fn default_sample_interval() -> u64 {
    stability::SAMPLE_INTERVAL_SECS
}
fn default_settle() -> u64 {
    stability::SETTLE_SECS
}
fn default_max_cv() -> f64 {
    stability::MAX_CV
}
fn default_min_hashrate() -> f64 {
    stability::MIN_HASHRATE
}
fn default_true() -> bool {
    true
}
fn default_min_duty() -> u8 {
    fan::MIN_DUTY
}
fn default_fan_tiers() -> Vec<FanTier> {
    vec![
        FanTier { at_c: fan::LOW_AT, duty: fan::LOW_DUTY },
        FanTier { at_c: fan::MEDIUM_AT, duty: fan::MEDIUM_DUTY },
        FanTier { at_c: fan::HIGH_AT, duty: fan::HIGH_DUTY },
    ]
}
fn default_max_at() -> f64 {
    fan::MAX_AT
}
fn default_max_duty() -> u8 {
    fan::MAX_DUTY
}
fn default_hysteresis() -> f64 {
    fan::HYSTERESIS
}
fn default_voltage_min() -> u32 {
    sweep::VOLTAGE_MIN
}
fn default_voltage_max() -> u32 {
    sweep::VOLTAGE_MAX
}
fn default_voltage_step() -> u32 {
    sweep::VOLTAGE_STEP
}
fn default_frequency_min() -> u32 {
    sweep::FREQUENCY_MIN
}
fn default_frequency_max() -> u32 {
    sweep::FREQUENCY_MAX
}
fn default_frequency_step() -> u32 {
    sweep::FREQUENCY_STEP
}

/// Default config file location
pub fn get_config_path() -> Option<PathBuf> {
    paths::user_config_file()
}

/// Load and validate a config file.
///
/// A missing file yields defaults; a malformed or invalid one is an error.
pub fn load_config(path: &Path) -> Result<TunerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TunerConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| TuneError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: TunerConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Load from `path` if given, otherwise from the user config directory.
pub fn load_config_or_default(path: Option<&Path>) -> Result<TunerConfig> {
    match path {
        Some(p) => load_config(p),
        None => match get_config_path() {
            Some(p) => load_config(&p),
            None => Ok(TunerConfig::default()),
        },
    }
}

pub fn save_config(path: &Path, config: &TunerConfig) -> Result<()> {
    validate_config(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TuneError::FileWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).map_err(|e| TuneError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, TunerConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"device": {"host": "10.0.0.7"}, "stability": {"max_cv": 0.1}}"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.device.host, "10.0.0.7");
        assert_eq!(config.device.timeout_secs, 10);
        assert_eq!(config.stability.max_cv, 0.1);
        assert_eq!(config.stability.sample_count, 10);
        assert_eq!(config.safety.temp_absolute_c, 75.0);
        assert_eq!(config.fan.tiers.len(), 3);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"safety": {"temp_critical_c": 90.0}}"#).unwrap();
        assert!(matches!(
            load_config(&path),
            Err(TuneError::InvalidConfig { .. })
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config(&path), Err(TuneError::JsonParse(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = TunerConfig::default();
        config.sweep.policy = SearchPolicy::ClimbFrequency;
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_with_duration_keeps_two_samples() {
        let policy = StabilityPolicy::default().with_duration(300);
        assert_eq!(policy.sample_count, 10);
        let policy = StabilityPolicy::default().with_duration(10);
        assert_eq!(policy.sample_count, 2);
    }

    #[test]
    fn test_candidate_count() {
        let range = SweepRange {
            voltage_min_mv: 1100,
            voltage_max_mv: 1150,
            voltage_step_mv: 25,
            frequency_min_mhz: 600,
            frequency_max_mhz: 650,
            frequency_step_mhz: 25,
            policy: SearchPolicy::FrequencyFirst,
        };
        assert_eq!(range.candidate_count(), 9);
    }
}
