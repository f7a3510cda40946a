//! Configuration and input validation for axetune
//!
//! Everything the operator or a config file supplies is checked here before
//! it reaches the engine. A range that strays outside the hard ceilings is
//! rejected outright, never clamped.

use crate::data::config::{FanPolicy, SafetyLimits, StabilityPolicy, SweepRange, TunerConfig};
use crate::error::{Result, TuneError};

/// Validate a complete configuration.
pub fn validate_config(config: &TunerConfig) -> Result<()> {
    if config.device.host.trim().is_empty() {
        return Err(TuneError::invalid_config("device.host", "must not be empty"));
    }
    if config.device.timeout_secs == 0 {
        return Err(TuneError::invalid_config(
            "device.timeout_secs",
            "must be at least 1",
        ));
    }
    validate_safety_limits(&config.safety)?;
    validate_stability_policy(&config.stability)?;
    validate_fan_policy(&config.fan)?;
    validate_sweep_range(&config.sweep, &config.safety)?;
    Ok(())
}

/// Thresholds must escalate: warning < critical < absolute.
pub fn validate_safety_limits(limits: &SafetyLimits) -> Result<()> {
    if !(limits.temp_warning_c < limits.temp_critical_c
        && limits.temp_critical_c < limits.temp_absolute_c)
    {
        return Err(TuneError::invalid_config(
            "safety",
            format!(
                "temperatures must escalate warning < critical < absolute (got {} / {} / {})",
                limits.temp_warning_c, limits.temp_critical_c, limits.temp_absolute_c
            ),
        ));
    }
    if limits.vr_temp_max_c <= 0.0 {
        return Err(TuneError::invalid_config("safety.vr_temp_max_c", "must be positive"));
    }
    if limits.power_max_w <= 0.0 {
        return Err(TuneError::invalid_config("safety.power_max_w", "must be positive"));
    }
    if limits.efficiency_min < 0.0 {
        return Err(TuneError::invalid_config(
            "safety.efficiency_min",
            "must not be negative",
        ));
    }
    if limits.danger_voltage_mv > limits.voltage_ceiling_mv {
        return Err(TuneError::invalid_config(
            "safety.danger_voltage_mv",
            "must not exceed the voltage ceiling",
        ));
    }
    Ok(())
}

pub fn validate_stability_policy(policy: &StabilityPolicy) -> Result<()> {
    if policy.sample_count < 2 {
        return Err(TuneError::invalid_config(
            "stability.sample_count",
            "at least 2 samples are needed to judge stability",
        ));
    }
    if policy.max_cv.is_nan() || policy.max_cv <= 0.0 {
        return Err(TuneError::invalid_config("stability.max_cv", "must be positive"));
    }
    if policy.min_hashrate_ghs < 0.0 {
        return Err(TuneError::invalid_config(
            "stability.min_hashrate_ghs",
            "must not be negative",
        ));
    }
    Ok(())
}

/// Breakpoints must ascend strictly and stay below the forced maximum.
pub fn validate_fan_policy(policy: &FanPolicy) -> Result<()> {
    if policy.max_duty > 100 || policy.min_duty > policy.max_duty {
        return Err(TuneError::invalid_config(
            "fan",
            "duties must satisfy min_duty <= max_duty <= 100",
        ));
    }
    if policy.hysteresis_c < 0.0 {
        return Err(TuneError::invalid_config("fan.hysteresis_c", "must not be negative"));
    }

    let mut prev_at = f64::NEG_INFINITY;
    let mut prev_duty = policy.min_duty;
    for (i, tier) in policy.tiers.iter().enumerate() {
        if tier.at_c <= prev_at {
            return Err(TuneError::invalid_config(
                format!("fan.tiers[{}].at_c", i),
                "breakpoints must ascend",
            ));
        }
        if tier.duty < prev_duty || tier.duty > policy.max_duty {
            return Err(TuneError::invalid_config(
                format!("fan.tiers[{}].duty", i),
                "duties must not decrease with temperature",
            ));
        }
        prev_at = tier.at_c;
        prev_duty = tier.duty;
    }
    if policy.max_at_c <= prev_at {
        return Err(TuneError::invalid_config(
            "fan.max_at_c",
            "must lie above the highest tier breakpoint",
        ));
    }
    Ok(())
}

/// The requested range must be well-formed and inside the hard ceilings.
pub fn validate_sweep_range(range: &SweepRange, limits: &SafetyLimits) -> Result<()> {
    if range.voltage_step_mv == 0 {
        return Err(TuneError::invalid_config("sweep.voltage_step_mv", "must be non-zero"));
    }
    if range.frequency_step_mhz == 0 {
        return Err(TuneError::invalid_config(
            "sweep.frequency_step_mhz",
            "must be non-zero",
        ));
    }
    if range.voltage_min_mv == 0 || range.voltage_min_mv > range.voltage_max_mv {
        return Err(TuneError::invalid_config(
            "sweep.voltage",
            format!(
                "invalid range {}-{} mV",
                range.voltage_min_mv, range.voltage_max_mv
            ),
        ));
    }
    if range.frequency_min_mhz == 0 || range.frequency_min_mhz > range.frequency_max_mhz {
        return Err(TuneError::invalid_config(
            "sweep.frequency",
            format!(
                "invalid range {}-{} MHz",
                range.frequency_min_mhz, range.frequency_max_mhz
            ),
        ));
    }
    if range.voltage_max_mv > limits.voltage_ceiling_mv {
        return Err(TuneError::invalid_config(
            "sweep.voltage_max_mv",
            format!(
                "{} mV exceeds the hard ceiling of {} mV",
                range.voltage_max_mv, limits.voltage_ceiling_mv
            ),
        ));
    }
    if range.frequency_max_mhz > limits.frequency_ceiling_mhz {
        return Err(TuneError::invalid_config(
            "sweep.frequency_max_mhz",
            format!(
                "{} MHz exceeds the hard ceiling of {} MHz",
                range.frequency_max_mhz, limits.frequency_ceiling_mhz
            ),
        ));
    }
    Ok(())
}
