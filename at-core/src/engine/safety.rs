//! Safety monitor
//!
//! Checks run in a fixed order: the absolute temperature limit halts the
//! whole sweep; every other breach only ends the trial under test.

use tracing::{error, warn};

use crate::data::{DeviceState, SafetyLimits};
use crate::error::{Result, TuneError};

#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    limits: SafetyLimits,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Evaluate one snapshot. `Ok` means the trial may continue.
    pub fn check(&self, state: &DeviceState) -> Result<()> {
        self.check_temperature(state.temperature_c)?;

        if state.vr_temperature_c >= self.limits.vr_temp_max_c {
            return Err(self.trip(format!(
                "regulator temperature {:.1}°C reached limit {:.1}°C",
                state.vr_temperature_c, self.limits.vr_temp_max_c
            )));
        }
        if state.power_w >= self.limits.power_max_w {
            return Err(self.trip(format!(
                "power {:.1}W reached limit {:.1}W",
                state.power_w, self.limits.power_max_w
            )));
        }
        if state.efficiency() < self.limits.efficiency_min {
            return Err(self.trip(format!(
                "efficiency {:.2} GH/W below minimum {:.2} GH/W",
                state.efficiency(),
                self.limits.efficiency_min
            )));
        }
        Ok(())
    }

    /// Core temperature tiers on their own.
    ///
    /// Also used for readings the gateway rejected as implausible, so an
    /// over-range temperature is still treated as a breach.
    pub fn check_temperature(&self, temp: f64) -> Result<()> {
        if temp >= self.limits.temp_absolute_c {
            error!(temp, limit = self.limits.temp_absolute_c, "SAFETY: absolute temperature limit exceeded");
            return Err(TuneError::sweep_fatal(format!(
                "core temperature {:.1}°C reached absolute maximum {:.1}°C",
                temp, self.limits.temp_absolute_c
            )));
        }
        if temp >= self.limits.temp_critical_c {
            return Err(self.trip(format!(
                "core temperature {:.1}°C reached critical threshold {:.1}°C",
                temp, self.limits.temp_critical_c
            )));
        }
        if temp >= self.limits.temp_warning_c {
            warn!(temp, limit = self.limits.temp_warning_c, "SAFETY: temperature approaching limits");
        }
        Ok(())
    }

    fn trip(&self, reason: String) -> TuneError {
        error!(reason = %reason, "SAFETY: trial limit exceeded");
        TuneError::trial_fatal(reason)
    }
}
