//! Tiered fan control with hysteresis
//!
//! # How It Works
//!
//! 1. **Tiers**: temperature selects one of four duty tiers (min, low,
//!    medium, high); at or above the top breakpoint the fan is pinned to its
//!    maximum duty.
//!
//! 2. **Hysteresis**: a tier is entered as soon as its breakpoint is reached
//!    but only released once the temperature is `hysteresis_c` degrees below
//!    it, so a temperature hovering on a breakpoint cannot make the fan flap.
//!
//! 3. **Write suppression**: the controller remembers the last duty it wrote
//!    and skips writes that would not change anything.

use tracing::{debug, info, warn};

use at_protocol::ConfigPatch;

use crate::data::FanPolicy;
use crate::device::DeviceGateway;

#[derive(Debug, Clone, Copy)]
struct Level {
    at_c: f64,
    duty: u8,
}

/// Fan duty controller driven once per sample
#[derive(Debug, Clone)]
pub struct FanController {
    enabled: bool,
    levels: Vec<Level>,
    hysteresis_c: f64,
    last_duty: Option<u8>,
}

impl FanController {
    pub fn new(policy: &FanPolicy) -> Self {
        let mut levels = Vec::with_capacity(policy.tiers.len() + 2);
        levels.push(Level {
            at_c: f64::NEG_INFINITY,
            duty: policy.min_duty,
        });
        levels.extend(policy.tiers.iter().map(|t| Level {
            at_c: t.at_c,
            duty: t.duty,
        }));
        levels.push(Level {
            at_c: policy.max_at_c,
            duty: policy.max_duty,
        });

        Self {
            enabled: policy.enabled,
            levels,
            hysteresis_c: policy.hysteresis_c.max(0.0),
            last_duty: None,
        }
    }

    /// Record the duty the device is already running at.
    pub fn with_current_duty(mut self, duty: u8) -> Self {
        self.last_duty = Some(duty);
        self
    }

    pub fn last_duty(&self) -> Option<u8> {
        self.last_duty
    }

    pub fn max_duty(&self) -> u8 {
        self.levels.last().map(|l| l.duty).unwrap_or(100)
    }

    fn level_for(&self, temp: f64) -> usize {
        self.levels.iter().rposition(|l| temp >= l.at_c).unwrap_or(0)
    }

    fn level_of_duty(&self, duty: u8) -> Option<usize> {
        self.levels.iter().rposition(|l| l.duty == duty)
    }

    /// Duty for `temp` given the duty currently applied.
    ///
    /// Without a current duty, or with one that matches no tier, this is a
    /// plain step function of temperature. Otherwise upgrades are immediate
    /// and downgrades land on the highest tier whose breakpoint minus the
    /// hysteresis margin is still at or below `temp`.
    pub fn desired_duty(&self, temp: f64, current_duty: Option<u8>) -> u8 {
        if !temp.is_finite() {
            return self.max_duty();
        }
        let raw = self.level_for(temp);
        let current = match current_duty.and_then(|d| self.level_of_duty(d)) {
            Some(level) => level,
            None => return self.levels[raw].duty,
        };
        if raw >= current {
            return self.levels[raw].duty;
        }
        let released = self.level_for(temp + self.hysteresis_c).min(current);
        self.levels[released].duty
    }

    /// Write `duty` unless it is already the last known duty.
    ///
    /// Returns false only when a needed write failed.
    pub fn apply(&mut self, gateway: &DeviceGateway, duty: u8) -> bool {
        if self.last_duty == Some(duty) {
            return true;
        }
        match gateway.write_config(ConfigPatch::FanSpeed(duty)) {
            Ok(()) => {
                info!(from = ?self.last_duty, to = duty, "ACTION: fan duty changed");
                self.last_duty = Some(duty);
                true
            }
            Err(e) => {
                warn!(duty, error = %e, "Failed to set fan duty");
                false
            }
        }
    }

    /// One control step for a fresh temperature reading.
    pub fn update(&mut self, gateway: &DeviceGateway, temp: f64) -> bool {
        if !self.enabled {
            return true;
        }
        let duty = self.desired_duty(temp, self.last_duty);
        debug!(temp, duty, "Fan control step");
        self.apply(gateway, duty)
    }

    /// Pin the fan to maximum; used after a safety abort even when
    /// automatic control is disabled.
    pub fn force_max(&mut self, gateway: &DeviceGateway) -> bool {
        let max = self.max_duty();
        self.apply(gateway, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CandidateConfig, FanTier};
    use crate::device::SimulatedDevice;
    use crate::engine::VirtualClock;
    use std::sync::Arc;

    fn policy() -> FanPolicy {
        FanPolicy {
            enabled: true,
            min_duty: 30,
            tiers: vec![
                FanTier { at_c: 50.0, duty: 50 },
                FanTier { at_c: 57.0, duty: 70 },
                FanTier { at_c: 62.0, duty: 85 },
            ],
            max_at_c: 67.0,
            max_duty: 100,
            hysteresis_c: 3.0,
        }
    }

    #[test]
    fn test_step_function_without_current() {
        let fan = FanController::new(&policy());
        assert_eq!(fan.desired_duty(40.0, None), 30);
        assert_eq!(fan.desired_duty(50.0, None), 50);
        assert_eq!(fan.desired_duty(56.9, None), 50);
        assert_eq!(fan.desired_duty(60.0, None), 70);
        assert_eq!(fan.desired_duty(62.0, None), 85);
        assert_eq!(fan.desired_duty(67.0, None), 100);
        assert_eq!(fan.desired_duty(90.0, None), 100);
    }

    #[test]
    fn test_upgrade_is_immediate() {
        let fan = FanController::new(&policy());
        assert_eq!(fan.desired_duty(57.0, Some(50)), 70);
        assert_eq!(fan.desired_duty(68.0, Some(30)), 100);
    }

    #[test]
    fn test_downgrade_waits_for_margin() {
        let fan = FanController::new(&policy());
        // Tier 70 was set by the 57°C breakpoint; release below 54°C
        assert_eq!(fan.desired_duty(56.0, Some(70)), 70);
        assert_eq!(fan.desired_duty(54.0, Some(70)), 70);
        assert_eq!(fan.desired_duty(53.9, Some(70)), 50);
        // A large drop skips straight down
        assert_eq!(fan.desired_duty(40.0, Some(70)), 30);
    }

    #[test]
    fn test_unknown_duty_means_no_hysteresis() {
        let fan = FanController::new(&policy());
        assert_eq!(fan.desired_duty(55.0, Some(64)), 50);
    }

    #[test]
    fn test_nan_temperature_runs_fan_flat_out() {
        let fan = FanController::new(&policy());
        assert_eq!(fan.desired_duty(f64::NAN, Some(30)), 100);
    }

    #[test]
    fn test_no_oscillation_near_breakpoint() {
        let fan = FanController::new(&policy());
        let trajectory = [56.5, 57.2, 56.8, 55.1, 57.0, 54.5, 56.9, 54.01];
        let mut duty = None;
        let mut seen = Vec::new();
        for t in trajectory {
            let next = fan.desired_duty(t, duty);
            if let Some(prev) = duty {
                if t >= 57.0 - 3.0 {
                    assert!(next >= prev.min(70), "duty dropped at {t}");
                }
            }
            duty = Some(next);
            seen.push(next);
        }
        assert_eq!(seen, vec![50, 70, 70, 70, 70, 70, 70, 70]);
    }

    #[test]
    fn test_apply_skips_redundant_writes() {
        let dev = SimulatedDevice::new(CandidateConfig::new(525, 1100));
        let gw = DeviceGateway::new(Box::new(dev.clone()), Arc::new(VirtualClock::new()));
        let mut fan = FanController::new(&policy());

        assert!(fan.update(&gw, 58.0));
        assert!(fan.update(&gw, 57.5));
        assert!(fan.update(&gw, 55.0));
        assert_eq!(dev.patches(), vec![ConfigPatch::FanSpeed(70)]);
        assert_eq!(fan.last_duty(), Some(70));

        assert!(fan.force_max(&gw));
        assert_eq!(dev.fan_duty(), 100);
    }

    #[test]
    fn test_disabled_controller_never_writes() {
        let dev = SimulatedDevice::new(CandidateConfig::new(525, 1100));
        let gw = DeviceGateway::new(Box::new(dev.clone()), Arc::new(VirtualClock::new()));
        let mut p = policy();
        p.enabled = false;
        let mut fan = FanController::new(&p);
        assert!(fan.update(&gw, 66.0));
        assert!(dev.patches().is_empty());
    }
}
