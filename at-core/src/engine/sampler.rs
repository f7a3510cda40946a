//! Stability sampler
//!
//! Collects a fixed-cadence window of hash-rate readings for the applied
//! candidate, running the safety monitor and fan controller on each one,
//! and reduces the window to a verdict.

use tracing::{debug, info, warn};

use crate::constants::stability::MIN_VALID_SAMPLES;
use crate::data::{CandidateConfig, DeviceState, StabilityPolicy};
use crate::device::DeviceGateway;
use crate::engine::{FanController, Pacer, SafetyMonitor};
use crate::error::{Result, TuneError};

/// Outcome of judging a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub stable: bool,
    pub mean: f64,
    /// Sample standard deviation over the mean; infinite when undefined
    pub cv: f64,
    /// Fewer than two readings were collected
    pub insufficient: bool,
}

/// Everything a finished window produced
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub samples: Vec<f64>,
    pub verdict: Verdict,
    pub last_state: Option<DeviceState>,
}

/// Judge a set of hash-rate readings.
///
/// Stable requires both a low enough coefficient of variation and a high
/// enough mean. Fewer than two readings are never stable.
pub fn judge(samples: &[f64], policy: &StabilityPolicy) -> Verdict {
    if samples.len() < MIN_VALID_SAMPLES {
        return Verdict {
            stable: false,
            mean: 0.0,
            cv: f64::INFINITY,
            insufficient: true,
        };
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let cv = if mean == 0.0 {
        f64::INFINITY
    } else {
        variance.sqrt() / mean
    };

    Verdict {
        stable: cv <= policy.max_cv && mean >= policy.min_hashrate_ghs,
        mean,
        cv,
        insufficient: false,
    }
}

pub struct StabilitySampler {
    policy: StabilityPolicy,
    pacer: Pacer,
}

impl StabilitySampler {
    pub fn new(policy: StabilityPolicy, pacer: Pacer) -> Self {
        Self { policy, pacer }
    }

    pub fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }

    /// Settle, then collect and judge one window.
    ///
    /// Fatal safety conditions and cancellation propagate immediately.
    /// Unreachable or implausible readings are skipped, except that an
    /// implausible reading still carrying a dangerous temperature goes to
    /// the safety monitor.
    pub fn sample(
        &self,
        candidate: CandidateConfig,
        gateway: &DeviceGateway,
        safety: &SafetyMonitor,
        fan: &mut FanController,
    ) -> Result<SampleWindow> {
        let count = self.policy.sample_count;
        info!(settings = %candidate, settle_secs = self.policy.settle_secs, "Testing stability");
        self.pacer.wait(self.policy.settle_secs)?;

        let mut samples = Vec::with_capacity(count as usize);
        let mut last_state = None;

        for i in 1..=count {
            self.pacer.check()?;
            match gateway.read_state() {
                Ok(state) => {
                    info!(
                        sample = i,
                        of = count,
                        hashrate_ghs = state.hashrate_ghs,
                        temperature_c = state.temperature_c,
                        "Sample"
                    );
                    safety.check(&state)?;
                    fan.update(gateway, state.temperature_c);
                    samples.push(state.hashrate_ghs);
                    last_state = Some(state);
                }
                Err(TuneError::InvalidReading {
                    reason,
                    temperature: Some(temp),
                }) => {
                    warn!(sample = i, reason = %reason, "Implausible reading skipped");
                    safety.check_temperature(temp)?;
                }
                Err(e) if e.is_transient() => {
                    warn!(sample = i, error = %e, "No reading for this sample");
                }
                Err(e) => return Err(e),
            }

            if i < count {
                self.pacer.wait(self.policy.sample_interval_secs)?;
            }
        }

        let verdict = judge(&samples, &self.policy);
        debug!(?verdict, collected = samples.len(), "Window judged");
        info!(
            settings = %candidate,
            mean_ghs = verdict.mean,
            cv = verdict.cv,
            stable = verdict.stable,
            "Stability test complete"
        );
        Ok(SampleWindow {
            samples,
            verdict,
            last_state,
        })
    }
}
