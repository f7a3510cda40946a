//! Sweep controller
//!
//! Top-level state machine. Walks the candidate grid through the search
//! policy, runs one trial at a time, records every outcome and always ends
//! in `Finalizing`, which puts either the best stable configuration or the
//! original settings on the device.
//!
//! ```text
//! Idle -> Validating -> BackedUp -> Searching
//!   Searching -> Applying -> Sampling -> Judging
//!   Judging -> NextCandidate | FrequencyExhausted -> Applying ...
//!   any -> EmergencyStop -> Finalizing
//!   search done / cancelled -> Finalizing -> Done
//! ```

use chrono::Local;
use std::fmt;
use tracing::{error, info, warn};

use crate::data::{
    validate_config, CandidateConfig, OriginalSettings, OutcomeTag, TrialResult, TunerConfig,
};
use crate::device::DeviceGateway;
use crate::engine::search::{Advance, Judgement, SearchCursor};
use crate::engine::{FanController, Pacer, SafetyMonitor, SettingsManager, StabilitySampler};
use crate::error::{FatalScope, Result, TuneError};

/// Decisions the engine cannot make on its own
pub trait Operator {
    /// Allow testing a voltage at or above the danger threshold?
    fn confirm_danger_voltage(&mut self, candidate: CandidateConfig, threshold_mv: u32) -> bool;

    /// Keep the best result or go back to the original settings.
    fn final_choice(&mut self, best: &TrialResult, original: Option<OriginalSettings>) -> FinalChoice;

    /// Told once when the device could not be rolled back.
    fn restore_failed(&mut self, error: &TuneError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalChoice {
    ApplyBest,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Validating,
    BackedUp,
    Searching,
    Applying,
    Sampling,
    Judging,
    NextCandidate,
    FrequencyExhausted,
    EmergencyStop,
    Finalizing,
    Done,
}

/// How the search phase ended
#[derive(Debug, Clone, PartialEq)]
pub enum SweepStatus {
    Completed,
    Cancelled,
    EmergencyStopped(String),
    /// Unexpected error mid-search; the device was still rolled back
    Aborted(String),
    ValidationFailed(String),
    BackupFailed(String),
}

/// What `Finalizing` did to the device
#[derive(Debug, Clone, PartialEq)]
pub enum FinalAction {
    /// Nothing was changed, so nothing was rolled back
    Untouched,
    AppliedBest(CandidateConfig),
    Restored(OriginalSettings),
    ApplyBestFailed { candidate: CandidateConfig, reason: String },
    RestoreFailed(String),
}

impl fmt::Display for FinalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalAction::Untouched => write!(f, "device untouched"),
            FinalAction::AppliedBest(c) => write!(f, "applied best configuration {}", c),
            FinalAction::Restored(c) => write!(f, "restored original settings {}", c),
            FinalAction::ApplyBestFailed { candidate, reason } => {
                write!(f, "failed to apply {}: {}", candidate, reason)
            }
            FinalAction::RestoreFailed(reason) => {
                write!(f, "RESTORE FAILED, device may be left tuned: {}", reason)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub results: Vec<TrialResult>,
    pub status: SweepStatus,
    pub final_action: FinalAction,
    /// Every state visited, in order
    pub states: Vec<SweepState>,
}

impl SweepReport {
    pub fn best(&self) -> Option<&TrialResult> {
        select_best(&self.results)
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self.final_action {
            FinalAction::RestoreFailed(_) | FinalAction::ApplyBestFailed { .. } => return 3,
            _ => {}
        }
        match self.status {
            SweepStatus::Completed => 0,
            SweepStatus::Cancelled => 130,
            SweepStatus::EmergencyStopped(_) => 2,
            SweepStatus::Aborted(_)
            | SweepStatus::ValidationFailed(_)
            | SweepStatus::BackupFailed(_) => 1,
        }
    }
}

/// Best stable result: highest mean hash rate, earliest wins ties.
pub fn select_best(results: &[TrialResult]) -> Option<&TrialResult> {
    let mut best: Option<&TrialResult> = None;
    for r in results.iter().filter(|r| r.stable) {
        match best {
            Some(b) if r.mean_hashrate_ghs <= b.mean_hashrate_ghs => {}
            _ => best = Some(r),
        }
    }
    best
}

pub struct SweepController {
    config: TunerConfig,
    settings: SettingsManager,
    sampler: StabilitySampler,
    safety: SafetyMonitor,
    fan: FanController,
    pacer: Pacer,
    original_fan_duty: Option<u8>,
    results: Vec<TrialResult>,
    states: Vec<SweepState>,
}

impl SweepController {
    pub fn new(config: TunerConfig, gateway: DeviceGateway, pacer: Pacer) -> Self {
        let settings = SettingsManager::new(gateway, pacer.clone(), config.stability.settle_secs);
        let sampler = StabilitySampler::new(config.stability.clone(), pacer.clone());
        let safety = SafetyMonitor::new(config.safety.clone());
        let fan = FanController::new(&config.fan);
        Self {
            config,
            settings,
            sampler,
            safety,
            fan,
            pacer,
            original_fan_duty: None,
            results: Vec::new(),
            states: vec![SweepState::Idle],
        }
    }

    fn transition(&mut self, to: SweepState) {
        let from = self.states.last().copied().unwrap_or(SweepState::Idle);
        info!("STATE: {:?} -> {:?}", from, to);
        self.states.push(to);
    }

    /// Run the whole sweep to `Done`.
    pub fn run(mut self, operator: &mut dyn Operator) -> SweepReport {
        self.transition(SweepState::Validating);
        if let Err(e) = self.validate() {
            error!(error = %e, "Validation failed, device untouched");
            return self.finish(SweepStatus::ValidationFailed(e.to_string()), FinalAction::Untouched);
        }

        if let Err(e) = self.settings.backup() {
            return self.finish(SweepStatus::BackupFailed(e.to_string()), FinalAction::Untouched);
        }
        self.transition(SweepState::BackedUp);

        let status = match self.search(operator) {
            Ok(()) => {
                info!(trials = self.results.len(), "Sweep completed");
                SweepStatus::Completed
            }
            Err(TuneError::Cancelled) => {
                warn!("Sweep cancelled, in-flight trial abandoned");
                SweepStatus::Cancelled
            }
            Err(TuneError::Fatal { scope, reason }) => {
                error!(%scope, reason = %reason, "EMERGENCY STOP");
                self.transition(SweepState::EmergencyStop);
                SweepStatus::EmergencyStopped(reason)
            }
            Err(e) => {
                error!(error = %e, "Unexpected error during sweep");
                self.transition(SweepState::EmergencyStop);
                SweepStatus::Aborted(e.to_string())
            }
        };

        self.transition(SweepState::Finalizing);
        let action = self.finalize(&status, operator);
        self.finish(status, action)
    }

    fn finish(mut self, status: SweepStatus, final_action: FinalAction) -> SweepReport {
        self.transition(SweepState::Done);
        info!(outcome = %final_action, "Sweep finished");
        SweepReport {
            results: self.results,
            status,
            final_action,
            states: self.states,
        }
    }

    fn validate(&mut self) -> Result<()> {
        validate_config(&self.config)?;
        let info = self.settings.gateway().read_info()?;
        info!(
            endpoint = %self.settings.gateway().endpoint(),
            asic = info.asic_model.as_deref().unwrap_or("unknown"),
            "Connected to miner"
        );
        let duty = info.fanspeed.clamp(0.0, 100.0).round() as u8;
        self.original_fan_duty = Some(duty);
        self.fan = self.fan.clone().with_current_duty(duty);
        Ok(())
    }

    fn search(&mut self, operator: &mut dyn Operator) -> Result<()> {
        let mut cursor = SearchCursor::new(&self.config.sweep);
        info!(
            policy = ?cursor.policy(),
            candidates = self.config.sweep.candidate_count(),
            "Starting search"
        );
        self.transition(SweepState::Searching);

        while let Some(candidate) = cursor.current() {
            self.pacer.check()?;
            let judgement = self.trial(candidate, &cursor, operator)?;
            match cursor.advance(judgement) {
                Advance::NextCandidate => self.transition(SweepState::NextCandidate),
                Advance::FrequencyExhausted => {
                    warn!(frequency_mhz = candidate.frequency_mhz, "No stable voltage within limits");
                    self.transition(SweepState::FrequencyExhausted);
                }
                Advance::Done => {}
            }
        }
        Ok(())
    }

    fn trial(
        &mut self,
        candidate: CandidateConfig,
        cursor: &SearchCursor,
        operator: &mut dyn Operator,
    ) -> Result<Judgement> {
        let danger = self.config.safety.danger_voltage_mv;
        if candidate.core_voltage_mv >= danger {
            warn!(settings = %candidate, threshold_mv = danger, "Confirmation required for dangerous voltage");
            if !operator.confirm_danger_voltage(candidate, danger) {
                info!(settings = %candidate, "Operator declined dangerous voltage");
                return Ok(Judgement::Ceiling);
            }
        }

        self.transition(SweepState::Applying);
        match self.settings.apply(candidate) {
            Ok(()) => {}
            Err(TuneError::Cancelled) => return Err(TuneError::Cancelled),
            Err(e) => {
                error!(settings = %candidate, error = %e, "Failed to apply settings, skipping");
                return Ok(Judgement::Unstable);
            }
        }

        self.transition(SweepState::Sampling);
        let window = match self.sampler.sample(
            candidate,
            self.settings.gateway(),
            &self.safety,
            &mut self.fan,
        ) {
            Ok(window) => window,
            Err(TuneError::Fatal {
                scope: FatalScope::Trial,
                reason,
            }) => {
                self.abort_trial(candidate, &reason)?;
                return Ok(Judgement::Ceiling);
            }
            Err(e) => return Err(e),
        };

        self.transition(SweepState::Judging);
        let verdict = window.verdict;
        let outcome = if verdict.insufficient {
            OutcomeTag::InsufficientData
        } else if verdict.stable {
            cursor.stable_tag(candidate)
        } else {
            OutcomeTag::Unstable
        };
        let (temperature_c, power_w) = window
            .last_state
            .as_ref()
            .map(|s| (s.temperature_c, s.power_w))
            .unwrap_or((0.0, 0.0));

        self.results.push(TrialResult {
            timestamp: Local::now(),
            candidate,
            mean_hashrate_ghs: verdict.mean,
            coefficient_of_variation: verdict.cv,
            temperature_c,
            power_w,
            stable: verdict.stable,
            outcome,
        });

        if verdict.stable {
            info!(settings = %candidate, mean_ghs = verdict.mean, tag = %outcome, "SUCCESS: stable");
            Ok(Judgement::Stable)
        } else {
            info!(settings = %candidate, mean_ghs = verdict.mean, cv = verdict.cv, "UNSTABLE");
            Ok(Judgement::Unstable)
        }
    }

    /// Record the breach, back off to original settings and cool down.
    fn abort_trial(&mut self, candidate: CandidateConfig, reason: &str) -> Result<()> {
        warn!(settings = %candidate, reason, "Trial aborted by safety limit");
        self.results.push(TrialResult {
            timestamp: Local::now(),
            candidate,
            mean_hashrate_ghs: 0.0,
            coefficient_of_variation: f64::INFINITY,
            temperature_c: 0.0,
            power_w: 0.0,
            stable: false,
            outcome: OutcomeTag::SafetyAbort,
        });

        self.fan.force_max(self.settings.gateway());
        self.settings.restore()?;
        let cooldown = self.config.safety.cooldown_secs;
        info!(secs = cooldown, "Cooling down before next candidate");
        self.pacer.wait(cooldown)
    }

    fn finalize(&mut self, status: &SweepStatus, operator: &mut dyn Operator) -> FinalAction {
        let original = self.settings.original();
        let emergency = matches!(
            status,
            SweepStatus::EmergencyStopped(_) | SweepStatus::Aborted(_)
        );
        if emergency {
            self.fan.force_max(self.settings.gateway());
        }

        let choice = match status {
            SweepStatus::Completed => match select_best(&self.results) {
                Some(best) => {
                    info!(
                        settings = %best.candidate,
                        mean_ghs = best.mean_hashrate_ghs,
                        "Best stable configuration"
                    );
                    let choice = operator.final_choice(best, original);
                    (choice, Some(best.candidate))
                }
                None => {
                    warn!("No stable configuration found");
                    (FinalChoice::Restore, None)
                }
            },
            _ => (FinalChoice::Restore, None),
        };

        let action = match choice {
            (FinalChoice::ApplyBest, Some(best)) => {
                info!(settings = %best, "ACTION: applying best configuration");
                match self.settings.commit(best) {
                    Ok(()) => FinalAction::AppliedBest(best),
                    Err(e) => {
                        error!(error = %e, "Failed to apply best configuration");
                        operator.restore_failed(&e);
                        FinalAction::ApplyBestFailed {
                            candidate: best,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            _ => match self.settings.restore() {
                Ok(()) => match original {
                    Some(o) => FinalAction::Restored(o),
                    None => FinalAction::Untouched,
                },
                Err(e) => {
                    operator.restore_failed(&e);
                    FinalAction::RestoreFailed(e.to_string())
                }
            },
        };

        // The fan stays at maximum after an emergency
        if !emergency {
            if let Some(duty) = self.original_fan_duty {
                self.fan.apply(self.settings.gateway(), duty);
            }
        }
        action
    }
}
