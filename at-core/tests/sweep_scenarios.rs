//! End-to-end sweeps against the simulated miner on a virtual clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use at_core::{
    load_results, save_results, CancelToken, CandidateConfig, DeviceGateway, FinalAction,
    FinalChoice, HttpReply, Operator, OriginalSettings, OutcomeTag, Pacer, SearchPolicy,
    SimFault, SimulatedDevice, SweepController, SweepReport, SweepState, SweepStatus,
    Transport, TransportError, TrialResult, TuneError, TunerConfig, VirtualClock,
};
use at_protocol::{ConfigPatch, InfoResponse};
use tempfile::TempDir;

const ORIGINAL: CandidateConfig = CandidateConfig {
    frequency_mhz: 525,
    core_voltage_mv: 1100,
};

#[derive(Default)]
struct ScriptedOperator {
    allow_danger: bool,
    keep_best: bool,
    danger_prompts: Vec<CandidateConfig>,
    final_prompts: usize,
    restore_failures: usize,
}

impl Operator for ScriptedOperator {
    fn confirm_danger_voltage(&mut self, candidate: CandidateConfig, _threshold_mv: u32) -> bool {
        self.danger_prompts.push(candidate);
        self.allow_danger
    }

    fn final_choice(&mut self, _best: &TrialResult, _original: Option<OriginalSettings>) -> FinalChoice {
        self.final_prompts += 1;
        if self.keep_best {
            FinalChoice::ApplyBest
        } else {
            FinalChoice::Restore
        }
    }

    fn restore_failed(&mut self, _error: &TuneError) {
        self.restore_failures += 1;
    }
}

fn config(policy: SearchPolicy) -> TunerConfig {
    let mut config = TunerConfig::default();
    config.stability.sample_count = 3;
    config.stability.sample_interval_secs = 30;
    config.stability.settle_secs = 60;
    config.sweep.frequency_min_mhz = 600;
    config.sweep.frequency_max_mhz = 650;
    config.sweep.frequency_step_mhz = 25;
    config.sweep.voltage_min_mv = 1100;
    config.sweep.voltage_max_mv = 1150;
    config.sweep.voltage_step_mv = 25;
    config.sweep.policy = policy;
    config
}

/// Stable once voltage reaches 1100 mV up to 625 MHz and 1125 mV at 650 MHz.
fn reading(settings: CandidateConfig, index: u64) -> InfoResponse {
    let nominal = f64::from(settings.frequency_mhz) * 1.05;
    let required = if settings.frequency_mhz <= 625 { 1100 } else { 1125 };
    let hash_rate = if settings.core_voltage_mv >= required {
        nominal + if index % 2 == 0 { 1.0 } else { -1.0 }
    } else if index % 2 == 0 {
        nominal * 0.4
    } else {
        nominal
    };
    InfoResponse {
        temp: 55.0,
        vr_temp: 60.0,
        hash_rate,
        power: 14.0,
        asic_model: Some("BM1366".to_string()),
        ..Default::default()
    }
}

fn device() -> SimulatedDevice {
    SimulatedDevice::with_model(ORIGINAL, |c: CandidateConfig, _f: u8, i: u64| reading(c, i))
}

fn controller(
    dev: &SimulatedDevice,
    config: TunerConfig,
) -> (SweepController, Arc<VirtualClock>, CancelToken) {
    let clock = Arc::new(VirtualClock::new());
    let token = CancelToken::new();
    let gateway =
        DeviceGateway::new(Box::new(dev.clone()), clock.clone()).with_retry(1, Duration::ZERO);
    let pacer = Pacer::new(clock.clone(), token.clone());
    (SweepController::new(config, gateway, pacer), clock, token)
}

/// Lets the first `allowed` frequency writes through, then refuses them.
struct FrequencyWriteBudget {
    device: SimulatedDevice,
    allowed: AtomicUsize,
}

impl FrequencyWriteBudget {
    fn new(device: &SimulatedDevice, allowed: usize) -> Self {
        Self {
            device: device.clone(),
            allowed: AtomicUsize::new(allowed),
        }
    }
}

impl Transport for FrequencyWriteBudget {
    fn get(&self, path: &str) -> Result<HttpReply, TransportError> {
        self.device.get(path)
    }

    fn patch(&self, path: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        if body.get("frequency").is_some() {
            let left = self.allowed.load(Ordering::SeqCst);
            if left == 0 {
                return Err(TransportError::ConnectionFailed("write refused".into()));
            }
            self.allowed.store(left - 1, Ordering::SeqCst);
        }
        self.device.patch(path, body)
    }

    fn endpoint(&self) -> String {
        self.device.endpoint()
    }
}

fn single_candidate_sweep(dev: &SimulatedDevice) -> SweepController {
    let mut cfg = config(SearchPolicy::FrequencyFirst);
    cfg.sweep.frequency_max_mhz = 600;
    cfg.sweep.voltage_max_mv = 1100;
    let clock = Arc::new(VirtualClock::new());
    let gateway = DeviceGateway::new(Box::new(FrequencyWriteBudget::new(dev, 1)), clock.clone())
        .with_retry(1, Duration::ZERO);
    let pacer = Pacer::new(clock, CancelToken::new());
    SweepController::new(cfg, gateway, pacer)
}

fn candidates(report: &SweepReport) -> Vec<(u32, u32)> {
    report
        .results
        .iter()
        .map(|r| (r.candidate.frequency_mhz, r.candidate.core_voltage_mv))
        .collect()
}

fn ends_cleanly(report: &SweepReport) -> bool {
    report.states.ends_with(&[SweepState::Finalizing, SweepState::Done])
}

#[test]
fn test_frequency_first_finds_best_and_applies_it() {
    let dev = device();
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    let mut operator = ScriptedOperator {
        keep_best: true,
        ..Default::default()
    };

    let report = sweep.run(&mut operator);

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(
        candidates(&report),
        vec![(600, 1100), (625, 1100), (650, 1100), (650, 1125)]
    );
    assert_eq!(
        report.results.iter().map(|r| r.outcome).collect::<Vec<_>>(),
        vec![
            OutcomeTag::StableMinVoltage,
            OutcomeTag::StableMinVoltage,
            OutcomeTag::Unstable,
            OutcomeTag::StableMinVoltage,
        ]
    );
    let best = report.best().unwrap();
    assert_eq!(best.candidate, CandidateConfig::new(650, 1125));
    assert_eq!(report.final_action, FinalAction::AppliedBest(best.candidate));
    assert_eq!(dev.settings(), CandidateConfig::new(650, 1125));
    assert_eq!(operator.final_prompts, 1);
    assert!(operator.danger_prompts.is_empty());
    assert_eq!(operator.restore_failures, 0);
    assert_eq!(report.exit_code(), 0);
    assert!(ends_cleanly(&report));
}

#[test]
fn test_declining_best_restores_original_once() {
    let dev = device();
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    let mut operator = ScriptedOperator::default();

    let report = sweep.run(&mut operator);

    assert_eq!(report.final_action, FinalAction::Restored(ORIGINAL));
    assert_eq!(dev.settings(), ORIGINAL);
    let patches = dev.patches();
    let tail = &patches[patches.len() - 2..];
    assert_eq!(
        tail,
        &[ConfigPatch::Frequency(525), ConfigPatch::CoreVoltage(1100)]
    );
    // Only one rollback pair follows the last trial
    let restores = patches
        .iter()
        .filter(|p| **p == ConfigPatch::Frequency(525))
        .count();
    assert_eq!(restores, 1);
}

#[test]
fn test_climb_frequency_tags_the_last_frequency() {
    let dev = device();
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::ClimbFrequency));
    let report = sweep.run(&mut ScriptedOperator::default());

    assert_eq!(
        candidates(&report),
        vec![(600, 1100), (625, 1100), (650, 1100), (650, 1125)]
    );
    assert_eq!(
        report.results.iter().map(|r| r.outcome).collect::<Vec<_>>(),
        vec![
            OutcomeTag::Stable,
            OutcomeTag::Stable,
            OutcomeTag::Unstable,
            OutcomeTag::FreqLimitReached,
        ]
    );
}

#[test]
fn test_over_range_temperature_stops_everything() {
    let dev = SimulatedDevice::with_model(ORIGINAL, |c: CandidateConfig, _f: u8, i: u64| {
        let mut info = reading(c, i);
        if c.frequency_mhz == 625 {
            info.temp = 120.0;
        }
        info
    });
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    let mut operator = ScriptedOperator {
        keep_best: true,
        ..Default::default()
    };

    let report = sweep.run(&mut operator);

    assert!(matches!(report.status, SweepStatus::EmergencyStopped(_)));
    assert!(report.states.contains(&SweepState::EmergencyStop));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.final_action, FinalAction::Restored(ORIGINAL));
    assert_eq!(dev.settings(), ORIGINAL);
    assert_eq!(dev.fan_duty(), 100);
    assert_eq!(operator.final_prompts, 0);
    assert_ne!(report.exit_code(), 0);
    assert!(ends_cleanly(&report));
}

#[test]
fn test_cancel_mid_sweep_restores_original() {
    let dev = device();
    let (sweep, clock, token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    // First trial takes 180 s; this lands in the second one
    clock.cancel_after(Duration::from_secs(200), token);
    let mut operator = ScriptedOperator {
        keep_best: true,
        ..Default::default()
    };

    let report = sweep.run(&mut operator);

    assert_eq!(report.status, SweepStatus::Cancelled);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.final_action, FinalAction::Restored(ORIGINAL));
    assert_eq!(dev.settings(), ORIGINAL);
    assert_eq!(operator.final_prompts, 0);
    assert_eq!(report.exit_code(), 130);
    assert!(ends_cleanly(&report));
}

#[test]
fn test_declined_danger_voltage_ends_frequency() {
    let dev = SimulatedDevice::with_model(ORIGINAL, |c: CandidateConfig, _f: u8, i: u64| {
        // Never enough voltage
        reading(CandidateConfig::new(c.frequency_mhz, 1000), i)
    });
    let mut cfg = config(SearchPolicy::FrequencyFirst);
    cfg.sweep.frequency_min_mhz = 600;
    cfg.sweep.frequency_max_mhz = 600;
    cfg.sweep.voltage_min_mv = 1200;
    cfg.sweep.voltage_max_mv = 1275;
    let (sweep, _clock, _token) = controller(&dev, cfg);
    let mut operator = ScriptedOperator::default();

    let report = sweep.run(&mut operator);

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(operator.danger_prompts, vec![CandidateConfig::new(600, 1250)]);
    assert_eq!(candidates(&report), vec![(600, 1200), (600, 1225)]);
    assert!(!dev.patches().contains(&ConfigPatch::CoreVoltage(1250)));
    assert!(report.states.contains(&SweepState::FrequencyExhausted));
    // Nothing stable, so no final prompt and a plain rollback
    assert_eq!(operator.final_prompts, 0);
    assert_eq!(report.final_action, FinalAction::Restored(ORIGINAL));
}

#[test]
fn test_trial_limit_aborts_candidate_and_cools_down() {
    let dev = SimulatedDevice::with_model(ORIGINAL, |c: CandidateConfig, _f: u8, i: u64| {
        let mut info = reading(c, i);
        if c.frequency_mhz == 625 {
            info.power = 35.0;
        }
        info
    });
    let (sweep, clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    let mut operator = ScriptedOperator {
        keep_best: true,
        ..Default::default()
    };

    let report = sweep.run(&mut operator);

    assert_eq!(report.status, SweepStatus::Completed);
    assert_eq!(
        candidates(&report),
        vec![(600, 1100), (625, 1100), (650, 1100), (650, 1125)]
    );
    let aborted = &report.results[1];
    assert_eq!(aborted.outcome, OutcomeTag::SafetyAbort);
    assert!(!aborted.stable);
    assert!(dev.patches().contains(&ConfigPatch::FanSpeed(100)));
    // Three full trials, one aborted trial with rollback and cooldown,
    // and the final settle
    assert_eq!(clock.elapsed(), Duration::from_secs(180 * 3 + 120 + 60 + 300 + 60));
    assert_eq!(report.final_action, FinalAction::AppliedBest(CandidateConfig::new(650, 1125)));
}

#[test]
fn test_unreachable_device_fails_validation_untouched() {
    let dev = device();
    dev.inject(SimFault::ConnectionRefused);
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));

    let report = sweep.run(&mut ScriptedOperator::default());

    assert!(matches!(report.status, SweepStatus::ValidationFailed(_)));
    assert_eq!(report.final_action, FinalAction::Untouched);
    assert!(dev.patches().is_empty());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_invalid_range_fails_validation_untouched() {
    let dev = device();
    let mut cfg = config(SearchPolicy::FrequencyFirst);
    cfg.sweep.voltage_max_mv = 1400;
    let (sweep, _clock, _token) = controller(&dev, cfg);

    let report = sweep.run(&mut ScriptedOperator::default());

    assert!(matches!(report.status, SweepStatus::ValidationFailed(_)));
    assert!(dev.patches().is_empty());
    assert_eq!(dev.read_count(), 0);
}

#[test]
fn test_backup_failure_touches_nothing() {
    let dev = SimulatedDevice::with_model(ORIGINAL, |c: CandidateConfig, _f: u8, i: u64| {
        let mut info = reading(c, i);
        // Second read is the backup
        if i == 1 {
            info.temp = 0.0;
        }
        info
    });
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));

    let report = sweep.run(&mut ScriptedOperator::default());

    assert!(matches!(report.status, SweepStatus::BackupFailed(_)));
    assert_eq!(report.final_action, FinalAction::Untouched);
    assert!(dev.patches().is_empty());
}

#[test]
fn test_results_survive_a_round_trip_through_csv() {
    let dev = device();
    let (sweep, _clock, _token) = controller(&dev, config(SearchPolicy::FrequencyFirst));
    let report = sweep.run(&mut ScriptedOperator::default());

    let dir = TempDir::new().unwrap();
    let path = save_results(dir.path(), &report.results).unwrap().unwrap();
    let loaded = load_results(&path).unwrap();

    assert_eq!(loaded.len(), report.results.len());
    assert_eq!(
        at_core::select_best(&loaded).map(|r| r.candidate),
        report.best().map(|r| r.candidate)
    );
}

#[test]
fn test_failed_restore_is_reported_once() {
    let dev = device();
    let mut operator = ScriptedOperator::default();

    let report = single_candidate_sweep(&dev).run(&mut operator);

    assert_eq!(report.status, SweepStatus::Completed);
    assert!(matches!(report.final_action, FinalAction::RestoreFailed(_)));
    assert!(report.final_action.to_string().contains("device may be left tuned"));
    assert_eq!(operator.final_prompts, 1);
    assert_eq!(operator.restore_failures, 1);
    assert_eq!(report.exit_code(), 3);
    assert!(ends_cleanly(&report));
    // Still on the trial settings
    assert_eq!(dev.settings(), CandidateConfig::new(600, 1100));
}

#[test]
fn test_failed_apply_best_is_reported_once() {
    let dev = device();
    let mut operator = ScriptedOperator {
        keep_best: true,
        ..Default::default()
    };

    let report = single_candidate_sweep(&dev).run(&mut operator);

    assert_eq!(report.status, SweepStatus::Completed);
    match &report.final_action {
        FinalAction::ApplyBestFailed { candidate, .. } => {
            assert_eq!(*candidate, CandidateConfig::new(600, 1100));
        }
        other => panic!("expected ApplyBestFailed, got {other:?}"),
    }
    assert_eq!(operator.restore_failures, 1);
    assert_eq!(report.exit_code(), 3);
    assert!(ends_cleanly(&report));
}
