//! Data types, configuration, and validation modules
//!
//! Contains all core data structures and configuration management.

mod config;
mod persistence;
mod types;
mod validation;

pub use config::{
    get_config_path, load_config, load_config_or_default, save_config, DeviceSettings,
    FanPolicy, FanTier, SafetyLimits, StabilityPolicy, SweepRange, TunerConfig,
};
pub use persistence::{load_results, results_file_name, save_results, write_results};
pub use types::{
    CandidateConfig, DeviceState, OriginalSettings, OutcomeTag, Reading, TrialResult,
};
pub use validation::{
    validate_config, validate_fan_policy, validate_safety_limits, validate_stability_policy,
    validate_sweep_range,
};
