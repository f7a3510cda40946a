//! axetune Core Library
//!
//! Safety-bounded frequency/voltage tuning for BitAxe miners.
//!
//! # Features
//!
//! - **Device Gateway**: Retrying HTTP access with plausibility checks and validated single-field writes
//! - **Settings Transactions**: Backup of the running settings and guaranteed rollback
//! - **Stability Sampling**: Fixed-cadence hash-rate windows judged by coefficient of variation
//! - **Safety Monitor**: Temperature, regulator, power and efficiency limits on every sample
//! - **Fan Control**: Tiered duty with hysteresis and redundant-write suppression
//! - **Sweep Controller**: State machine over the candidate grid with two search policies
//!
//! # Module Structure
//!
//! - `device/` - Transport, gateway and simulated miner
//! - `data/` - Data types, configuration, validation, CSV results
//! - `engine/` - Pacing, safety, fan, sampler, search and sweep
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use at_core::{CancelToken, DeviceGateway, HttpTransport, Pacer, SystemClock, TunerConfig};
//!
//! let config = TunerConfig::default();
//! let clock = Arc::new(SystemClock);
//! let transport = HttpTransport::new(&config.device.host, config.device.timeout());
//! let gateway = DeviceGateway::new(Box::new(transport), clock.clone());
//! let state = gateway.read_state().unwrap();
//! println!("{} at {:.1} GH/s", state.settings(), state.hashrate_ghs);
//! ```

// Grouped modules
pub mod data;
pub mod device;
pub mod engine;

// Standalone modules
pub mod constants;
pub mod error;
pub mod monitor;

// Re-export primary types from data/
pub use data::{
    CandidateConfig, DeviceState, OriginalSettings, OutcomeTag, Reading, TrialResult,
};

// Re-export config functions from data/
pub use data::{
    get_config_path, load_config, load_config_or_default, save_config, DeviceSettings,
    FanPolicy, FanTier, SafetyLimits, StabilityPolicy, SweepRange, TunerConfig,
};

// Re-export validation functions from data/
pub use data::{
    validate_config, validate_fan_policy, validate_safety_limits, validate_stability_policy,
    validate_sweep_range,
};

// Re-export persistence functions from data/
pub use data::{load_results, results_file_name, save_results, write_results};

// Re-export error types
pub use error::{FatalScope, Result, TuneError};

// Re-export device types
pub use device::{
    DeviceGateway, DeviceModel, HttpReply, HttpTransport, SiliconModel, SimFault,
    SimulatedDevice, Transport, TransportError,
};

// Re-export engine types
pub use engine::{
    judge, select_best, Advance, CancelToken, Clock, FanController, FinalAction, FinalChoice,
    Judgement, Operator, Pacer, SafetyMonitor, SampleWindow, SearchCursor, SearchPolicy,
    SettingsManager, StabilitySampler, SweepController, SweepReport, SweepState, SweepStatus,
    SystemClock, Verdict, VirtualClock,
};

pub use monitor::{MonitorSummary, PerformanceMonitor};
