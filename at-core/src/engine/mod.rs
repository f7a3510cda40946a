//! Tuning engine
//!
//! - `pacing` - ticked waits, clocks and cancellation
//! - `fan` - tiered fan control with hysteresis
//! - `safety` - per-sample limit checks
//! - `transaction` - backup, apply and restore of device settings
//! - `sampler` - stability windows and verdicts
//! - `search` - candidate ordering policies
//! - `sweep` - the controller state machine

mod fan;
mod pacing;
mod safety;
mod sampler;
mod search;
mod sweep;
mod transaction;

pub use fan::FanController;
pub use pacing::{CancelToken, Clock, Pacer, SystemClock, VirtualClock};
pub use safety::SafetyMonitor;
pub use sampler::{judge, SampleWindow, StabilitySampler, Verdict};
pub use search::{Advance, Judgement, SearchCursor, SearchPolicy};
pub use sweep::{
    select_best, FinalAction, FinalChoice, Operator, SweepController, SweepReport, SweepState,
    SweepStatus,
};
pub use transaction::SettingsManager;
