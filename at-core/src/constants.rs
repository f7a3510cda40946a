//! Constants and configuration defaults for axetune
//!
//! Centralizes all magic numbers and configuration defaults.
//! This is the SINGLE SOURCE OF TRUTH for default values; the serde
//! defaults in `data::config` all point back here.

use std::time::Duration;

/// Filesystem locations
pub mod paths {
    /// Directory name under the user's config dir
    pub const CONFIG_DIR_NAME: &str = "axetune";

    /// Config file name inside the config directory
    pub const CONFIG_FILE: &str = "config.json";

    /// Prefix of timestamped sweep result files
    pub const RESULTS_PREFIX: &str = "axetune_results_";

    /// strftime pattern appended to the results prefix
    pub const RESULTS_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// User configuration file (`$XDG_CONFIG_HOME/axetune/config.json`)
    pub fn user_config_file() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE))
    }
}

/// Device connection defaults
pub mod device {
    use super::*;

    /// Default miner address
    pub const DEFAULT_HOST: &str = "192.168.1.97";

    /// Per-request HTTP timeout
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Attempts per gateway call before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Pause between attempts
    pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

    /// Readings outside (MIN, MAX] are implausible (Celsius)
    pub const PLAUSIBLE_TEMP_MIN: f64 = 0.0;
    pub const PLAUSIBLE_TEMP_MAX: f64 = 100.0;
}

/// Thermal and electrical limits
pub mod safety {
    /// Logged but tolerated (Celsius)
    pub const TEMP_WARNING: f64 = 65.0;

    /// Aborts the trial under test (Celsius)
    pub const TEMP_CRITICAL: f64 = 70.0;

    /// Halts the whole sweep (Celsius)
    pub const TEMP_ABSOLUTE: f64 = 75.0;

    /// Voltage regulator ceiling (Celsius)
    pub const VR_TEMP_MAX: f64 = 85.0;

    /// Power draw ceiling (W)
    pub const POWER_MAX: f64 = 30.0;

    /// Efficiency floor (GH/s per W); zero disables the check
    pub const EFFICIENCY_MIN: f64 = 0.0;

    /// Voltages at or above this need operator confirmation (mV)
    pub const DANGER_VOLTAGE: u32 = 1250;

    /// Hard voltage ceiling no sweep range may exceed (mV)
    pub const VOLTAGE_CEILING: u32 = 1300;

    /// Hard frequency ceiling no sweep range may exceed (MHz)
    pub const FREQUENCY_CEILING: u32 = 800;

    /// Cooldown after a trial-level safety abort (seconds)
    pub const EMERGENCY_COOLDOWN_SECS: u64 = 300;
}

/// Stability judgement
pub mod stability {
    /// Readings per sampling window
    pub const SAMPLE_COUNT: u32 = 10;

    /// Seconds between readings
    pub const SAMPLE_INTERVAL_SECS: u64 = 30;

    /// Seconds to let a new configuration settle
    pub const SETTLE_SECS: u64 = 60;

    /// Maximum coefficient of variation of hash rate
    pub const MAX_CV: f64 = 0.15;

    /// Minimum mean hash rate (GH/s)
    pub const MIN_HASHRATE: f64 = 50.0;

    /// Fewer readings than this can never be judged stable
    pub const MIN_VALID_SAMPLES: usize = 2;
}

/// Fan duty tiers (percent) and the temperatures that select them
pub mod fan {
    pub const MIN_DUTY: u8 = 35;

    pub const LOW_AT: f64 = 50.0;
    pub const LOW_DUTY: u8 = 50;

    pub const MEDIUM_AT: f64 = 57.0;
    pub const MEDIUM_DUTY: u8 = 70;

    pub const HIGH_AT: f64 = 62.0;
    pub const HIGH_DUTY: u8 = 85;

    /// Above this the fan is pinned to `MAX_DUTY`
    pub const MAX_AT: f64 = 67.0;
    pub const MAX_DUTY: u8 = 100;

    /// Degrees below a breakpoint before its tier is released
    pub const HYSTERESIS: f64 = 3.0;
}

/// Default sweep range
pub mod sweep {
    pub const VOLTAGE_MIN: u32 = 1100;
    pub const VOLTAGE_MAX: u32 = 1300;
    pub const VOLTAGE_STEP: u32 = 25;

    pub const FREQUENCY_MIN: u32 = 525;
    pub const FREQUENCY_MAX: u32 = 650;
    pub const FREQUENCY_STEP: u32 = 25;
}

/// Timing of cooperative waits
pub mod timing {
    use super::*;

    /// Granularity at which cancellation is observed
    pub const TICK: Duration = Duration::from_secs(1);

    /// Default interval of the performance monitor
    pub const MONITOR_INTERVAL_SECS: u64 = 60;
}
