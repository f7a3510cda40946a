//! Settings transaction manager
//!
//! The only component that writes frequency and voltage. It captures the
//! device's settings before a sweep touches them and can always put them
//! back.

use at_protocol::ConfigPatch;
use tracing::{error, info};

use crate::data::{CandidateConfig, OriginalSettings};
use crate::device::DeviceGateway;
use crate::engine::Pacer;
use crate::error::{Result, TuneError};

pub struct SettingsManager {
    gateway: DeviceGateway,
    pacer: Pacer,
    settle_secs: u64,
    original: Option<OriginalSettings>,
}

impl SettingsManager {
    pub fn new(gateway: DeviceGateway, pacer: Pacer, settle_secs: u64) -> Self {
        Self {
            gateway,
            pacer,
            settle_secs,
            original: None,
        }
    }

    /// Read-only access for sampling and fan control
    pub fn gateway(&self) -> &DeviceGateway {
        &self.gateway
    }

    pub fn original(&self) -> Option<OriginalSettings> {
        self.original
    }

    /// Capture the running settings. Called once per sweep.
    pub fn backup(&mut self) -> Result<OriginalSettings> {
        info!("Backing up original settings");
        let state = self.gateway.read_state().map_err(|e| {
            error!(error = %e, "Failed to back up original settings");
            TuneError::BackupUnavailable(e.to_string())
        })?;
        let original = state.settings();
        self.original = Some(original);
        info!(
            frequency_mhz = original.frequency_mhz,
            core_voltage_mv = original.core_voltage_mv,
            "Original settings backed up"
        );
        Ok(original)
    }

    /// Apply a candidate and wait for it to settle.
    ///
    /// The settle wait is abortable; a cancelled wait returns `Cancelled`
    /// with the candidate already on the device.
    pub fn apply(&self, candidate: CandidateConfig) -> Result<()> {
        self.write_pair(candidate)?;
        self.pacer.wait(self.settle_secs)
    }

    /// Apply a configuration that must be left in place, settling
    /// without honouring cancellation.
    pub fn commit(&self, config: CandidateConfig) -> Result<()> {
        self.write_pair(config)?;
        self.pacer.hold(self.settle_secs);
        Ok(())
    }

    /// Put the backed-up settings back on the device.
    pub fn restore(&self) -> Result<()> {
        let original = match self.original {
            Some(o) => o,
            None => {
                error!("No original settings to restore");
                return Err(TuneError::RestoreFailed("no backup was taken".to_string()));
            }
        };
        info!(settings = %original, "ACTION: restoring original settings");
        match self.commit(original) {
            Ok(()) => {
                info!("Original settings restored");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to restore original settings");
                Err(TuneError::RestoreFailed(e.to_string()))
            }
        }
    }

    fn write_pair(&self, config: CandidateConfig) -> Result<()> {
        info!(settings = %config, "ACTION: applying settings");
        self.gateway
            .write_config(ConfigPatch::Frequency(config.frequency_mhz))
            .map_err(|e| {
                error!(error = %e, "Failed to set frequency");
                e
            })?;
        self.gateway
            .write_config(ConfigPatch::CoreVoltage(config.core_voltage_mv))
            .map_err(|e| {
                error!(error = %e, "Failed to set core voltage");
                e
            })
    }
}
