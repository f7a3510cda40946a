//! In-process stand-in for a miner
//!
//! Speaks the same two endpoints as the firmware so the whole engine can run
//! against it: dry runs from the CLI and every sweep scenario in the tests.
//! Readings come from a [`DeviceModel`]; transport faults can be queued.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use at_protocol::{ConfigPatch, InfoResponse, CONFIG_PATH, INFO_PATH};

use crate::data::CandidateConfig;
use crate::device::transport::{HttpReply, Transport, TransportError};

/// Produces the measured part of an info payload for the current settings.
///
/// `frequency`, `coreVoltage` and `fanspeed` are overwritten by the simulator
/// with what was last written, so models only fill in measurements.
pub trait DeviceModel: Send {
    fn respond(&mut self, settings: CandidateConfig, fan_duty: u8, read_index: u64) -> InfoResponse;
}

impl<F> DeviceModel for F
where
    F: FnMut(CandidateConfig, u8, u64) -> InfoResponse + Send,
{
    fn respond(&mut self, settings: CandidateConfig, fan_duty: u8, read_index: u64) -> InfoResponse {
        self(settings, fan_duty, read_index)
    }
}

/// Rough BitAxe-like response surface
///
/// Hash rate scales with frequency. Below the voltage a frequency needs the
/// chip starves: hash rate drops and scatters widely. Heat follows power and
/// falls with fan duty.
pub struct SiliconModel {
    rng: StdRng,
    pub gh_per_mhz: f64,
    /// Voltage needed at 500 MHz
    pub base_voltage_mv: f64,
    pub mv_per_mhz: f64,
    pub ambient_c: f64,
}

impl SiliconModel {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            gh_per_mhz: 1.05,
            base_voltage_mv: 1050.0,
            mv_per_mhz: 1.0,
            ambient_c: 25.0,
        }
    }

    fn required_voltage(&self, frequency_mhz: u32) -> f64 {
        self.base_voltage_mv + (f64::from(frequency_mhz) - 500.0) * self.mv_per_mhz
    }
}

impl Default for SiliconModel {
    fn default() -> Self {
        Self::seeded(0x00B1_7A8E)
    }
}

impl DeviceModel for SiliconModel {
    fn respond(&mut self, settings: CandidateConfig, fan_duty: u8, _read_index: u64) -> InfoResponse {
        let freq = f64::from(settings.frequency_mhz);
        let volts = f64::from(settings.core_voltage_mv) / 1000.0;
        let nominal = freq * self.gh_per_mhz;

        let starved = f64::from(settings.core_voltage_mv) < self.required_voltage(settings.frequency_mhz);
        let (level, spread) = if starved { (0.7, 0.35) } else { (1.0, 0.02) };
        let hash_rate = nominal * level * (1.0 + self.rng.gen_range(-spread..=spread));

        let power = 5.0 + freq * volts * volts * 0.012;
        let temp = self.ambient_c + power * 2.6 - f64::from(fan_duty) * 0.12
            + self.rng.gen_range(-0.3..=0.3);

        InfoResponse {
            temp,
            vr_temp: temp + 5.0,
            hash_rate: hash_rate.max(0.0),
            power,
            asic_model: Some("BM1366".to_string()),
            ..Default::default()
        }
    }
}

/// Transport-level fault to return instead of the next response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimFault {
    Timeout,
    ConnectionRefused,
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
}

struct SimInner {
    settings: CandidateConfig,
    fan_duty: u8,
    model: Box<dyn DeviceModel>,
    reads: u64,
    patches: Vec<ConfigPatch>,
    faults: VecDeque<SimFault>,
}

/// Simulated miner; clones share one device
#[derive(Clone)]
pub struct SimulatedDevice {
    inner: Arc<Mutex<SimInner>>,
}

impl SimulatedDevice {
    /// Device running `initial` with the default silicon model
    pub fn new(initial: CandidateConfig) -> Self {
        Self::with_model(initial, SiliconModel::default())
    }

    pub fn with_model(initial: CandidateConfig, model: impl DeviceModel + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                settings: initial,
                fan_duty: 50,
                model: Box::new(model),
                reads: 0,
                patches: Vec::new(),
                faults: VecDeque::new(),
            })),
        }
    }

    /// Queue a fault for the next request
    pub fn inject(&self, fault: SimFault) {
        self.inner.lock().faults.push_back(fault);
    }

    pub fn settings(&self) -> CandidateConfig {
        self.inner.lock().settings
    }

    pub fn fan_duty(&self) -> u8 {
        self.inner.lock().fan_duty
    }

    /// Every write accepted so far, in order
    pub fn patches(&self) -> Vec<ConfigPatch> {
        self.inner.lock().patches.clone()
    }

    pub fn read_count(&self) -> u64 {
        self.inner.lock().reads
    }

    fn take_fault(inner: &mut SimInner) -> Option<Result<HttpReply, TransportError>> {
        let fault = inner.faults.pop_front()?;
        Some(match fault {
            SimFault::Timeout => Err(TransportError::Timeout("simulated timeout".into())),
            SimFault::ConnectionRefused => {
                Err(TransportError::ConnectionFailed("simulated refusal".into()))
            }
            SimFault::Status(code) => Ok(HttpReply::new(code, "")),
            SimFault::Garbage => Ok(HttpReply::new(200, "<html>busy</html>")),
        })
    }
}

impl Transport for SimulatedDevice {
    fn get(&self, path: &str) -> Result<HttpReply, TransportError> {
        let mut inner = self.inner.lock();
        if let Some(faulted) = Self::take_fault(&mut inner) {
            return faulted;
        }
        if path != INFO_PATH {
            return Ok(HttpReply::new(404, ""));
        }

        let index = inner.reads;
        inner.reads += 1;
        let (settings, fan_duty) = (inner.settings, inner.fan_duty);
        let mut info = inner.model.respond(settings, fan_duty, index);
        info.frequency = f64::from(settings.frequency_mhz);
        info.core_voltage = f64::from(settings.core_voltage_mv);
        info.fanspeed = f64::from(fan_duty);
        info.uptime_seconds = index as f64;

        let body = serde_json::to_string(&info)
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(HttpReply::new(200, body))
    }

    fn patch(&self, path: &str, body: &serde_json::Value) -> Result<HttpReply, TransportError> {
        let mut inner = self.inner.lock();
        if let Some(faulted) = Self::take_fault(&mut inner) {
            return faulted;
        }
        if path != CONFIG_PATH {
            return Ok(HttpReply::new(404, ""));
        }

        let patch: ConfigPatch = match serde_json::from_value(body.clone()) {
            Ok(p) => p,
            Err(_) => return Ok(HttpReply::new(400, "")),
        };
        match patch {
            ConfigPatch::Frequency(mhz) => inner.settings.frequency_mhz = mhz,
            ConfigPatch::CoreVoltage(mv) => inner.settings.core_voltage_mv = mv,
            ConfigPatch::FanSpeed(pct) => inner.fan_duty = pct,
        }
        inner.patches.push(patch);
        debug!(field = patch.field(), value = patch.value(), "Simulated device applied write");
        // The firmware answers writes with an empty body
        Ok(HttpReply::new(200, ""))
    }

    fn endpoint(&self) -> String {
        "sim://bitaxe".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_updates_settings() {
        let dev = SimulatedDevice::new(CandidateConfig::new(525, 1100));
        dev.patch(CONFIG_PATH, &serde_json::json!({"frequency": 600})).unwrap();
        dev.patch(CONFIG_PATH, &serde_json::json!({"fanspeed": 80})).unwrap();
        assert_eq!(dev.settings(), CandidateConfig::new(600, 1100));
        assert_eq!(dev.fan_duty(), 80);
        assert_eq!(dev.patches().len(), 2);
    }

    #[test]
    fn test_info_reflects_written_settings() {
        let dev = SimulatedDevice::new(CandidateConfig::new(550, 1125));
        let reply = dev.get(INFO_PATH).unwrap();
        let info = InfoResponse::from_body(&reply.body).unwrap();
        assert_eq!(info.frequency, 550.0);
        assert_eq!(info.core_voltage, 1125.0);
        assert!(info.temp > 0.0 && info.temp < 100.0);
        assert_eq!(dev.read_count(), 1);
    }

    #[test]
    fn test_faults_are_consumed_in_order() {
        let dev = SimulatedDevice::new(CandidateConfig::new(550, 1125));
        dev.inject(SimFault::Timeout);
        dev.inject(SimFault::Status(500));
        assert!(matches!(dev.get(INFO_PATH), Err(TransportError::Timeout(_))));
        assert_eq!(dev.get(INFO_PATH).unwrap().status, 500);
        assert_eq!(dev.get(INFO_PATH).unwrap().status, 200);
    }

    #[test]
    fn test_starved_voltage_scatters() {
        let mut model = SiliconModel::seeded(7);
        let rates: Vec<f64> = (0..20)
            .map(|i| model.respond(CandidateConfig::new(650, 1100), 50, i).hash_rate)
            .collect();
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let spread = rates.iter().cloned().fold(0.0_f64, |m, r| m.max((r - mean).abs()));
        assert!(spread / mean > 0.1);
    }
}
