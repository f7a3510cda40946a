use serde::{Deserialize, Serialize};

/// Read endpoint returning the live system snapshot
pub const INFO_PATH: &str = "/api/system/info";

/// Write endpoint accepting partial configuration updates
pub const CONFIG_PATH: &str = "/api/system";

/// Upper bound accepted for a frequency write (MHz)
const MAX_FREQUENCY_MHZ: u32 = 1200;

/// Upper bound accepted for a core voltage write (mV)
const MAX_CORE_VOLTAGE_MV: u32 = 1500;

/// Raw body of `GET /api/system/info`.
///
/// Every numeric field defaults to zero when the firmware omits it. The
/// firmware reports some integer quantities as floats depending on version,
/// so everything is parsed as `f64` and narrowed by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoResponse {
    pub frequency: f64,
    #[serde(rename = "coreVoltage")]
    pub core_voltage: f64,
    pub temp: f64,
    #[serde(rename = "vrTemp")]
    pub vr_temp: f64,
    #[serde(rename = "hashRate")]
    pub hash_rate: f64,
    pub power: f64,
    #[serde(rename = "sharesAccepted")]
    pub shares_accepted: f64,
    #[serde(rename = "sharesRejected")]
    pub shares_rejected: f64,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: f64,
    pub fanspeed: f64,
    #[serde(rename = "ASICModel", skip_serializing_if = "Option::is_none")]
    pub asic_model: Option<String>,
}

impl InfoResponse {
    /// Parse a response body, treating an empty body as all-defaults.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }
}

/// One field group of `PATCH /api/system`.
///
/// The device accepts exactly one field per request, so each variant
/// serializes to a single-key object such as `{"frequency":600}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigPatch {
    #[serde(rename = "frequency")]
    Frequency(u32),
    #[serde(rename = "coreVoltage")]
    CoreVoltage(u32),
    #[serde(rename = "fanspeed")]
    FanSpeed(u8),
}

impl ConfigPatch {
    /// Validate the patch value before it goes on the wire.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ConfigPatch::Frequency(mhz) => {
                if *mhz == 0 || *mhz > MAX_FREQUENCY_MHZ {
                    return Err(format!(
                        "Frequency {} MHz out of range (1-{})",
                        mhz, MAX_FREQUENCY_MHZ
                    ));
                }
            }
            ConfigPatch::CoreVoltage(mv) => {
                if *mv == 0 || *mv > MAX_CORE_VOLTAGE_MV {
                    return Err(format!(
                        "Core voltage {} mV out of range (1-{})",
                        mv, MAX_CORE_VOLTAGE_MV
                    ));
                }
            }
            ConfigPatch::FanSpeed(pct) => {
                if *pct > 100 {
                    return Err(format!("Fan speed {}% out of range (0-100)", pct));
                }
            }
        }
        Ok(())
    }

    /// Wire name of the single field this patch carries
    pub fn field(&self) -> &'static str {
        match self {
            ConfigPatch::Frequency(_) => "frequency",
            ConfigPatch::CoreVoltage(_) => "coreVoltage",
            ConfigPatch::FanSpeed(_) => "fanspeed",
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            ConfigPatch::Frequency(v) | ConfigPatch::CoreVoltage(v) => *v,
            ConfigPatch::FanSpeed(v) => u32::from(*v),
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(self.field().to_string(), self.value().into());
        serde_json::Value::Object(body)
    }
}
