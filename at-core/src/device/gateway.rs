//! Device gateway
//!
//! Reads snapshots from and writes single-field updates to the miner,
//! retrying slow peers and giving up at once on unreachable ones.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use at_protocol::{ConfigPatch, InfoResponse, CONFIG_PATH, INFO_PATH};

use crate::constants::device;
use crate::data::{DeviceState, Reading};
use crate::device::transport::{HttpReply, Transport, TransportError};
use crate::engine::Clock;
use crate::error::{Result, TuneError};

#[derive(Clone, Copy)]
enum Method<'a> {
    Get,
    Patch(&'a serde_json::Value),
}

pub struct DeviceGateway {
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    backoff: Duration,
}

impl DeviceGateway {
    pub fn new(transport: Box<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            max_attempts: device::MAX_ATTEMPTS,
            backoff: device::RETRY_BACKOFF,
        }
    }

    /// Override the retry budget
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    /// Raw info payload, unvalidated
    pub fn read_info(&self) -> Result<InfoResponse> {
        let reply = self.request(INFO_PATH, Method::Get)?;
        match InfoResponse::from_body(&reply.body) {
            Ok(info) => Ok(info),
            Err(e) if e.is_syntax() || e.is_eof() => {
                warn!(path = INFO_PATH, "Invalid JSON in successful reply, treating as empty");
                Ok(InfoResponse::default())
            }
            Err(e) => Err(TuneError::invalid_reading(
                format!("unparseable info payload: {}", e),
                None,
            )),
        }
    }

    /// Read and validate a snapshot.
    ///
    /// A temperature outside (0, 100] °C or a negative hash rate is
    /// `InvalidReading`; the rejected temperature travels with the error.
    pub fn read_state(&self) -> Result<DeviceState> {
        let info = self.read_info()?;
        let state = DeviceState::new(Reading::from(&info));

        let temp = state.temperature_c;
        if !temp.is_finite()
            || temp <= device::PLAUSIBLE_TEMP_MIN
            || temp > device::PLAUSIBLE_TEMP_MAX
        {
            return Err(TuneError::invalid_reading(
                format!("temperature {:.1}°C", temp),
                temp.is_finite().then_some(temp),
            ));
        }
        if state.hashrate_ghs < 0.0 || !state.hashrate_ghs.is_finite() {
            return Err(TuneError::invalid_reading(
                format!("hash rate {} GH/s", state.hashrate_ghs),
                Some(temp),
            ));
        }
        Ok(state)
    }

    /// Write one field group.
    pub fn write_config(&self, patch: ConfigPatch) -> Result<()> {
        patch.validate().map_err(|reason| TuneError::ApplyFailed {
            field: patch.field().to_string(),
            value: patch.value(),
            reason,
        })?;
        let body = patch.to_body();
        let reply = self.request(CONFIG_PATH, Method::Patch(&body))?;
        check_ack(CONFIG_PATH, &reply);
        debug!(field = patch.field(), value = patch.value(), "Device acknowledged write");
        Ok(())
    }

    fn request(&self, path: &str, method: Method<'_>) -> Result<HttpReply> {
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=self.max_attempts {
            let outcome = match method {
                Method::Get => self.transport.get(path),
                Method::Patch(body) => self.transport.patch(path, body),
            };

            match outcome {
                Ok(reply) if reply.is_success() => return Ok(reply),
                Ok(reply) => {
                    warn!(path, attempt, status = reply.status, "HTTP error from device");
                    last_failure = format!("HTTP {}", reply.status);
                }
                Err(TransportError::ConnectionFailed(reason)) => {
                    error!(path, error = %reason, "Connection to device failed");
                    return Err(TuneError::unreachable(self.endpoint(), reason));
                }
                Err(TransportError::Timeout(reason)) => {
                    warn!(path, attempt, "Timeout talking to device");
                    last_failure = format!("timeout: {}", reason);
                }
                Err(TransportError::Other(reason)) => {
                    warn!(path, attempt, error = %reason, "Request to device failed");
                    last_failure = reason;
                }
            }

            if attempt < self.max_attempts {
                self.clock.sleep(self.backoff);
            }
        }

        Err(TuneError::unreachable(
            format!("{}{}", self.endpoint(), path),
            format!("{} after {} attempts", last_failure, self.max_attempts),
        ))
    }
}

/// Successful replies with an empty or non-JSON body are an empty ack.
fn check_ack(path: &str, reply: &HttpReply) {
    let body = reply.body.trim();
    if !body.is_empty() && serde_json::from_str::<serde_json::Value>(body).is_err() {
        warn!(path, "Invalid JSON in successful reply, treating as empty");
    }
}
