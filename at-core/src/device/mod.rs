//! Device access
//!
//! - `transport` - raw HTTP exchange with the miner
//! - `gateway` - retries, validation and single-field writes
//! - `sim` - simulated miner for dry runs and tests

mod gateway;
mod sim;
mod transport;

pub use gateway::DeviceGateway;
pub use sim::{DeviceModel, SiliconModel, SimFault, SimulatedDevice};
pub use transport::{HttpReply, HttpTransport, Transport, TransportError};

#[cfg(test)]
pub use transport::MockTransport;
