//! Remote sensors
//!
//! Virtual sensors reported over the network. They are created implicitly by
//! their first report, live only in memory, and decay to inactive when they
//! stop reporting.

mod commands;
mod decay;
mod registry;

pub use commands::RemoteSensorCommand;
pub use decay::{DecayMonitor, DecayMonitorHandle};
pub use registry::{
    RemoteSensor, RemoteSensorRegistry, RemoteSensorStatus, MAX_REMOTE_SENSOR_ID,
    NON_STORED_SENSOR_PIN,
};
