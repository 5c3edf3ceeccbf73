//! Accessory station core
//!
//! GPIO outputs and network-reported remote sensors behind a text command
//! protocol, with JSON persistence of output definitions.

pub mod api;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod hal;
pub mod outputs;
pub mod protocol;
pub mod sensors;
pub mod server;
pub mod station;
pub mod storage;

pub use error::{AccessoryError, Result};
pub use station::Station;
