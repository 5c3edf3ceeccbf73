//! `RS` protocol command
//!
//! ```text
//! <RS ID STATE>  report remote sensor ID (0=INACTIVE, other=ACTIVE)  -> no reply / <X>
//! <RS ID>        delete remote sensor ID                             -> <O> / <X>
//! <RS>           list remote sensors                                 -> <RS ID STATE>... / <X> if none
//! ```

use super::registry::RemoteSensorRegistry;
use crate::error::{AccessoryError, Result};
use crate::protocol::{parse_number, reply_or_fail, CommandAdapter, COMMAND_SUCCESSFUL_RESPONSE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct RemoteSensorCommand {
    sensors: Arc<Mutex<RemoteSensorRegistry>>,
}

impl RemoteSensorCommand {
    pub const ID: &'static str = "RS";

    pub fn new(sensors: Arc<Mutex<RemoteSensorRegistry>>) -> Self {
        Self { sensors }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        match args {
            [] => Ok(self.sensors.lock().state_for_protocol()),
            [id] => {
                let raw_id = parse_number(id, "remote sensor id")?;
                self.sensors.lock().remove(raw_id)?;
                Ok(COMMAND_SUCCESSFUL_RESPONSE.to_string())
            }
            [id, value] => {
                let raw_id = parse_number(id, "remote sensor id")?;
                let value = parse_number(value, "sensor value")?;
                self.sensors.lock().report(raw_id, value)?;
                Ok(String::new())
            }
            _ => Err(AccessoryError::MalformedCommand(format!(
                "RS takes 0-2 arguments, got {}",
                args.len()
            ))),
        }
    }
}

#[async_trait]
impl CommandAdapter for RemoteSensorCommand {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, args: &[&str]) -> String {
        reply_or_fail(Self::ID, self.run(args))
    }
}
