//! `Z` and `Zex` protocol commands
//!
//! ```text
//! <Z ID PIN IFLAG>  create or redefine output ID        -> <O> / <X>
//! <Z ID STATE>      set output ID (0=INACTIVE, other=ACTIVE) -> <Y ID STATE> broadcast / <X>
//! <Z ID>            delete output ID                    -> <O> / <X>
//! <Z>               list outputs                        -> <Y ID PIN IFLAG STATE> broadcast per output, <X> if none
//! <Zex ID>          toggle output ID                    -> <Y ID STATE> broadcast / <X>
//! ```

use super::registry::OutputRegistry;
use super::types::OutputFlags;
use crate::broadcast::Broadcaster;
use crate::error::{AccessoryError, Result};
use crate::protocol::{
    parse_number, reply_or_fail, CommandAdapter, COMMAND_FAILED_RESPONSE,
    COMMAND_SUCCESSFUL_RESPONSE,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Output definition and state command
pub struct OutputCommand {
    outputs: Arc<Mutex<OutputRegistry>>,
    broadcaster: Broadcaster,
}

impl OutputCommand {
    pub const ID: &'static str = "Z";

    pub fn new(outputs: Arc<Mutex<OutputRegistry>>, broadcaster: Broadcaster) -> Self {
        Self {
            outputs,
            broadcaster,
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        match args {
            [] => {
                let lines = self.outputs.lock().status_lines();
                if lines.is_empty() {
                    return Ok(COMMAND_FAILED_RESPONSE.to_string());
                }
                for line in lines {
                    self.broadcaster.send(line);
                }
                Ok(String::new())
            }
            [id] => {
                let id = parse_number(id, "output id")?;
                self.outputs.lock().remove(id)?;
                Ok(COMMAND_SUCCESSFUL_RESPONSE.to_string())
            }
            [id, state] => {
                let id = parse_number(id, "output id")?;
                let state: u16 = parse_number(state, "state")?;
                // The registry announces the change itself
                self.outputs.lock().set(id, state != 0)?;
                Ok(String::new())
            }
            [id, pin, flags] => {
                let id = parse_number(id, "output id")?;
                let pin = parse_number(pin, "pin")?;
                let flags: u8 = parse_number(flags, "flags")?;
                self.outputs
                    .lock()
                    .create_or_update(id, pin, OutputFlags::new(flags))?;
                Ok(COMMAND_SUCCESSFUL_RESPONSE.to_string())
            }
            _ => Err(AccessoryError::MalformedCommand(format!(
                "Z takes 0-3 arguments, got {}",
                args.len()
            ))),
        }
    }
}

#[async_trait]
impl CommandAdapter for OutputCommand {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, args: &[&str]) -> String {
        reply_or_fail(Self::ID, self.run(args))
    }
}

/// Output toggle command
pub struct OutputToggleCommand {
    outputs: Arc<Mutex<OutputRegistry>>,
}

impl OutputToggleCommand {
    pub const ID: &'static str = "Zex";

    pub fn new(outputs: Arc<Mutex<OutputRegistry>>) -> Self {
        Self { outputs }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let Some(id) = args.first() else {
            return Err(AccessoryError::MalformedCommand(
                "Zex requires an output id".to_string(),
            ));
        };
        let id = parse_number(id, "output id")?;
        self.outputs.lock().toggle(id)?;
        Ok(String::new())
    }
}

#[async_trait]
impl CommandAdapter for OutputToggleCommand {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, args: &[&str]) -> String {
        reply_or_fail(Self::ID, self.run(args))
    }
}
