//! GPIO outputs
//!
//! Outputs are caller-defined digital accessories bound to a pin. Their
//! definitions are persisted; their state at power-up follows the policy
//! encoded in [`OutputFlags`].

mod commands;
mod persistence;
mod registry;
mod types;

pub use commands::{OutputCommand, OutputToggleCommand};
pub use persistence::{load_outputs, store_outputs, OutputDefinition, OutputsDocument, OUTPUTS_DOCUMENT};
pub use registry::OutputRegistry;
pub use types::{Output, OutputFlags, OutputStatus, MAX_OUTPUT_ID};
