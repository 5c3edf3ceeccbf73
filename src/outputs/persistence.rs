//! Output definitions persisted as a JSON document
//!
//! Output definitions survive power cycles through the `outputs.json`
//! document. The document is decoded into a fixed schema: `id`, `pin` and
//! `flags` are required, `state` is optional, and a `count` that disagrees
//! with the array is treated as corruption.

use super::registry::OutputRegistry;
use super::types::{OutputFlags, MAX_OUTPUT_ID};
use crate::error::{AccessoryError, EntityKind, Result};
use crate::storage::ConfigStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Name of the persisted outputs document
pub const OUTPUTS_DOCUMENT: &str = "outputs.json";

/// One persisted output definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub id: u16,
    pub pin: u8,
    pub flags: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,
}

/// Root of the persisted outputs document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputsDocument {
    pub count: usize,
    pub outputs: Vec<OutputDefinition>,
}

impl OutputsDocument {
    /// Capture every output currently in the registry
    pub fn from_registry(registry: &OutputRegistry) -> Self {
        let outputs: Vec<OutputDefinition> = registry
            .list()
            .iter()
            .map(|output| OutputDefinition {
                id: output.id,
                pin: output.pin,
                flags: output.flags.bits(),
                state: Some(output.active),
            })
            .collect();

        Self {
            count: outputs.len(),
            outputs,
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            outputs: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode and validate a stored document
    pub fn from_json(json: &str) -> Result<Self> {
        let document: OutputsDocument = serde_json::from_str(json).map_err(|e| {
            AccessoryError::Persistence(format!("{} is not a valid outputs document: {}", OUTPUTS_DOCUMENT, e))
        })?;
        document.validate()?;
        Ok(document)
    }

    fn validate(&self) -> Result<()> {
        if self.count != self.outputs.len() {
            return Err(AccessoryError::Persistence(format!(
                "{} declares {} output(s) but contains {}",
                OUTPUTS_DOCUMENT,
                self.count,
                self.outputs.len()
            )));
        }
        if let Some(bad) = self.outputs.iter().find(|def| def.id > MAX_OUTPUT_ID) {
            return Err(AccessoryError::Persistence(format!(
                "{} contains out of range output id {}",
                OUTPUTS_DOCUMENT, bad.id
            )));
        }
        Ok(())
    }
}

impl OutputRegistry {
    /// Replace the registry contents with the definitions of `document`
    pub fn replace_with(&mut self, document: &OutputsDocument) {
        self.clear();
        for def in &document.outputs {
            self.restore(def.id, def.pin, OutputFlags::new(def.flags), def.state);
        }
    }
}

/// Write every output definition to the store, returns the number stored
pub async fn store_outputs(registry: &Mutex<OutputRegistry>, store: &dyn ConfigStore) -> Result<usize> {
    // Snapshot under the lock, write without it
    let document = OutputsDocument::from_registry(&registry.lock());
    store.store(OUTPUTS_DOCUMENT, &document.to_json()?).await?;
    info!("Stored {} output(s)", document.count);
    Ok(document.count)
}

/// Load output definitions from the store, returns the number loaded
///
/// A missing document leaves the registry untouched. A corrupt document is
/// rejected as a whole and the registry keeps its previous contents.
pub async fn load_outputs(registry: &Mutex<OutputRegistry>, store: &dyn ConfigStore) -> Result<usize> {
    let json = match store.load(OUTPUTS_DOCUMENT).await {
        Ok(json) => json,
        Err(AccessoryError::NotFound {
            kind: EntityKind::Document,
            ..
        }) => {
            debug!("No {} found, starting without outputs", OUTPUTS_DOCUMENT);
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let document = OutputsDocument::from_json(&json)?;
    let mut registry = registry.lock();
    registry.replace_with(&document);
    info!("Loaded {} output(s)", registry.len());
    Ok(registry.len())
}
