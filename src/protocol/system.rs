//! Configuration store and erase commands
//!
//! ```text
//! <E>  store output definitions  -> <e 0 0 N> (N outputs stored) / <X>
//! <e>  erase output definitions  -> <O> / <X>
//! ```

use super::{reply_or_fail, CommandAdapter, COMMAND_SUCCESSFUL_RESPONSE};
use crate::outputs::{store_outputs, OutputRegistry, OutputsDocument, OUTPUTS_DOCUMENT};
use crate::storage::ConfigStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub struct ConfigStoreCommand {
    outputs: Arc<Mutex<OutputRegistry>>,
    store: Arc<dyn ConfigStore>,
}

impl ConfigStoreCommand {
    pub const ID: &'static str = "E";

    pub fn new(outputs: Arc<Mutex<OutputRegistry>>, store: Arc<dyn ConfigStore>) -> Self {
        Self { outputs, store }
    }
}

#[async_trait]
impl CommandAdapter for ConfigStoreCommand {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, _args: &[&str]) -> String {
        let result = store_outputs(&self.outputs, self.store.as_ref())
            .await
            .map(|count| format!("<e 0 0 {}>", count));
        reply_or_fail(Self::ID, result)
    }
}

pub struct ConfigEraseCommand {
    outputs: Arc<Mutex<OutputRegistry>>,
    store: Arc<dyn ConfigStore>,
}

impl ConfigEraseCommand {
    pub const ID: &'static str = "e";

    pub fn new(outputs: Arc<Mutex<OutputRegistry>>, store: Arc<dyn ConfigStore>) -> Self {
        Self { outputs, store }
    }

    async fn erase(&self) -> crate::error::Result<String> {
        // Registry is only cleared once the empty document is on disk
        let json = OutputsDocument::empty().to_json()?;
        self.store.store(OUTPUTS_DOCUMENT, &json).await?;
        self.outputs.lock().clear();
        info!("Erased stored output definitions");
        Ok(COMMAND_SUCCESSFUL_RESPONSE.to_string())
    }
}

#[async_trait]
impl CommandAdapter for ConfigEraseCommand {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, _args: &[&str]) -> String {
        reply_or_fail(Self::ID, self.erase().await)
    }
}
