//! Station - shared handles on every accessory registry
//!
//! Built once at startup and cloned into the TCP server, the HTTP API and the
//! REPL. All clones drive the same registries.

use crate::broadcast::Broadcaster;
use crate::config::AppConfig;
use crate::error::Result;
use crate::hal::{PinDriver, RestrictedPins};
use crate::outputs::{self, OutputCommand, OutputRegistry, OutputToggleCommand};
use crate::protocol::{ConfigEraseCommand, ConfigStoreCommand, ProtocolDispatcher};
use crate::sensors::{DecayMonitor, RemoteSensorCommand, RemoteSensorRegistry};
use crate::storage::{open_store, ConfigStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Station {
    pub outputs: Arc<Mutex<OutputRegistry>>,
    pub remote_sensors: Arc<Mutex<RemoteSensorRegistry>>,
    pub store: Arc<dyn ConfigStore>,
    pub broadcaster: Broadcaster,
}

impl Station {
    pub fn new(
        pins: Arc<dyn PinDriver>,
        restricted: RestrictedPins,
        store: Arc<dyn ConfigStore>,
        first_sensor_id: u16,
        decay_window: Duration,
    ) -> Self {
        let broadcaster = Broadcaster::default();
        let outputs = OutputRegistry::new(pins, restricted, broadcaster.clone());
        let remote_sensors = RemoteSensorRegistry::new(first_sensor_id, decay_window);
        Self {
            outputs: Arc::new(Mutex::new(outputs)),
            remote_sensors: Arc::new(Mutex::new(remote_sensors)),
            store,
            broadcaster,
        }
    }

    /// Build a station from a validated configuration
    pub fn from_config(config: &AppConfig, pins: Arc<dyn PinDriver>) -> Result<Self> {
        let store = open_store(config.storage.backend, &config.storage.path)?;
        Ok(Self::new(
            pins,
            RestrictedPins::new(config.outputs.restricted_pins.iter().copied()),
            store,
            config.remote_sensors.first_sensor_id,
            config.remote_sensors.decay_window(),
        ))
    }

    /// Dispatcher with every protocol command registered
    pub fn dispatcher(&self) -> ProtocolDispatcher {
        let mut dispatcher = ProtocolDispatcher::new();
        dispatcher.register(Box::new(OutputCommand::new(
            self.outputs.clone(),
            self.broadcaster.clone(),
        )));
        dispatcher.register(Box::new(OutputToggleCommand::new(self.outputs.clone())));
        dispatcher.register(Box::new(RemoteSensorCommand::new(self.remote_sensors.clone())));
        dispatcher.register(Box::new(ConfigStoreCommand::new(
            self.outputs.clone(),
            self.store.clone(),
        )));
        dispatcher.register(Box::new(ConfigEraseCommand::new(
            self.outputs.clone(),
            self.store.clone(),
        )));
        dispatcher
    }

    /// Load persisted outputs at startup
    ///
    /// A missing or unreadable document leaves the station without outputs;
    /// the station still starts.
    pub async fn restore_outputs(&self) -> usize {
        match outputs::load_outputs(&self.outputs, self.store.as_ref()).await {
            Ok(count) => {
                info!("Restored {} output(s) from storage", count);
                count
            }
            Err(e) => {
                warn!("Failed to load stored outputs, starting empty: {}", e);
                0
            }
        }
    }

    pub async fn load_outputs(&self) -> Result<usize> {
        outputs::load_outputs(&self.outputs, self.store.as_ref()).await
    }

    pub async fn store_outputs(&self) -> Result<usize> {
        outputs::store_outputs(&self.outputs, self.store.as_ref()).await
    }

    pub fn decay_monitor(&self, interval: Duration) -> DecayMonitor {
        DecayMonitor::new(self.remote_sensors.clone(), interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ConsolePins;
    use crate::outputs::OUTPUTS_DOCUMENT;
    use crate::storage::FileConfigStore;
    use tempfile::tempdir;

    fn make_station(root: &std::path::Path) -> Station {
        Station::new(
            Arc::new(ConsolePins::new()),
            RestrictedPins::board_default(),
            Arc::new(FileConfigStore::new(root)),
            100,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_dispatcher_registers_all_commands() {
        let temp = tempdir().unwrap();
        let station = make_station(temp.path());
        assert_eq!(station.dispatcher().command_ids(), vec!["Z", "Zex", "RS", "E", "e"]);
    }

    #[tokio::test]
    async fn test_protocol_session_round_trip() {
        let temp = tempdir().unwrap();
        let station = make_station(temp.path());
        let dispatcher = station.dispatcher();

        assert_eq!(dispatcher.process("Z 1 12 0").await, "<O>");
        assert_eq!(dispatcher.process("Z 2 13 6").await, "<O>");
        assert_eq!(dispatcher.process("E").await, "<e 0 0 2>");

        let restarted = make_station(temp.path());
        assert_eq!(restarted.restore_outputs().await, 2);
        let outputs = restarted.outputs.lock();
        assert!(!outputs.get(1).unwrap().active);
        assert!(outputs.get(2).unwrap().active);
    }

    #[tokio::test]
    async fn test_restore_outputs_survives_corrupt_document() {
        let temp = tempdir().unwrap();
        let station = make_station(temp.path());
        station.store.store(OUTPUTS_DOCUMENT, "not json").await.unwrap();

        assert_eq!(station.restore_outputs().await, 0);
        assert!(station.load_outputs().await.is_err());
        assert!(station.outputs.lock().is_empty());
    }

    #[test]
    fn test_from_config() {
        let temp = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.path = temp.path().to_path_buf();
        config.outputs.restricted_pins = vec![12];

        let station = Station::from_config(&config, Arc::new(ConsolePins::new())).unwrap();
        assert!(station
            .outputs
            .lock()
            .create_or_update(1, 12, Default::default())
            .is_err());
    }
}
