//! RemoteSensorRegistry - transient sensors created by network reports
//!
//! Remote sensors are never defined explicitly: the first report of an
//! unseen raw id creates the sensor, later reports refresh its value and
//! timestamp. Sensors that stay silent while active are turned off by
//! [`RemoteSensorRegistry::expire`], which the decay monitor calls periodically.

use crate::error::{AccessoryError, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Highest raw id a remote sensor may report
pub const MAX_REMOTE_SENSOR_ID: u16 = 32667;

/// Pin reported for sensors that are not wired to a pin
pub const NON_STORED_SENSOR_PIN: i16 = -1;

/// A network-reported virtual sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSensor {
    /// Id used by the reporting device
    pub raw_id: u16,
    /// Sensor id in the station-wide sensor namespace
    pub id: u16,
    pub value: u16,
    pub last_update: Instant,
}

impl RemoteSensor {
    pub fn is_active(&self) -> bool {
        self.value != 0
    }

    /// `<RS id value>` status line
    pub fn protocol_line(&self) -> String {
        format!("<RS {} {}>", self.raw_id, self.value)
    }
}

/// JSON form of a remote sensor
///
/// `pin` and `pullup` mirror the local sensor representation and carry
/// constant values for remote sensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteSensorStatus {
    pub id: u16,
    pub value: u16,
    pub state: bool,
    #[serde(rename = "lastUpdate")]
    pub last_update: u64,
    pub pin: i16,
    pub pullup: bool,
}

pub struct RemoteSensorRegistry {
    sensors: Vec<RemoteSensor>,
    first_sensor_id: u16,
    decay_window: Duration,
    /// Reference point for the millisecond timestamps exposed in JSON
    epoch: Instant,
}

impl RemoteSensorRegistry {
    pub fn new(first_sensor_id: u16, decay_window: Duration) -> Self {
        Self {
            sensors: Vec::new(),
            first_sensor_id,
            decay_window,
            epoch: Instant::now(),
        }
    }

    /// Record a report from a remote sensor
    pub fn report(&mut self, raw_id: u16, value: u16) -> Result<()> {
        self.report_at(raw_id, value, Instant::now())
    }

    /// Record a report received at `now`
    pub fn report_at(&mut self, raw_id: u16, value: u16, now: Instant) -> Result<()> {
        if let Some(sensor) = self.sensors.iter_mut().find(|s| s.raw_id == raw_id) {
            sensor.value = value;
            sensor.last_update = now;
            debug!("RemoteSensor({}) updated, value: {}", raw_id, value);
            return Ok(());
        }

        let id = self.sensor_id(raw_id)?;
        let sensor = RemoteSensor {
            raw_id,
            id,
            value,
            last_update: now,
        };
        debug!(
            "RemoteSensor({}) created with Sensor({}), active: {}, value: {}",
            raw_id,
            id,
            sensor.is_active(),
            value
        );
        self.sensors.push(sensor);
        Ok(())
    }

    pub fn remove(&mut self, raw_id: u16) -> Result<RemoteSensor> {
        let index = self
            .sensors
            .iter()
            .position(|s| s.raw_id == raw_id)
            .ok_or_else(|| AccessoryError::sensor_not_found(raw_id))?;
        let sensor = self.sensors.remove(index);
        info!("Removing RemoteSensor({})", raw_id);
        Ok(sensor)
    }

    pub fn get(&self, raw_id: u16) -> Option<RemoteSensor> {
        self.sensors.iter().find(|s| s.raw_id == raw_id).copied()
    }

    pub fn list(&self) -> &[RemoteSensor] {
        &self.sensors
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn decay_window(&self) -> Duration {
        self.decay_window
    }

    /// Deactivate every active sensor not refreshed within the decay window
    ///
    /// Returns the raw ids that were deactivated. Inactive sensors are left
    /// untouched and no sensor is ever removed.
    pub fn expire(&mut self, now: Instant) -> Vec<u16> {
        let window = self.decay_window;
        let mut expired = Vec::new();
        for sensor in self
            .sensors
            .iter_mut()
            .filter(|s| s.is_active() && now.saturating_duration_since(s.last_update) > window)
        {
            info!("RemoteSensor({}) expired, deactivating", sensor.raw_id);
            sensor.value = 0;
            expired.push(sensor.raw_id);
        }
        expired
    }

    pub fn status(&self, sensor: &RemoteSensor) -> RemoteSensorStatus {
        RemoteSensorStatus {
            id: sensor.raw_id,
            value: sensor.value,
            state: sensor.is_active(),
            last_update: sensor
                .last_update
                .saturating_duration_since(self.epoch)
                .as_millis() as u64,
            pin: NON_STORED_SENSOR_PIN,
            pullup: false,
        }
    }

    pub fn state_as_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.sensors
                .iter()
                .map(|sensor| serde_json::json!(self.status(sensor)))
                .collect(),
        )
    }

    /// `<RS id value>` for every sensor, or `<X>` when there are none
    pub fn state_for_protocol(&self) -> String {
        if self.sensors.is_empty() {
            return crate::protocol::COMMAND_FAILED_RESPONSE.to_string();
        }
        self.sensors.iter().map(RemoteSensor::protocol_line).collect()
    }

    fn sensor_id(&self, raw_id: u16) -> Result<u16> {
        if raw_id > MAX_REMOTE_SENSOR_ID {
            return Err(AccessoryError::MalformedCommand(format!(
                "remote sensor id {} out of range (0-{})",
                raw_id, MAX_REMOTE_SENSOR_ID
            )));
        }
        raw_id.checked_add(self.first_sensor_id).ok_or_else(|| {
            AccessoryError::MalformedCommand(format!(
                "remote sensor id {} overflows the sensor id range",
                raw_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_report_creates_then_updates() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        registry.report(5, 1).unwrap();
        registry.report(5, 1).unwrap();

        assert_eq!(registry.len(), 1);
        let sensor = registry.get(5).unwrap();
        assert_eq!(sensor.id, 105);
        assert!(sensor.is_active());
    }

    #[test]
    fn test_report_inactive_within_window() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        let start = Instant::now();
        registry.report_at(7, 42, start).unwrap();
        registry.report_at(7, 0, start + Duration::from_secs(1)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!registry.get(7).unwrap().is_active());
        assert!(registry.expire(start + Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn test_expire_only_stale_active_sensors() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        let start = Instant::now();
        registry.report_at(1, 1, start).unwrap();
        registry.report_at(2, 1, start + Duration::from_secs(50)).unwrap();
        registry.report_at(3, 0, start).unwrap();

        let expired = registry.expire(start + Duration::from_secs(61));

        assert_eq!(expired, vec![1]);
        assert!(!registry.get(1).unwrap().is_active());
        assert!(registry.get(2).unwrap().is_active());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_expire_at_window_boundary_keeps_sensor() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        let start = Instant::now();
        registry.report_at(1, 1, start).unwrap();
        assert!(registry.expire(start + WINDOW).is_empty());
    }

    #[test]
    fn test_remove_by_raw_id() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        registry.report(4, 1).unwrap();

        assert!(registry.remove(104).is_err());
        assert_eq!(registry.remove(4).unwrap().id, 104);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_raw_id_range() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        assert!(registry.report(MAX_REMOTE_SENSOR_ID, 1).is_ok());
        assert!(registry.report(MAX_REMOTE_SENSOR_ID + 1, 1).is_err());

        let mut registry = RemoteSensorRegistry::new(u16::MAX - 10, WINDOW);
        assert!(registry.report(20, 1).is_err());
    }

    #[test]
    fn test_state_for_protocol() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        assert_eq!(registry.state_for_protocol(), "<X>");

        registry.report(1, 3).unwrap();
        registry.report(2, 0).unwrap();
        assert_eq!(registry.state_for_protocol(), "<RS 1 3><RS 2 0>");
    }

    #[test]
    fn test_state_as_json() {
        let mut registry = RemoteSensorRegistry::new(100, WINDOW);
        let at = registry.epoch + Duration::from_millis(1500);
        registry.report_at(9, 12, at).unwrap();

        assert_eq!(
            registry.state_as_json(),
            serde_json::json!([{
                "id": 9,
                "value": 12,
                "state": true,
                "lastUpdate": 1500,
                "pin": -1,
                "pullup": false
            }])
        );
    }

    proptest! {
        #[test]
        fn prop_repeated_reports_keep_one_entry(raw_id in 0u16..=MAX_REMOTE_SENSOR_ID, values in proptest::collection::vec(any::<u16>(), 1..10)) {
            let mut registry = RemoteSensorRegistry::new(100, WINDOW);
            for value in &values {
                registry.report(raw_id, *value).unwrap();
            }
            prop_assert_eq!(registry.len(), 1);
            prop_assert_eq!(registry.get(raw_id).unwrap().value, *values.last().unwrap());
        }
    }
}
