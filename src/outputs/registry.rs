//! OutputRegistry - id-keyed collection of live outputs
//!
//! Owns every output, drives their pins through the [`PinDriver`] and
//! announces state changes on the [`Broadcaster`]. Outputs keep their
//! insertion order, which is also the order of the status listing and of the
//! persisted document.

use super::types::{Output, OutputFlags, MAX_OUTPUT_ID};
use crate::broadcast::Broadcaster;
use crate::error::{AccessoryError, Result};
use crate::hal::{PinDriver, RestrictedPins};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OutputRegistry {
    outputs: Vec<Output>,
    pins: Arc<dyn PinDriver>,
    restricted: RestrictedPins,
    broadcaster: Broadcaster,
}

impl OutputRegistry {
    pub fn new(pins: Arc<dyn PinDriver>, restricted: RestrictedPins, broadcaster: Broadcaster) -> Self {
        Self {
            outputs: Vec::new(),
            pins,
            restricted,
            broadcaster,
        }
    }

    /// Create a new output, or redefine an existing one in place
    ///
    /// The restricted-pin check only applies to new outputs. Either way the
    /// power-up policy is evaluated again and the pin is driven accordingly.
    pub fn create_or_update(&mut self, id: u16, pin: u8, flags: OutputFlags) -> Result<()> {
        if id > MAX_OUTPUT_ID {
            return Err(AccessoryError::MalformedCommand(format!(
                "output id {} out of range (0-{})",
                id, MAX_OUTPUT_ID
            )));
        }

        if let Some(index) = self.position(id) {
            let output = Output::from_definition(id, pin, flags, None);
            self.outputs[index] = output;
            self.warn_shared_pin(&output);
            self.drive(&output);
            debug!(
                "Output({}) on pin {} updated, flags: {}",
                id,
                pin,
                flags.describe()
            );
            return Ok(());
        }

        if self.restricted.is_restricted(pin) {
            warn!("Output({}) rejected: pin {} is restricted", id, pin);
            return Err(AccessoryError::RestrictedPin(pin));
        }

        let output = Output::from_definition(id, pin, flags, None);
        self.warn_shared_pin(&output);
        self.drive(&output);
        self.outputs.push(output);
        debug!(
            "Output({}) on pin {} created, flags: {}",
            id,
            pin,
            flags.describe()
        );
        Ok(())
    }

    /// Insert a definition read back from storage
    ///
    /// Loaded definitions skip the restricted-pin check and honor the
    /// persisted state when the restore bit is clear.
    pub(crate) fn restore(&mut self, id: u16, pin: u8, flags: OutputFlags, persisted: Option<bool>) {
        let output = Output::from_definition(id, pin, flags, persisted);
        self.drive(&output);
        match self.position(id) {
            Some(index) => self.outputs[index] = output,
            None => self.outputs.push(output),
        }
        debug!(
            "Output({}) on pin {} loaded, flags: {}",
            id,
            pin,
            flags.describe()
        );
    }

    pub fn remove(&mut self, id: u16) -> Result<Output> {
        let index = self
            .position(id)
            .ok_or_else(|| AccessoryError::output_not_found(id))?;
        let output = self.outputs.remove(index);
        info!("Removing Output({})", output.id);
        Ok(output)
    }

    /// Set the logical state directly, regardless of flags, and announce it
    pub fn set(&mut self, id: u16, active: bool) -> Result<()> {
        let index = self
            .position(id)
            .ok_or_else(|| AccessoryError::output_not_found(id))?;
        self.outputs[index].active = active;
        let output = self.outputs[index];
        self.drive(&output);
        info!("Output({}) set to {}", id, if active { "on" } else { "off" });
        self.broadcaster.send(output.state_notification());
        Ok(())
    }

    /// Flip the current state, returns the new state
    pub fn toggle(&mut self, id: u16) -> Result<bool> {
        let active = self
            .get(id)
            .map(|output| !output.active)
            .ok_or_else(|| AccessoryError::output_not_found(id))?;
        self.set(id, active)?;
        Ok(active)
    }

    pub fn get(&self, id: u16) -> Option<Output> {
        self.outputs.iter().find(|output| output.id == id).copied()
    }

    /// All outputs in insertion order
    pub fn list(&self) -> &[Output] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Drop every output definition (pins keep their last level)
    pub fn clear(&mut self) {
        info!("Clearing {} output(s)", self.outputs.len());
        self.outputs.clear();
    }

    /// `<Y id pin flags state>` line for every output
    pub fn status_lines(&self) -> Vec<String> {
        self.outputs.iter().map(Output::status_line).collect()
    }

    fn position(&self, id: u16) -> Option<usize> {
        self.outputs.iter().position(|output| output.id == id)
    }

    fn drive(&self, output: &Output) {
        self.pins.configure_output(output.pin);
        self.pins.write(output.pin, output.pin_level());
    }

    fn warn_shared_pin(&self, output: &Output) {
        for other in self
            .outputs
            .iter()
            .filter(|other| other.id != output.id && other.pin == output.pin)
        {
            warn!(
                "Output({}) shares pin {} with Output({})",
                output.id, output.pin, other.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ConsolePins;
    use proptest::prelude::*;

    fn make_registry() -> (OutputRegistry, Arc<ConsolePins>, Broadcaster) {
        let pins = Arc::new(ConsolePins::new());
        let broadcaster = Broadcaster::default();
        let registry = OutputRegistry::new(
            pins.clone(),
            RestrictedPins::new([6, 7]),
            broadcaster.clone(),
        );
        (registry, pins, broadcaster)
    }

    #[test]
    fn test_create_and_get() {
        let (mut registry, pins, _) = make_registry();

        registry.create_or_update(3, 12, OutputFlags::new(0b011)).unwrap();

        let output = registry.get(3).unwrap();
        assert_eq!(output.pin, 12);
        assert_eq!(output.flags.bits(), 0b011);
        assert!(!output.active);
        // Inverted polarity drives the pin high for an inactive output
        assert_eq!(pins.level(12), Some(true));
    }

    #[test]
    fn test_create_non_inverted_drives_low() {
        let (mut registry, pins, _) = make_registry();
        registry.create_or_update(3, 12, OutputFlags::new(0b010)).unwrap();
        assert_eq!(pins.level(12), Some(false));
    }

    #[test]
    fn test_restricted_pin_rejected_on_create_only() {
        let (mut registry, _, _) = make_registry();

        let err = registry.create_or_update(1, 6, OutputFlags::default()).unwrap_err();
        assert!(matches!(err, AccessoryError::RestrictedPin(6)));
        assert!(registry.is_empty());

        // Updating an accepted output onto a restricted pin is allowed
        registry.create_or_update(1, 12, OutputFlags::default()).unwrap();
        registry.create_or_update(1, 7, OutputFlags::default()).unwrap();
        assert_eq!(registry.get(1).unwrap().pin, 7);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_reevaluates_policy() {
        let (mut registry, _, _) = make_registry();
        registry.create_or_update(5, 13, OutputFlags::default()).unwrap();
        registry.set(5, true).unwrap();

        registry.create_or_update(5, 14, OutputFlags::default()).unwrap();
        assert!(!registry.get(5).unwrap().active);

        registry.create_or_update(5, 14, OutputFlags::new(0b110)).unwrap();
        assert!(registry.get(5).unwrap().active);
    }

    #[test]
    fn test_id_out_of_range() {
        let (mut registry, _, _) = make_registry();
        assert!(matches!(
            registry.create_or_update(40000, 12, OutputFlags::default()),
            Err(AccessoryError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_remove_missing_leaves_registry_unchanged() {
        let (mut registry, _, _) = make_registry();
        registry.create_or_update(1, 12, OutputFlags::default()).unwrap();

        assert!(registry.remove(99).is_err());
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(1).unwrap().id, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_set_announces_inverted_state() {
        let (mut registry, pins, broadcaster) = make_registry();
        let mut rx = broadcaster.subscribe();
        registry.create_or_update(2, 15, OutputFlags::default()).unwrap();

        registry.set(2, true).unwrap();

        assert_eq!(pins.level(15), Some(true));
        assert_eq!(rx.recv().await.unwrap(), "<Y 2 0>");
    }

    #[test]
    fn test_set_and_toggle_unknown_id() {
        let (mut registry, _, _) = make_registry();
        assert!(registry.set(9, true).is_err());
        assert!(registry.toggle(9).is_err());
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let (mut registry, _, _) = make_registry();
        for id in [30, 10, 20] {
            registry.create_or_update(id, 12, OutputFlags::default()).unwrap();
        }
        let ids: Vec<u16> = registry.list().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        assert_eq!(registry.status_lines()[0], "<Y 30 12 0 1>");
    }

    #[test]
    fn test_shared_pin_is_allowed() {
        let (mut registry, _, _) = make_registry();
        registry.create_or_update(1, 12, OutputFlags::default()).unwrap();
        registry.create_or_update(2, 12, OutputFlags::default()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_toggle_is_self_inverse(bits in 0u8..8, start in any::<bool>()) {
            let (mut registry, pins, _) = make_registry();
            registry.create_or_update(1, 12, OutputFlags::new(bits)).unwrap();
            registry.set(1, start).unwrap();
            let level = pins.level(12);

            registry.toggle(1).unwrap();
            registry.toggle(1).unwrap();

            prop_assert_eq!(registry.get(1).unwrap().active, start);
            prop_assert_eq!(pins.level(12), level);
        }

        #[test]
        fn prop_create_matches_policy(id in 0u16..=MAX_OUTPUT_ID, pin in 12u8..40, bits in any::<u8>()) {
            let (mut registry, _, _) = make_registry();
            let flags = OutputFlags::new(bits);
            registry.create_or_update(id, pin, flags).unwrap();

            let output = registry.get(id).unwrap();
            prop_assert_eq!(output.pin, pin);
            prop_assert_eq!(output.flags, flags);
            prop_assert_eq!(output.active, flags.initial_state(None));
        }
    }
}
