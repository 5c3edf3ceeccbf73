//! Pin-level hardware boundary
//!
//! The accessory core never touches GPIO registers directly. Every level change
//! goes through a [`PinDriver`], and pin eligibility is decided by
//! [`RestrictedPins`]. The binary ships with [`ConsolePins`], which logs writes
//! and remembers the last level per pin.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Pin-toggle primitive
///
/// Note: methods take &self so a single driver can be shared as `Arc<dyn PinDriver>`.
/// Implementations use interior mutability for any state they keep.
pub trait PinDriver: Send + Sync {
    /// Put the pin in output mode
    fn configure_output(&self, pin: u8);

    /// Drive the pin high (`true`) or low (`false`)
    fn write(&self, pin: u8, high: bool);
}

/// Pins that may not be claimed by a newly created output
#[derive(Debug, Clone, Default)]
pub struct RestrictedPins {
    pins: BTreeSet<u8>,
}

impl RestrictedPins {
    pub fn new(pins: impl IntoIterator<Item = u8>) -> Self {
        Self {
            pins: pins.into_iter().collect(),
        }
    }

    /// Flash/UART pins of the reference board
    pub fn board_default() -> Self {
        Self::new(default_restricted_pins())
    }

    pub fn is_restricted(&self, pin: u8) -> bool {
        self.pins.contains(&pin)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.pins.iter().copied()
    }
}

/// Restricted pin list used when the configuration does not name one
pub fn default_restricted_pins() -> Vec<u8> {
    vec![0, 1, 3, 6, 7, 8, 9, 10, 11]
}

/// ConsolePins logs every pin operation instead of touching hardware
///
/// This is useful for:
/// - Running the station on a desktop without GPIO
/// - Observing the exact levels produced by polarity inversion
/// - Asserting pin levels in tests
#[derive(Default)]
pub struct ConsolePins {
    levels: Mutex<HashMap<u8, bool>>,
    write_count: Mutex<u64>,
}

impl ConsolePins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`, if any
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.levels.lock().get(&pin).copied()
    }

    /// Total number of writes performed
    pub fn write_count(&self) -> u64 {
        *self.write_count.lock()
    }
}

impl PinDriver for ConsolePins {
    fn configure_output(&self, pin: u8) {
        trace!("Pin {} configured as output", pin);
    }

    fn write(&self, pin: u8, high: bool) {
        self.levels.lock().insert(pin, high);
        *self.write_count.lock() += 1;
        debug!("Pin {} -> {}", pin, if high { "HIGH" } else { "LOW" });
    }
}
