//! Output type definitions
//!
//! Defines the output record and its power-up policy bitfield.

use serde::{Deserialize, Serialize};

/// Highest output id accepted by the protocol
pub const MAX_OUTPUT_ID: u16 = 32767;

/// Output behavior flags (the `IFLAG` byte of the `Z` command)
///
/// | bit | meaning |
/// |-----|---------|
/// | 0   | inverted polarity (ACTIVE=LOW / INACTIVE=HIGH) |
/// | 1   | state on power-up is forced by bit 2 instead of restored |
/// | 2   | forced state (1 = ACTIVE, 0 = INACTIVE) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFlags(u8);

impl OutputFlags {
    pub const INVERTED: u8 = 1 << 0;
    pub const RESTORE_STATE: u8 = 1 << 1;
    pub const FORCE_STATE: u8 = 1 << 2;

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn inverted(self) -> bool {
        self.0 & Self::INVERTED != 0
    }

    pub const fn restore_enabled(self) -> bool {
        self.0 & Self::RESTORE_STATE != 0
    }

    pub const fn force_state(self) -> bool {
        self.0 & Self::FORCE_STATE != 0
    }

    /// State an output takes when it is built from a definition
    ///
    /// With bit 1 set the forced state (bit 2) always wins. Otherwise the
    /// previously persisted state is used when one is known, and the output
    /// starts inactive when it is not (fresh creation or redefinition).
    pub fn initial_state(self, persisted: Option<bool>) -> bool {
        if self.restore_enabled() {
            self.force_state()
        } else {
            persisted.unwrap_or(false)
        }
    }

    /// Human readable summary used by the JSON status API
    pub fn describe(self) -> String {
        let polarity = if self.inverted() { "activeLow" } else { "activeHigh" };
        let power_up = match (self.restore_enabled(), self.force_state()) {
            (true, true) => "forceOn",
            (true, false) => "forceOff",
            (false, _) => "restoreState",
        };
        format!("{},{}", polarity, power_up)
    }
}

impl From<u8> for OutputFlags {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl std::fmt::Display for OutputFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A digital accessory output bound to one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: u16,
    pub pin: u8,
    pub flags: OutputFlags,
    /// Logical state, before polarity inversion
    pub active: bool,
}

impl Output {
    /// Build an output from a definition, applying the power-up policy
    pub fn from_definition(id: u16, pin: u8, flags: OutputFlags, persisted: Option<bool>) -> Self {
        Self {
            id,
            pin,
            flags,
            active: flags.initial_state(persisted),
        }
    }

    /// Physical level driven on the pin
    pub fn pin_level(&self) -> bool {
        self.active != self.flags.inverted()
    }

    /// `<Y id pin flags state>` status line; state is reported inverted
    /// for compatibility with existing throttles
    pub fn status_line(&self) -> String {
        format!(
            "<Y {} {} {} {}>",
            self.id,
            self.pin,
            self.flags.bits(),
            u8::from(!self.active)
        )
    }

    /// `<Y id state>` notification sent when the state changes
    pub fn state_notification(&self) -> String {
        format!("<Y {} {}>", self.id, u8::from(!self.active))
    }

    pub fn status(&self) -> OutputStatus {
        OutputStatus {
            id: self.id,
            pin: self.pin,
            flags: self.flags.describe(),
            state: if self.active { "on" } else { "off" },
        }
    }
}

/// Readable JSON form of an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputStatus {
    pub id: u16,
    pub pin: u8,
    pub flags: String,
    pub state: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_flag_accessors() {
        let flags = OutputFlags::new(0b101);
        assert!(flags.inverted());
        assert!(!flags.restore_enabled());
        assert!(flags.force_state());
    }

    #[test]
    fn test_initial_state_policy() {
        // restore disabled: persisted state if known, otherwise inactive
        assert!(!OutputFlags::new(0b000).initial_state(None));
        assert!(OutputFlags::new(0b000).initial_state(Some(true)));
        assert!(!OutputFlags::new(0b100).initial_state(None));

        // restore enabled: force bit wins over anything persisted
        assert!(!OutputFlags::new(0b010).initial_state(Some(true)));
        assert!(OutputFlags::new(0b110).initial_state(Some(false)));
    }

    #[test]
    fn test_pin_level_applies_inversion() {
        let output = Output::from_definition(3, 12, OutputFlags::new(0b011), None);
        assert!(!output.active);
        assert!(output.pin_level());

        let output = Output::from_definition(3, 12, OutputFlags::new(0b010), None);
        assert!(!output.pin_level());
    }

    #[test]
    fn test_status_line_reports_inverted_state() {
        let output = Output::from_definition(7, 25, OutputFlags::new(0b110), None);
        assert!(output.active);
        assert_eq!(output.status_line(), "<Y 7 25 6 0>");
        assert_eq!(output.state_notification(), "<Y 7 0>");
    }

    #[test]
    fn test_describe() {
        assert_eq!(OutputFlags::new(0).describe(), "activeHigh,restoreState");
        assert_eq!(OutputFlags::new(0b111).describe(), "activeLow,forceOn");
        assert_eq!(OutputFlags::new(0b010).describe(), "activeHigh,forceOff");
    }

    proptest! {
        #[test]
        fn prop_fresh_output_follows_policy(bits in any::<u8>()) {
            let flags = OutputFlags::new(bits);
            let output = Output::from_definition(1, 2, flags, None);
            let expected = flags.restore_enabled() && flags.force_state();
            prop_assert_eq!(output.active, expected);
        }
    }
}
