//! UI-facing display model.
//!
//! [`Display`] is what the presentation layer renders.  It is produced from a
//! wire-level [`DisplayStatus`](crate::protocol::messages::DisplayStatus) by the
//! reducer in [`crate::domain::reducer`] and is replaced wholesale whenever a
//! fresh server snapshot arrives.  The `busy` flag is the only field the client
//! mutates locally, between issuing a power/input command and its re-fetch.

use serde::{Deserialize, Serialize};

/// Server-assigned display identifier.
pub type DisplayId = i64;

/// A DDC/CI input source: numeric code plus a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    pub code: u8,
    pub name: String,
}

impl InputSource {
    /// Builds an input source, substituting `UNKNOWN-{code}` for a blank name.
    pub fn new(code: u8, name: &str) -> Self {
        let trimmed = name.trim();
        let name = if trimmed.is_empty() {
            unknown_input_name(code)
        } else {
            trimmed.to_string()
        };
        Self { code, name }
    }

    /// Converts a wire-level code, rejecting anything outside 0–255.
    pub fn from_wire(code: i32, name: &str) -> Option<Self> {
        u8::try_from(code).ok().map(|code| Self::new(code, name))
    }
}

/// Placeholder name for an input whose label is not known.
pub fn unknown_input_name(code: u8) -> String {
    format!("UNKNOWN-{code}")
}

/// What a display can be asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub brightness: bool,
    pub volume: bool,
    pub power: bool,
    pub input: bool,
}

/// A display as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub id: DisplayId,
    pub name: String,
    /// Brightness percentage, 0–100.
    pub brightness: u8,
    /// Volume percentage, 0–100; `None` when the service does not report it.
    pub volume: Option<u8>,
    pub power_on: bool,
    pub capabilities: Capabilities,
    pub current_input: Option<InputSource>,
    /// Ordered, no duplicate codes; the current input (if any) comes first.
    pub available_inputs: Vec<InputSource>,
    /// `true` when `current_input` came from the local cache rather than the
    /// service.
    pub input_from_cache: bool,
    pub is_virtual: bool,
    /// A power or input command is in flight for this display.
    pub busy: bool,
}

impl Display {
    /// Whether a brightness slider change should be written into this display.
    pub fn accepts_brightness(&self) -> bool {
        self.capabilities.brightness && self.power_on
    }

    /// Whether a volume slider change should be written into this display.
    pub fn accepts_volume(&self) -> bool {
        self.capabilities.volume && self.power_on
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_name_becomes_unknown() {
        assert_eq!(InputSource::new(17, "  ").name, "UNKNOWN-17");
        assert_eq!(InputSource::new(17, " HDMI-1 ").name, "HDMI-1");
    }

    #[test]
    fn test_from_wire_rejects_codes_outside_byte_range() {
        assert!(InputSource::from_wire(-1, "x").is_none());
        assert!(InputSource::from_wire(256, "x").is_none());
        assert_eq!(InputSource::from_wire(255, "x").map(|i| i.code), Some(255));
    }
}
