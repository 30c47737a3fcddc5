//! Mission state of the payload computer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating state driven by the payload controller.
///
/// `Startup` is the unique initial state. `Idle` and `Nominal` form the
/// steady-state cycle. `LowPower`, `SafeMode` and `Critical` are entered only
/// through an external fault signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PayloadState {
    Startup = 0x00,
    Nominal = 0x01,
    LowPower = 0x02,
    SafeMode = 0x03,
    Critical = 0x04,
    Idle = 0x05,
}

impl PayloadState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Startup),
            0x01 => Some(Self::Nominal),
            0x02 => Some(Self::LowPower),
            0x03 => Some(Self::SafeMode),
            0x04 => Some(Self::Critical),
            0x05 => Some(Self::Idle),
            _ => None,
        }
    }

    /// Fault states are entered only by an external signal.
    pub fn is_fault(self) -> bool {
        matches!(self, Self::LowPower | Self::SafeMode | Self::Critical)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Startup => "STARTUP",
            Self::Nominal => "NOMINAL",
            Self::LowPower => "LOW_POWER",
            Self::SafeMode => "SAFE_MODE",
            Self::Critical => "CRITICAL",
            Self::Idle => "IDLE",
        }
    }
}

impl From<PayloadState> for u8 {
    fn from(s: PayloadState) -> u8 {
        s as u8
    }
}

impl fmt::Display for PayloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
