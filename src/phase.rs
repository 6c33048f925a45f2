use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Red,
    Green,
}

impl Phase {
    /// The phase the light switches to next.
    pub fn toggled(self) -> Self {
        match self {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Red,
        }
    }

    pub fn is_green(self) -> bool {
        self == Phase::Green
    }

    fn to_u8(self) -> u8 {
        match self {
            Phase::Red => 0,
            Phase::Green => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        if raw == 0 { Phase::Red } else { Phase::Green }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Red => f.write_str("red"),
            Phase::Green => f.write_str("green"),
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Phase::Red),
            "green" => Ok(Phase::Green),
            other => Err(format!("unknown phase: {other} (expected red or green)")),
        }
    }
}

/// Current phase shared between the cycling thread (sole writer) and any
/// number of readers. Readers get the most recently stored value.
#[derive(Debug, Default)]
pub struct AtomicPhase {
    raw: AtomicU8,
}

impl AtomicPhase {
    pub fn new(phase: Phase) -> Self {
        Self {
            raw: AtomicU8::new(phase.to_u8()),
        }
    }

    pub fn load(&self) -> Phase {
        Phase::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Flip the stored phase and return the new value.
    pub fn flip(&self) -> Phase {
        let previous = Phase::from_u8(self.raw.fetch_xor(1, Ordering::AcqRel));
        previous.toggled()
    }
}
