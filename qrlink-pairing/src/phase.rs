use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete state of one pairing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingPhase {
    #[default]
    Idle,
    Connecting,
    Waiting,
    Scanned,
    Completed,
    Error,
}

impl PairingPhase {
    pub const ALL: [PairingPhase; 6] = [
        PairingPhase::Idle,
        PairingPhase::Connecting,
        PairingPhase::Waiting,
        PairingPhase::Scanned,
        PairingPhase::Completed,
        PairingPhase::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PairingPhase::Idle => "idle",
            PairingPhase::Connecting => "connecting",
            PairingPhase::Waiting => "waiting",
            PairingPhase::Scanned => "scanned",
            PairingPhase::Completed => "completed",
            PairingPhase::Error => "error",
        }
    }

    /// A transport is (or is about to be) open and the backend may still talk.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            PairingPhase::Connecting | PairingPhase::Waiting | PairingPhase::Scanned
        )
    }

    /// Nothing further will happen without a new `start()`.
    pub fn is_settled(&self) -> bool {
        !self.is_live()
    }
}

impl fmt::Display for PairingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
