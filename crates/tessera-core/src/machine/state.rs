//! Machine states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the build/execute machine.
///
/// `Idle` and `BuildReady` are the ready states; every other state is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Nothing built.
    #[default]
    Idle,
    /// A build was requested but another client owns the translator.
    WaitingToBuild,
    /// Translating, compiling and linking.
    Building,
    /// A model module is loaded and not executing.
    BuildReady,
    Running,
    Paused,
    /// A pause was requested and has not been confirmed yet.
    Pausing,
    /// An abort was requested and has not been confirmed yet.
    Aborting,
}

impl MachineState {
    /// Whether a new top-level request can be served without interrupting anything.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Idle | Self::BuildReady)
    }

    pub fn is_active(self) -> bool {
        !self.is_ready()
    }

    /// Whether a model is executing (possibly paused).
    pub fn is_executing(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Pausing | Self::Aborting)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingToBuild => "waiting_to_build",
            Self::Building => "building",
            Self::BuildReady => "build_ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Pausing => "pausing",
            Self::Aborting => "aborting",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
