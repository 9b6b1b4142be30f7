//! Signals published by the machine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::document::{ElementId, IdentifierHandle};

/// Notification published to every subscriber of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineSignal {
    /// The machine crossed into (`true`) or out of (`false`) a ready state.
    Ready { ready: bool },

    /// Complement of `Ready`, emitted alongside it.
    Active { active: bool },

    /// The model started executing.
    Running,

    /// The model ran to completion.
    Stopped,

    /// Execution ended through an abort.
    Aborted {
        /// Element that raised a runtime error, if any.
        element: Option<ElementId>,
    },

    PausedOnUserRequest { element: Option<ElementId> },

    /// Paused at an instruction breakpoint or the run-to location.
    PausedAtInstructionBreakpoint { element: Option<ElementId> },

    PausedOnVariableUpdate {
        element: Option<ElementId>,
        identifier: IdentifierHandle,
    },

    Resumed,

    /// The build output directory does not accept new files.
    DirectoryIsReadOnly { path: PathBuf },

    /// A requested shutdown completed.
    NowShutdown,
}

impl MachineSignal {
    /// Element the document should highlight, if any.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::Aborted { element }
            | Self::PausedOnUserRequest { element }
            | Self::PausedAtInstructionBreakpoint { element }
            | Self::PausedOnVariableUpdate { element, .. } => *element,
            _ => None,
        }
    }

    pub fn is_pause(&self) -> bool {
        matches!(
            self,
            Self::PausedOnUserRequest { .. }
                | Self::PausedAtInstructionBreakpoint { .. }
                | Self::PausedOnVariableUpdate { .. }
        )
    }
}
