//! Status callbacks from a running model back to the control thread.

use std::sync::mpsc::Sender;

use crate::document::{IdentifierHandle, OperationHandle};
use crate::machine::ControlEvent;

use super::types::AbortReason;

/// Asynchronous status reported by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    Started,
    Finished,
    Aborted {
        reason: AbortReason,
        operation: Option<OperationHandle>,
    },
    PausedOnUserRequest {
        operation: Option<OperationHandle>,
    },
    /// Paused at an instruction breakpoint or the run-to location.
    PausedAtOperation {
        operation: OperationHandle,
    },
    PausedOnVariableUpdate {
        operation: OperationHandle,
        identifier: IdentifierHandle,
    },
    Resumed,
}

/// Thread-safe handle a model uses to report its status.
///
/// Every report is queued for the control thread; none is processed on the
/// reporting thread.
#[derive(Clone)]
pub struct ModelStatusSink {
    events: Sender<ControlEvent>,
}

impl ModelStatusSink {
    pub fn new(events: Sender<ControlEvent>) -> Self {
        Self { events }
    }

    /// Queue an event. Events sent after the control thread has exited are
    /// dropped.
    pub fn send(&self, event: ModelEvent) {
        if self.events.send(ControlEvent::Model(event)).is_err() {
            tracing::debug!("Model status dropped: control thread has exited");
        }
    }

    pub fn started(&self) {
        self.send(ModelEvent::Started);
    }

    pub fn finished(&self) {
        self.send(ModelEvent::Finished);
    }

    pub fn aborted(&self, reason: AbortReason, operation: Option<OperationHandle>) {
        self.send(ModelEvent::Aborted { reason, operation });
    }

    pub fn paused_on_user_request(&self, operation: Option<OperationHandle>) {
        self.send(ModelEvent::PausedOnUserRequest { operation });
    }

    pub fn paused_at_operation(&self, operation: OperationHandle) {
        self.send(ModelEvent::PausedAtOperation { operation });
    }

    pub fn paused_on_variable_update(&self, operation: OperationHandle, identifier: IdentifierHandle) {
        self.send(ModelEvent::PausedOnVariableUpdate { operation, identifier });
    }

    pub fn resumed(&self) {
        self.send(ModelEvent::Resumed);
    }
}
