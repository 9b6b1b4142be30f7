//! Events serialized onto the control thread.

use std::fmt;
use std::sync::mpsc::Sender;

use crate::document::Diagnostic;
use crate::model::ModelEvent;
use crate::translate::{TranslationPhase, TranslatorClient};

use super::engine::BuildExecuteStateMachine;

/// Closure run against the machine on the control thread.
pub type ControlFn = Box<dyn FnOnce(&mut BuildExecuteStateMachine) + Send>;

/// Everything the control thread processes, in arrival order.
pub enum ControlEvent {
    /// A request from a front end.
    Invoke(ControlFn),
    /// A callback from the translator or the arbiter.
    Translation(TranslationEvent),
    /// A status report from the running model.
    Model(ModelEvent),
}

impl fmt::Debug for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke(_) => f.write_str("Invoke(..)"),
            Self::Translation(event) => f.debug_tuple("Translation").field(event).finish(),
            Self::Model(event) => f.debug_tuple("Model").field(event).finish(),
        }
    }
}

/// Translator and ownership callbacks received by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationEvent {
    OwnsGenerator,
    GeneratorBusy,
    GeneratorIdle,
    Started,
    PhaseStarted { phase: TranslationPhase, steps: u32 },
    Completed { success: bool },
    Aborted,
    ErrorDetected(Diagnostic),
}

/// The machine's registration with the arbiter.
///
/// Callbacks may arrive on any thread; each is queued for the control thread.
pub(crate) struct MachineClient {
    events: Sender<ControlEvent>,
}

impl MachineClient {
    pub(crate) fn new(events: Sender<ControlEvent>) -> Self {
        Self { events }
    }

    fn send(&self, event: TranslationEvent) {
        if self.events.send(ControlEvent::Translation(event)).is_err() {
            tracing::debug!("Translation event dropped: control thread has exited");
        }
    }
}

impl TranslatorClient for MachineClient {
    fn client_owns_generator(&self) {
        self.send(TranslationEvent::OwnsGenerator);
    }

    fn generator_busy(&self) {
        self.send(TranslationEvent::GeneratorBusy);
    }

    fn generator_idle(&self) {
        self.send(TranslationEvent::GeneratorIdle);
    }

    fn translation_started(&self) {
        self.send(TranslationEvent::Started);
    }

    fn translation_phase_started(&self, phase: TranslationPhase, steps: u32) {
        self.send(TranslationEvent::PhaseStarted { phase, steps });
    }

    fn translation_completed(&self, success: bool) {
        self.send(TranslationEvent::Completed { success });
    }

    fn translation_aborted(&self) {
        self.send(TranslationEvent::Aborted);
    }

    fn translation_error_detected(&self, diagnostic: &Diagnostic) {
        self.send(TranslationEvent::ErrorDetected(diagnostic.clone()));
    }
}
