//! The goal-directed build/execute state machine.
//!
//! Every request writes a target state and calls
//! [`BuildExecuteStateMachine::transition_to_new_state`], which performs at most
//! one action toward the target. The current state advances when the
//! asynchronous operation reports back, and each report handler transitions
//! again, so the machine reaches the latest target without polling.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::console::{Console, MessageKind};
use crate::document::{Diagnostic, ElementId, OperationHandle, ProgramRoot, RootRef};
use crate::error::Error;
use crate::execute::{ExecutionController, VariableChangeTracker};
use crate::model::{AbortReason, ModelEvent, ModelInstance, ModelStatusSink, ModuleLifecycle, ModuleLoader};
use crate::translate::{ClientId, ExportMode, NotifyPolicy, TranslationRequest, TranslatorOwnershipArbiter};
use crate::value::{CalculatedValue, Value};

use super::events::{ControlEvent, MachineClient, TranslationEvent};
use super::signal::MachineSignal;
use super::state::MachineState;

/// Capacity of the signal channel. Slow subscribers lose the oldest signals.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Sequences build, load, run/pause/step/abort and unload for one document at a time.
///
/// Not thread-safe by itself: every method must be called from the thread
/// that drains the event receiver returned by [`BuildExecuteStateMachine::new`].
/// [`super::ControlThread`] does this on a dedicated thread.
pub struct BuildExecuteStateMachine {
    config: EngineConfig,
    arbiter: TranslatorOwnershipArbiter,
    client_id: ClientId,
    lifecycle: ModuleLifecycle,
    controller: ExecutionController,
    variables: VariableChangeTracker,
    console: Arc<dyn Console>,
    events: Sender<ControlEvent>,
    signals: broadcast::Sender<MachineSignal>,

    current_state: MachineState,
    target_state: MachineState,

    /// Root of the build in flight or loaded.
    current_root: RootRef,
    current_debug_mode: bool,
    requested_root: RootRef,
    requested_debug_mode: bool,

    run_to_element: Option<ElementId>,
    paused_element: Option<ElementId>,

    /// A single step was requested and not yet issued.
    single_step_requested: bool,
    /// A single step was issued and the model has not paused again.
    stepping: bool,
    /// A start, resume or step was issued and the model has not reported back.
    awaiting_model: bool,
    started_paused: bool,

    forced_shutdown: bool,
    shut_down: bool,
}

impl BuildExecuteStateMachine {
    /// Create an idle machine registered with `arbiter`.
    ///
    /// Returns the machine and the receiver of its control events; the caller
    /// must feed every received event back into [`Self::handle`].
    pub fn new(
        config: EngineConfig,
        arbiter: TranslatorOwnershipArbiter,
        loader: Box<dyn ModuleLoader>,
        console: Arc<dyn Console>,
    ) -> (Self, Receiver<ControlEvent>) {
        let (events, receiver) = mpsc::channel();
        let client_id = arbiter.add_client(
            Arc::new(MachineClient::new(events.clone())),
            NotifyPolicy::WhileOwner,
        );
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);

        let machine = Self {
            controller: ExecutionController::new(&config),
            config,
            arbiter,
            client_id,
            lifecycle: ModuleLifecycle::new(loader),
            variables: VariableChangeTracker::new(),
            console,
            events,
            signals,
            current_state: MachineState::Idle,
            target_state: MachineState::Idle,
            current_root: RootRef::none(),
            current_debug_mode: false,
            requested_root: RootRef::none(),
            requested_debug_mode: false,
            run_to_element: None,
            paused_element: None,
            single_step_requested: false,
            stepping: false,
            awaiting_model: false,
            started_paused: false,
            forced_shutdown: false,
            shut_down: false,
        };

        (machine, receiver)
    }

    /// Sender for events destined to this machine.
    pub fn events(&self) -> Sender<ControlEvent> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MachineSignal> {
        self.signals.subscribe()
    }

    pub(crate) fn signal_sender(&self) -> broadcast::Sender<MachineSignal> {
        self.signals.clone()
    }

    /// Process one control event.
    pub fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Invoke(request) => request(self),
            ControlEvent::Translation(event) => self.handle_translation(event),
            ControlEvent::Model(event) => self.handle_model(event),
        }
    }

    // Requests

    /// Build `root` if needed and run it.
    pub fn run(&mut self, root: &Arc<dyn ProgramRoot>, debug_mode: bool, run_to_element: Option<ElementId>) {
        if self.refuse_after_shutdown("run") {
            return;
        }

        self.requested_root = RootRef::new(root);
        self.requested_debug_mode = debug_mode;
        self.run_to_element = run_to_element;
        self.single_step_requested = false;
        self.target_state = MachineState::Running;
        self.transition_to_new_state();
    }

    /// Execute one operation of `root`.
    ///
    /// Steps the paused model when it is a debug build of `root`; otherwise
    /// builds `root` in debug mode and starts it paused.
    pub fn step(&mut self, root: &Arc<dyn ProgramRoot>) {
        if self.refuse_after_shutdown("step") {
            return;
        }

        let can_step = self.current_state == MachineState::Paused
            && self.current_debug_mode
            && self.current_root.refers_to(root)
            && self.lifecycle.is_loaded();

        if can_step {
            self.single_step_requested = true;
        } else {
            self.requested_root = RootRef::new(root);
            self.requested_debug_mode = true;
            self.run_to_element = None;
            self.single_step_requested = false;
        }
        self.target_state = MachineState::Paused;
        self.transition_to_new_state();
    }

    pub fn pause(&mut self) {
        if self.refuse_after_shutdown("pause") {
            return;
        }
        if self.target_state != MachineState::Running {
            tracing::debug!("Pause ignored: target is {}", self.target_state);
            return;
        }

        self.target_state = MachineState::Paused;
        self.transition_to_new_state();
    }

    /// Resume a paused run, optionally stopping again at `run_to_element`.
    pub fn resume(&mut self, run_to_element: Option<ElementId>) {
        if self.refuse_after_shutdown("resume") {
            return;
        }
        if self.target_state != MachineState::Paused {
            tracing::debug!("Resume ignored: target is {}", self.target_state);
            return;
        }

        self.run_to_element = run_to_element;
        self.single_step_requested = false;
        self.target_state = MachineState::Running;
        self.transition_to_new_state();
    }

    pub fn pause_or_resume(&mut self) {
        match self.target_state {
            MachineState::Running => self.pause(),
            MachineState::Paused => self.resume(None),
            other => tracing::debug!("Pause/resume ignored: target is {}", other),
        }
    }

    /// Stop the run and keep the module loaded.
    ///
    /// Before any module is loaded this cancels the pending build instead.
    pub fn abort(&mut self) {
        if self.refuse_after_shutdown("abort") {
            return;
        }
        if !matches!(self.target_state, MachineState::Running | MachineState::Paused) {
            tracing::debug!("Abort ignored: target is {}", self.target_state);
            return;
        }

        self.single_step_requested = false;
        self.target_state = if self.lifecycle.is_loaded() {
            MachineState::BuildReady
        } else {
            MachineState::Idle
        };
        self.transition_to_new_state();
    }

    /// Wind down to `Idle` and emit [`MachineSignal::NowShutdown`] once there.
    pub fn shutdown_now(&mut self) {
        if self.forced_shutdown {
            return;
        }
        tracing::info!("Shutdown requested in state {}", self.current_state);

        self.forced_shutdown = true;
        self.single_step_requested = false;
        self.target_state = MachineState::Idle;
        self.transition_to_new_state();
    }

    /// Set or clear the breakpoint on the operation owning `element`.
    ///
    /// Fails unless a module is loaded and `element` belongs to its root.
    pub fn set_instruction_breakpoint(&mut self, element: ElementId, now_set: bool) -> bool {
        let Some(root) = self.loaded_root() else {
            return false;
        };
        if !root.contains(element) {
            tracing::debug!("{} is not part of the built document", element);
            return false;
        }
        let Some(model) = self.lifecycle.model_mut() else {
            return false;
        };

        self.controller.set_instruction_breakpoint(model, &*root, element, now_set)
    }

    pub fn clear_instruction_breakpoint(&mut self, element: ElementId) -> bool {
        self.set_instruction_breakpoint(element, false)
    }

    pub fn clear_all_instruction_breakpoints(&mut self) -> bool {
        match self.lifecycle.model_mut() {
            Some(model) => self.controller.clear_all_instruction_breakpoints(model),
            None => false,
        }
    }

    /// Write a value into the live model and show it on every bound element.
    pub fn update_variable(&mut self, calculated: &CalculatedValue) -> bool {
        let Some(root) = self.loaded_root() else {
            return false;
        };
        let Some(instance) = self.lifecycle.instance_mut() else {
            return false;
        };

        let (model, snapshot) = instance.parts_mut();
        self.variables.update_variable(model, snapshot, &*root, calculated)
    }

    // Queries

    pub fn state(&self) -> MachineState {
        self.current_state
    }

    pub fn target_state(&self) -> MachineState {
        self.target_state
    }

    pub fn is_ready(&self) -> bool {
        self.current_state.is_ready()
    }

    pub fn is_active(&self) -> bool {
        self.current_state.is_active()
    }

    /// Whether a model is executing, optionally restricted to `root`.
    pub fn is_running(&self, root: Option<&Arc<dyn ProgramRoot>>) -> bool {
        self.current_state.is_executing() && root.is_none_or(|root| self.current_root.refers_to(root))
    }

    /// Root of the build in flight or loaded, if it is still alive.
    pub fn root_element(&self) -> Option<Arc<dyn ProgramRoot>> {
        self.current_root.upgrade()
    }

    /// Whether the current build was made in debug mode.
    pub fn debug_mode(&self) -> bool {
        self.current_debug_mode
    }

    /// Element where the model last paused or failed.
    pub fn paused_element(&self) -> Option<ElementId> {
        self.paused_element
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle.is_loaded()
    }

    /// Path of the compiled module, while it exists.
    pub fn module_path(&self) -> Option<&std::path::Path> {
        self.lifecycle.module_path()
    }

    /// Last value read for the variable bound to `element`.
    pub fn value_for_variable(&self, element: ElementId) -> Option<Value> {
        let root = self.current_root.upgrade()?;
        let instance = self.lifecycle.instance()?;
        self.variables.value_for_variable(instance.snapshot(), &*root, element)
    }

    /// Whether [`MachineSignal::NowShutdown`] has been emitted.
    pub fn has_shut_down(&self) -> bool {
        self.shut_down
    }

    // Transitions

    fn new_build_needed(&self) -> bool {
        !self.current_root.ptr_eq(&self.requested_root) || self.current_debug_mode != self.requested_debug_mode
    }

    /// Take one step from the current state toward the target state.
    fn transition_to_new_state(&mut self) {
        use MachineState::*;

        if self.awaiting_model {
            return;
        }

        tracing::trace!("Transition {} -> {}", self.current_state, self.target_state);

        match (self.current_state, self.target_state) {
            (_, WaitingToBuild | Building | Pausing | Aborting) => {
                panic!("{} is not a valid target state", self.target_state)
            }

            (Idle, Idle) => self.check_shutdown(),
            (Idle, _) => self.start_build(),

            (WaitingToBuild, Idle) => {
                self.set_current_state(Idle);
                self.check_shutdown();
            }
            (WaitingToBuild, _) => self.start_build(),

            // The completion callback decides
            (Building, _) | (Pausing, _) | (Aborting, _) => {}

            (BuildReady, Idle) => {
                self.tear_down();
                self.set_current_state(Idle);
                self.check_shutdown();
            }
            (BuildReady, BuildReady) => {}
            (BuildReady, Running | Paused) => {
                if self.new_build_needed() {
                    self.tear_down();
                    self.set_current_state(Idle);
                    self.transition_to_new_state();
                } else {
                    self.start_execution();
                }
            }

            (Running, Running) => {
                if self.new_build_needed() {
                    self.abort_execution();
                }
            }
            (Running, Paused) => {
                if !self.stepping {
                    self.pause_execution();
                }
            }
            (Running | Paused, Idle | BuildReady) => self.abort_execution(),

            (Paused, Running) => {
                if self.new_build_needed() {
                    self.abort_execution();
                } else {
                    self.resume_execution(false);
                }
            }
            (Paused, Paused) => {
                if self.new_build_needed() {
                    self.abort_execution();
                } else if self.single_step_requested {
                    self.single_step_requested = false;
                    self.resume_execution(true);
                }
            }
        }
    }

    fn start_build(&mut self) {
        let Some(root) = self.requested_root.upgrade() else {
            tracing::warn!("Build abandoned: the document was closed");
            self.target_state = MachineState::Idle;
            self.set_current_state(MachineState::Idle);
            self.check_shutdown();
            return;
        };

        let output_path = match self
            .lifecycle
            .prepare_build(root.document_path().as_deref(), &self.config)
        {
            Ok(path) => path,
            Err(Error::DirectoryNotWritable(dir)) => {
                self.console.report_immediate(
                    MessageKind::Error,
                    &format!("Cannot write the model module to {}", dir.display()),
                );
                self.emit(MachineSignal::DirectoryIsReadOnly { path: dir });
                self.abandon_build();
                return;
            }
            Err(e) => {
                self.console
                    .report_immediate(MessageKind::Error, &format!("Cannot prepare build: {}", e));
                self.abandon_build();
                return;
            }
        };

        if !self.arbiter.try_to_own(self.client_id) {
            tracing::debug!("Translator busy, waiting to build");
            self.set_current_state(MachineState::WaitingToBuild);
            return;
        }

        self.current_root = self.requested_root.clone();
        self.current_debug_mode = self.requested_debug_mode;
        self.set_current_state(MachineState::Building);

        let request = TranslationRequest {
            root,
            output_path,
            output_type: self.config.output_type,
            export_mode: ExportMode::from_debug_mode(self.current_debug_mode),
        };

        match self.arbiter.translate(self.client_id, request) {
            Ok(true) => {}
            Ok(false) => {
                self.console
                    .report_immediate(MessageKind::Error, "The translator could not start");
                self.abandon_build();
            }
            Err(e) => {
                self.console
                    .report_immediate(MessageKind::Error, &format!("Translation not started: {}", e));
                self.abandon_build();
            }
        }
    }

    /// Unwind a failed build and fall back to `Idle`.
    fn abandon_build(&mut self) {
        if self.arbiter.owner() == Some(self.client_id) {
            self.arbiter.release_ownership(self.client_id);
        }
        self.lifecycle.delete_model_file();
        self.current_root = RootRef::none();

        self.target_state = MachineState::Idle;
        self.set_current_state(MachineState::Idle);
        self.check_shutdown();
    }

    fn start_execution(&mut self) {
        let Some(root) = self.current_root.upgrade() else {
            tracing::warn!("Run abandoned: the document was closed");
            self.tear_down();
            self.target_state = MachineState::Idle;
            self.set_current_state(MachineState::Idle);
            self.check_shutdown();
            return;
        };
        let start_paused = self.target_state == MachineState::Paused;
        let status = ModelStatusSink::new(self.events.clone());
        let run_to = self.run_to_element.take();

        let Some(model) = self.lifecycle.model_mut() else {
            panic!("{} without a loaded model", self.current_state);
        };

        self.controller
            .start_execution(model, &*root, self.current_debug_mode, start_paused, run_to, status);
        self.started_paused = start_paused;
        self.awaiting_model = true;
    }

    fn pause_execution(&mut self) {
        let Some(model) = self.lifecycle.model_mut() else {
            panic!("pause requested in {} without a loaded model", self.current_state);
        };

        self.controller.pause_execution(model);
        self.set_current_state(MachineState::Pausing);
    }

    fn abort_execution(&mut self) {
        let Some(model) = self.lifecycle.model_mut() else {
            panic!("abort requested in {} without a loaded model", self.current_state);
        };

        self.controller.abort_execution(model);
        self.stepping = false;
        self.set_current_state(MachineState::Aborting);
    }

    fn resume_execution(&mut self, single_step: bool) {
        let Some(root) = self.current_root.upgrade() else {
            tracing::warn!("Resume abandoned: the document was closed");
            self.abort_execution();
            return;
        };
        let run_to = self.run_to_element.take();
        let Some(model) = self.lifecycle.model_mut() else {
            panic!("resume requested in {} without a loaded model", self.current_state);
        };

        if self.controller.resume_execution(model, &*root, run_to, single_step) {
            self.stepping = single_step;
            self.awaiting_model = true;
        } else {
            tracing::warn!("The model refused to {}", if single_step { "step" } else { "resume" });
            self.target_state = MachineState::Paused;
        }
    }

    /// Destroy the model, unload its module and delete the file.
    fn tear_down(&mut self) {
        if let Some(root) = self.current_root.upgrade() {
            self.variables
                .invalidate_all(&*root, self.lifecycle.instance().map(ModelInstance::snapshot));
        }
        if self.lifecycle.is_loaded() {
            self.lifecycle.expunge_loaded_model();
        }
        self.lifecycle.delete_model_file();

        self.current_root = RootRef::none();
        self.paused_element = None;
        self.stepping = false;
    }

    fn check_shutdown(&mut self) {
        if self.forced_shutdown && !self.shut_down && self.current_state == MachineState::Idle {
            tracing::info!("Shutdown complete");
            self.shut_down = true;
            self.emit(MachineSignal::NowShutdown);
        }
    }

    // Translation callbacks

    fn handle_translation(&mut self, event: TranslationEvent) {
        match event {
            TranslationEvent::GeneratorIdle => {
                if self.current_state == MachineState::WaitingToBuild {
                    self.transition_to_new_state();
                }
            }
            TranslationEvent::OwnsGenerator | TranslationEvent::GeneratorBusy => {}
            TranslationEvent::Started => tracing::debug!("Translation started"),
            TranslationEvent::PhaseStarted { phase, steps } => {
                self.console
                    .report_immediate(MessageKind::Information, &format!("{} ({} steps)", phase, steps));
            }
            TranslationEvent::Completed { success } => self.translation_completed(success),
            TranslationEvent::Aborted => self.translation_aborted(),
            TranslationEvent::ErrorDetected(diagnostic) => self.translation_error_detected(diagnostic),
        }
    }

    fn translation_completed(&mut self, success: bool) {
        assert_eq!(
            self.current_state,
            MachineState::Building,
            "translation completed while {} (target {})",
            self.current_state,
            self.target_state
        );
        self.arbiter.release_ownership(self.client_id);

        if !success {
            self.console.report_immediate(MessageKind::Error, "Translation failed");
            self.abandon_build();
            return;
        }

        match self.lifecycle.load_model() {
            Ok(()) => {
                self.set_current_state(MachineState::BuildReady);
                self.transition_to_new_state();
            }
            Err(e) => {
                self.console
                    .report_immediate(MessageKind::Error, &format!("Failed to load the model: {}", e));
                self.abandon_build();
            }
        }
    }

    fn translation_aborted(&mut self) {
        if self.current_state != MachineState::Building {
            tracing::debug!("Translation abort reported while {}", self.current_state);
            return;
        }
        self.console.report_immediate(MessageKind::Warning, "Translation aborted");
        self.abandon_build();
    }

    fn translation_error_detected(&mut self, diagnostic: Diagnostic) {
        self.console
            .report_immediate(MessageKind::Error, &diagnostic.to_string());

        if let (Some(element), Some(root)) = (diagnostic.element, self.current_root.upgrade()) {
            if root.contains(element) {
                root.attach_diagnostic(element, diagnostic);
            }
        }
    }

    // Model callbacks

    fn handle_model(&mut self, event: ModelEvent) {
        match event {
            ModelEvent::Started => self.model_started(),
            ModelEvent::Finished => self.model_finished(),
            ModelEvent::Aborted { reason, operation } => self.model_aborted(reason, operation),
            ModelEvent::PausedOnUserRequest { operation } => {
                let element = self.element_for_operation(operation);
                self.model_paused(MachineSignal::PausedOnUserRequest { element }, element, false);
            }
            ModelEvent::PausedAtOperation { operation } => {
                let element = self.element_for_operation(Some(operation));
                self.model_paused(MachineSignal::PausedAtInstructionBreakpoint { element }, element, true);
            }
            ModelEvent::PausedOnVariableUpdate { operation, identifier } => {
                let element = self.element_for_operation(Some(operation));
                let signal = MachineSignal::PausedOnVariableUpdate { element, identifier };
                self.model_paused(signal, element, true);
            }
            ModelEvent::Resumed => self.model_resumed(),
        }
    }

    fn model_started(&mut self) {
        assert!(
            self.current_state == MachineState::BuildReady && self.awaiting_model,
            "model started while {} (target {})",
            self.current_state,
            self.target_state
        );
        self.awaiting_model = false;
        self.paused_element = None;

        let state = if self.started_paused {
            MachineState::Pausing
        } else {
            MachineState::Running
        };
        self.set_current_state(state);

        if let Some(root) = self.current_root.upgrade() {
            self.variables.clear_displayed(&*root);
        }
        self.emit(MachineSignal::Running);
        self.transition_to_new_state();
    }

    fn model_finished(&mut self) {
        assert!(
            matches!(
                self.current_state,
                MachineState::Running | MachineState::Pausing | MachineState::Aborting
            ),
            "model finished while {} (target {})",
            self.current_state,
            self.target_state
        );
        self.end_execution();
        self.emit(MachineSignal::Stopped);
        self.transition_to_new_state();
    }

    fn model_aborted(&mut self, reason: AbortReason, operation: Option<OperationHandle>) {
        assert!(
            self.current_state.is_executing(),
            "model aborted while {} (target {})",
            self.current_state,
            self.target_state
        );
        let element = self.element_for_operation(operation);

        if let AbortReason::Program { code, message } = &reason {
            let diagnostic = Diagnostic::new(element, *code, message.clone());
            self.console
                .report_immediate(MessageKind::Error, &diagnostic.to_string());
            if let (Some(element), Some(root)) = (element, self.current_root.upgrade()) {
                root.attach_diagnostic(element, diagnostic);
            }
        } else {
            tracing::info!("Model {}", reason);
        }

        self.end_execution();
        self.paused_element = element;
        self.emit(MachineSignal::Aborted { element });
        self.transition_to_new_state();
    }

    /// Common bookkeeping when the model stops executing for good.
    fn end_execution(&mut self) {
        self.awaiting_model = false;
        self.stepping = false;
        self.set_current_state(MachineState::BuildReady);
        self.update_variables();

        // Do not restart a completed run unless a different build was requested
        if matches!(self.target_state, MachineState::Running | MachineState::Paused) && !self.new_build_needed() {
            self.target_state = MachineState::BuildReady;
        }
    }

    fn model_paused(&mut self, signal: MachineSignal, element: Option<ElementId>, self_initiated: bool) {
        if self.current_state == MachineState::Aborting {
            tracing::debug!("Pause reported after abort was requested; waiting for the abort");
            return;
        }
        assert!(
            matches!(
                self.current_state,
                MachineState::Running | MachineState::Pausing | MachineState::Paused
            ),
            "model paused while {} (target {})",
            self.current_state,
            self.target_state
        );
        let was_running = self.current_state == MachineState::Running;
        // A step ends in a pause even when a resume was requested meanwhile
        let ended_step = self.stepping;

        self.awaiting_model = false;
        self.stepping = false;
        self.set_current_state(MachineState::Paused);
        self.paused_element = element;
        self.update_variables();

        if self_initiated && was_running && !ended_step && self.target_state == MachineState::Running {
            self.target_state = MachineState::Paused;
        }

        self.emit(signal);
        self.transition_to_new_state();
    }

    fn model_resumed(&mut self) {
        if self.current_state == MachineState::Aborting {
            self.awaiting_model = false;
            return;
        }
        assert!(
            matches!(self.current_state, MachineState::Paused | MachineState::Pausing),
            "model resumed while {} (target {})",
            self.current_state,
            self.target_state
        );
        self.awaiting_model = false;
        self.set_current_state(MachineState::Running);
        self.paused_element = None;
        self.emit(MachineSignal::Resumed);
        self.transition_to_new_state();
    }

    // Helpers

    fn update_variables(&mut self) {
        let Some(root) = self.current_root.upgrade() else {
            return;
        };
        let Some(instance) = self.lifecycle.instance_mut() else {
            return;
        };

        let (model, snapshot) = instance.parts_mut();
        let updated = self.variables.update_variables(model, snapshot, &*root);
        tracing::debug!("Updated {} variable displays", updated);
    }

    fn element_for_operation(&self, operation: Option<OperationHandle>) -> Option<ElementId> {
        let root = self.current_root.upgrade()?;
        root.operation_for_handle(operation?).map(|operation| operation.element)
    }

    /// The live root of the loaded module.
    fn loaded_root(&self) -> Option<Arc<dyn ProgramRoot>> {
        if !self.lifecycle.is_loaded() {
            return None;
        }
        self.current_root.upgrade()
    }

    fn refuse_after_shutdown(&self, request: &str) -> bool {
        if self.forced_shutdown {
            tracing::warn!("Ignoring {} request after shutdown", request);
        }
        self.forced_shutdown
    }

    fn set_current_state(&mut self, state: MachineState) {
        let was_ready = self.current_state.is_ready();
        if self.current_state != state {
            tracing::debug!("State {} -> {} (target {})", self.current_state, state, self.target_state);
        }
        self.current_state = state;

        if was_ready != state.is_ready() {
            self.emit(MachineSignal::Ready { ready: state.is_ready() });
            self.emit(MachineSignal::Active { active: state.is_active() });
        }
    }

    fn emit(&self, signal: MachineSignal) {
        tracing::trace!("Signal {:?}", signal);
        // No subscribers is fine
        let _ = self.signals.send(signal);
    }
}

/// Dropping the machine does not wait for a running model to report its
/// abort. The model is asked to abort and then deallocated at once, so
/// [`Model`](crate::model::Model) implementations must stop and join their worker threads when
/// dropped. Shut down through [`BuildExecuteStateMachine::shutdown_now`] to
/// wind down cooperatively instead.
impl Drop for BuildExecuteStateMachine {
    fn drop(&mut self) {
        // Aborts a translation we still own
        self.arbiter.remove_client(self.client_id);

        if self.current_state.is_executing() {
            tracing::warn!("Machine dropped while {}; aborting the model without waiting", self.current_state);
            if let Some(model) = self.lifecycle.model_mut() {
                model.abort();
            }
        }
        self.tear_down();
    }
}
