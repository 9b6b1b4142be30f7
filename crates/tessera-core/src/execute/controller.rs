//! Starting and steering a loaded model.

use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::EngineConfig;
use crate::document::{ElementId, OperationHandle, ProgramRoot};
use crate::model::{Model, ModelStatusSink, RngType, StartOptions};
use crate::paths;

/// Forwards execution requests to the loaded model.
///
/// Holds the RNG policy and the current run-to target. The caller (the state
/// machine) guarantees a model is loaded and in the right state for each call.
#[derive(Debug, Clone)]
pub struct ExecutionController {
    rng_type: RngType,
    rng_seed: Option<u64>,
    run_to: Option<OperationHandle>,
}

impl ExecutionController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rng_type: config.rng_type,
            rng_seed: config.rng_seed,
            run_to: None,
        }
    }

    /// The run-to target applied on the last start or resume.
    pub fn run_to(&self) -> Option<OperationHandle> {
        self.run_to
    }

    /// Seed the generators, apply breakpoints and the run-to target, and start the model.
    pub fn start_execution(
        &mut self,
        model: &mut dyn Model,
        root: &dyn ProgramRoot,
        debug_mode: bool,
        start_paused: bool,
        run_to_element: Option<ElementId>,
        status: ModelStatusSink,
    ) {
        let seeds = self.lane_seeds(model.number_threads());

        if debug_mode {
            let applied = self.configure_instruction_breakpoints(model, root);
            tracing::debug!("Applied {} instruction breakpoints", applied);

            self.set_run_to_operation(root, run_to_element);
        } else {
            self.run_to = None;
        }
        model.set_run_to_location(self.run_to);

        let working_directory = paths::working_directory(root.document_path().as_deref());
        tracing::info!(
            "Starting model ({}, {} lanes, paused: {}) in {}",
            self.rng_type,
            seeds.len(),
            start_paused,
            working_directory.display()
        );

        model.start(
            StartOptions {
                rng_type: self.rng_type,
                seeds,
                working_directory,
                start_paused,
            },
            status,
        );
    }

    /// Resolve `element` to the nearest enclosing operation and make it the run-to target.
    ///
    /// Walks up the ancestor chain. `None`, or an element with no tracked
    /// ancestor, clears the target.
    pub fn set_run_to_operation(
        &mut self,
        root: &dyn ProgramRoot,
        element: Option<ElementId>,
    ) -> Option<OperationHandle> {
        let mut current = element;
        self.run_to = None;

        while let Some(candidate) = current {
            if let Some(operation) = root.operation_for_element(candidate) {
                self.run_to = Some(operation.handle);
                break;
            }
            current = root.parent(candidate);
        }

        self.run_to
    }

    /// Re-apply the document's breakpoint flags to every operation of the model.
    ///
    /// Handles the document no longer knows about are cleared. Returns the
    /// number of breakpoints set.
    pub fn configure_instruction_breakpoints(&self, model: &mut dyn Model, root: &dyn ProgramRoot) -> usize {
        let mut applied = 0;

        for raw in 0..model.number_operation_handles() {
            let handle = OperationHandle::new(raw);
            let now_set = root
                .operation_for_handle(handle)
                .map(|operation| root.has_instruction_breakpoint(operation.element))
                .unwrap_or(false);

            if model.set_break_at_operation(handle, now_set) && now_set {
                applied += 1;
            }
        }

        applied
    }

    /// Set or clear the breakpoint on the operation owning `element`.
    pub fn set_instruction_breakpoint(
        &self,
        model: &mut dyn Model,
        root: &dyn ProgramRoot,
        element: ElementId,
        now_set: bool,
    ) -> bool {
        match root.operation_for_element(element) {
            Some(operation) => model.set_break_at_operation(operation.handle, now_set),
            None => false,
        }
    }

    /// Clear the breakpoint on every operation of the model.
    pub fn clear_all_instruction_breakpoints(&self, model: &mut dyn Model) -> bool {
        let mut success = true;
        for raw in 0..model.number_operation_handles() {
            success &= model.set_break_at_operation(OperationHandle::new(raw), false);
        }
        success
    }

    pub fn abort_execution(&mut self, model: &mut dyn Model) {
        self.run_to = None;
        model.abort();
    }

    pub fn pause_execution(&mut self, model: &mut dyn Model) {
        model.pause();
    }

    /// Resume a paused model, or execute a single operation when `single_step` is set.
    pub fn resume_execution(
        &mut self,
        model: &mut dyn Model,
        root: &dyn ProgramRoot,
        run_to_element: Option<ElementId>,
        single_step: bool,
    ) -> bool {
        if single_step {
            return model.single_step();
        }

        self.set_run_to_operation(root, run_to_element);
        model.set_run_to_location(self.run_to);
        model.resume()
    }

    fn lane_seeds(&self, lanes: u32) -> Vec<u64> {
        let lanes = lanes.max(1) as u64;
        match self.rng_seed {
            Some(seed) => (0..lanes).map(|lane| seed.wrapping_add(lane)).collect(),
            None => (0..lanes).map(|_| OsRng.next_u64()).collect(),
        }
    }
}
