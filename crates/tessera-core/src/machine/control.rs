//! Dedicated control thread owning the state machine.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast;

use crate::document::{ElementId, ProgramRoot};
use crate::error::{Error, Result};
use crate::value::{CalculatedValue, Value};

use super::engine::BuildExecuteStateMachine;
use super::events::ControlEvent;
use super::signal::MachineSignal;
use super::state::MachineState;

/// Thread processing every request and callback for one machine, in order.
///
/// The thread exits once the machine has shut down.
pub struct ControlThread {
    handle: ControlHandle,
    thread: Option<JoinHandle<()>>,
}

impl ControlThread {
    /// Move `machine` onto a new thread draining `events`.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(machine: BuildExecuteStateMachine, events: Receiver<ControlEvent>) -> Result<Self> {
        let handle = ControlHandle {
            events: machine.events(),
            signals: machine.signal_sender(),
        };

        let thread = thread::Builder::new()
            .name("tessera-control".to_string())
            .spawn(move || run_loop(machine, events))?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Request shutdown and wait for the thread to finish.
    ///
    /// # Errors
    /// Returns [`Error::ControlThreadGone`] if the thread panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // The thread may already have exited
        let _ = self.handle.post(BuildExecuteStateMachine::shutdown_now);
        thread.join().map_err(|_| Error::ControlThreadGone)
    }
}

impl Drop for ControlThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Control thread ended abnormally: {}", e);
        }
    }
}

fn run_loop(mut machine: BuildExecuteStateMachine, events: Receiver<ControlEvent>) {
    tracing::debug!("Control thread started");

    while let Ok(event) = events.recv() {
        machine.handle(event);
        if machine.has_shut_down() {
            break;
        }
    }

    tracing::debug!("Control thread exiting");
}

/// Cloneable front end to a [`ControlThread`].
///
/// Every call is queued behind earlier events. Calls returning a value block
/// until the control thread has processed them.
#[derive(Clone)]
pub struct ControlHandle {
    events: Sender<ControlEvent>,
    signals: broadcast::Sender<MachineSignal>,
}

impl ControlHandle {
    /// Run `request` on the control thread and wait for its result.
    ///
    /// Must not be called from the control thread itself.
    ///
    /// # Errors
    /// Returns [`Error::ControlThreadGone`] if the thread has exited.
    pub fn invoke<R, F>(&self, request: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut BuildExecuteStateMachine) -> R + Send + 'static,
    {
        let (reply, result) = mpsc::sync_channel(1);
        self.post(move |machine| {
            // The caller may have stopped waiting
            let _ = reply.send(request(machine));
        })?;
        result.recv().map_err(|_| Error::ControlThreadGone)
    }

    /// Queue `request` without waiting for it.
    ///
    /// # Errors
    /// Returns [`Error::ControlThreadGone`] if the thread has exited.
    pub fn post<F>(&self, request: F) -> Result<()>
    where
        F: FnOnce(&mut BuildExecuteStateMachine) + Send + 'static,
    {
        self.events
            .send(ControlEvent::Invoke(Box::new(request)))
            .map_err(|_| Error::ControlThreadGone)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MachineSignal> {
        self.signals.subscribe()
    }

    pub fn run(&self, root: Arc<dyn ProgramRoot>, debug_mode: bool, run_to_element: Option<ElementId>) -> Result<()> {
        self.invoke(move |machine| machine.run(&root, debug_mode, run_to_element))
    }

    pub fn step(&self, root: Arc<dyn ProgramRoot>) -> Result<()> {
        self.invoke(move |machine| machine.step(&root))
    }

    pub fn pause(&self) -> Result<()> {
        self.invoke(BuildExecuteStateMachine::pause)
    }

    pub fn resume(&self, run_to_element: Option<ElementId>) -> Result<()> {
        self.invoke(move |machine| machine.resume(run_to_element))
    }

    pub fn pause_or_resume(&self) -> Result<()> {
        self.invoke(BuildExecuteStateMachine::pause_or_resume)
    }

    pub fn abort(&self) -> Result<()> {
        self.invoke(BuildExecuteStateMachine::abort)
    }

    /// Request shutdown without waiting for it to complete.
    pub fn shutdown_now(&self) -> Result<()> {
        self.post(BuildExecuteStateMachine::shutdown_now)
    }

    pub fn set_instruction_breakpoint(&self, element: ElementId, now_set: bool) -> Result<bool> {
        self.invoke(move |machine| machine.set_instruction_breakpoint(element, now_set))
    }

    pub fn clear_instruction_breakpoint(&self, element: ElementId) -> Result<bool> {
        self.invoke(move |machine| machine.clear_instruction_breakpoint(element))
    }

    pub fn clear_all_instruction_breakpoints(&self) -> Result<bool> {
        self.invoke(BuildExecuteStateMachine::clear_all_instruction_breakpoints)
    }

    pub fn update_variable(&self, calculated: CalculatedValue) -> Result<bool> {
        self.invoke(move |machine| machine.update_variable(&calculated))
    }

    pub fn state(&self) -> Result<MachineState> {
        self.invoke(|machine| machine.state())
    }

    pub fn is_ready(&self) -> Result<bool> {
        self.invoke(|machine| machine.is_ready())
    }

    pub fn is_active(&self) -> Result<bool> {
        self.invoke(|machine| machine.is_active())
    }

    pub fn is_running(&self, root: Option<Arc<dyn ProgramRoot>>) -> Result<bool> {
        self.invoke(move |machine| machine.is_running(root.as_ref()))
    }

    pub fn root_element(&self) -> Result<Option<Arc<dyn ProgramRoot>>> {
        self.invoke(|machine| machine.root_element())
    }

    pub fn paused_element(&self) -> Result<Option<ElementId>> {
        self.invoke(|machine| machine.paused_element())
    }

    pub fn value_for_variable(&self, element: ElementId) -> Result<Option<Value>> {
        self.invoke(move |machine| machine.value_for_variable(element))
    }
}
