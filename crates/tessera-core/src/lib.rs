//! Build/execute orchestration core for the Tessera document runtime.
//!
//! This crate provides:
//! - A goal-directed state machine sequencing build, load, run/pause/step/abort and unload
//! - An ownership arbiter sharing one translator among many clients
//! - Compiled model module lifecycle (load, symbol resolution, instantiate, teardown)
//! - Breakpoint and run-to configuration for a running model
//! - Propagation of live variable values back into the document

pub mod config;
pub mod console;
pub mod document;
pub mod error;
pub mod execute;
pub mod machine;
pub mod model;
pub mod paths;
pub mod translate;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use console::{Console, MessageKind, TracingConsole};
pub use document::{
    Diagnostic, ElementId, IdentifierEntry, IdentifierHandle, Operation, OperationHandle,
    ProgramRoot, RootRef,
};
pub use error::{Error, Result};
pub use execute::{ExecutionController, VariableChangeTracker};
pub use machine::{
    BuildExecuteStateMachine, ControlEvent, ControlHandle, ControlThread, MachineSignal,
    MachineState,
};
pub use model::{
    AbortReason, DylibLoader, Model, ModelEvent, ModelStatusSink, ModuleLifecycle, ModuleLoader,
    RngType, StartOptions,
};
pub use translate::{
    ClientId, ExportMode, NotifyPolicy, OutputType, TranslationListener, TranslationPhase,
    TranslationRequest, Translator, TranslatorClient, TranslatorOwnershipArbiter,
};
pub use value::{CalculatedValue, Value};
