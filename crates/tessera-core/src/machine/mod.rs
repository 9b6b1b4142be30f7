//! Build/execute state machine and its control thread.
//!
//! # Architecture
//!
//! ```text
//! ControlHandle ──Invoke──┐
//! MachineClient ──Translation──┼──► mpsc ──► control thread ──► BuildExecuteStateMachine
//! ModelStatusSink ──Model──┘                                          │
//!                                                                     ▼
//!                                                     broadcast<MachineSignal>
//! ```
//!
//! # Module Structure
//!
//! - `state` - `MachineState` and readiness classes
//! - `signal` - Signals published to subscribers
//! - `events` - Control events and the arbiter client
//! - `engine` - The state machine
//! - `control` - Control thread and its handle

mod control;
mod engine;
mod events;
mod signal;
mod state;

pub use control::{ControlHandle, ControlThread};
pub use engine::BuildExecuteStateMachine;
pub use events::{ControlEvent, ControlFn, TranslationEvent};
pub use signal::MachineSignal;
pub use state::MachineState;
