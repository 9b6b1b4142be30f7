//! Execution control for a loaded model.
//!
//! - `controller` - Start, pause, resume, step, abort; breakpoints and run-to
//! - `variables` - Live variable values mirrored into the document

mod controller;
mod variables;

pub use controller::ExecutionController;
pub use variables::VariableChangeTracker;
