//! Console sink for user-facing runtime messages.

use serde::{Deserialize, Serialize};

/// Kind of message sent to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Information,
    Warning,
    Error,
    /// Output produced by the running model itself.
    ModelOutput,
}

/// Fire-and-forget console sink. Must be callable from any thread.
pub trait Console: Send + Sync {
    fn report_immediate(&self, kind: MessageKind, text: &str);
}

/// Console that forwards every message to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn report_immediate(&self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Information | MessageKind::ModelOutput => tracing::info!("{}", text),
            MessageKind::Warning => tracing::warn!("{}", text),
            MessageKind::Error => tracing::error!("{}", text),
        }
    }
}
