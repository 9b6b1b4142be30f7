//! Terminal console for runtime messages.

use tessera_core::{Console, MessageKind};

use crate::colors;

/// Prints model output to stdout and everything else to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConsole;

/// Prefix and colour for a message kind.
fn decoration(kind: MessageKind) -> (&'static str, &'static str) {
    match kind {
        MessageKind::Information => (colors::DIM, ""),
        MessageKind::Warning => (colors::YELLOW, "warning: "),
        MessageKind::Error => (colors::RED, "error: "),
        MessageKind::ModelOutput => ("", ""),
    }
}

impl Console for TerminalConsole {
    fn report_immediate(&self, kind: MessageKind, text: &str) {
        let (color, prefix) = decoration(kind);
        match kind {
            MessageKind::ModelOutput => println!("{}", text),
            _ => eprintln!("{}{}{}{}", color, prefix, text, colors::RESET),
        }
    }
}
