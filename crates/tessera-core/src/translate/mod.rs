//! Translation service interface and ownership arbitration.
//!
//! One translator (symbolic program to native module) is shared by every
//! client in the process. Clients never call it directly; they go through
//! [`TranslatorOwnershipArbiter`], which grants exclusive ownership and fans
//! translator progress out to the registered clients.
//!
//! ```text
//! client A ──┐                        ┌── Translator::translate
//! client B ──┼── TranslatorOwnership ─┤
//! client C ──┘      Arbiter           └── TranslationListener ──► owner + "always" clients
//! ```

mod arbiter;
mod types;

pub use arbiter::{ClientId, NotifyPolicy, TranslationListener, TranslatorOwnershipArbiter};
pub use types::{
    ExportMode, OutputType, TranslationPhase, TranslationRequest, Translator, TranslatorClient,
};
