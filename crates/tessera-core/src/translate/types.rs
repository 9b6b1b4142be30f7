//! Types shared between the translator, the arbiter, and its clients.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{Diagnostic, ProgramRoot};

use super::TranslationListener;

/// Artifact kind the translator should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputType {
    /// Loadable model module.
    DynamicLibrary,
    /// Standalone executable.
    Executable,
    /// Object file for external linking.
    Object,
}

/// Whether the module is instrumented for interactive debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportMode {
    /// Optimized module without breakpoint or stepping hooks.
    Release,
    /// Module with operation-level hooks for breakpoints, stepping and
    /// variable-update pauses.
    Debug,
}

impl ExportMode {
    pub fn from_debug_mode(debug_mode: bool) -> Self {
        if debug_mode { Self::Debug } else { Self::Release }
    }
}

/// Stage of an in-flight translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationPhase {
    /// Producing native source from the element tree.
    Translating,
    /// Running the native compiler.
    Compiling,
    /// Linking the module.
    Linking,
}

impl fmt::Display for TranslationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Translating => f.write_str("translating"),
            Self::Compiling => f.write_str("compiling"),
            Self::Linking => f.write_str("linking"),
        }
    }
}

/// A request to translate one document root.
#[derive(Clone)]
pub struct TranslationRequest {
    pub root: Arc<dyn ProgramRoot>,
    pub output_path: PathBuf,
    pub output_type: OutputType,
    pub export_mode: ExportMode,
}

impl fmt::Debug for TranslationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationRequest")
            .field("output_path", &self.output_path)
            .field("output_type", &self.output_type)
            .field("export_mode", &self.export_mode)
            .finish_non_exhaustive()
    }
}

/// The shared translation service.
///
/// Implementations run their work in the background and report progress
/// through the listener they were handed; every callback may arrive on any
/// thread.
pub trait Translator: Send + Sync {
    /// Start translating. Returns `false` if the translation could not be
    /// started, in which case no completion callback follows.
    fn translate(&self, request: TranslationRequest, listener: TranslationListener) -> bool;

    /// Abort the in-flight translation. The translator answers with
    /// `aborted` once it has stopped.
    fn abort(&self);
}

/// Observer registered with the arbiter.
///
/// Every ownership change delivers exactly one of `client_owns_generator`,
/// `generator_busy`, or `generator_idle`. Concurrent changes may be seen out
/// of order, so a client must not trust `generator_idle` without trying to
/// take ownership. Translation progress is delivered
/// to the owner and to clients registered with [`super::NotifyPolicy::Always`].
#[allow(unused_variables)]
pub trait TranslatorClient: Send + Sync {
    /// This client now owns the translator.
    fn client_owns_generator(&self) {}

    /// Another client owns the translator.
    fn generator_busy(&self) {}

    /// Nobody owns the translator.
    fn generator_idle(&self) {}

    fn translation_started(&self) {}

    fn translation_phase_started(&self, phase: TranslationPhase, steps: u32) {}

    fn translation_completed(&self, success: bool) {}

    fn translation_aborted(&self) {}

    fn translation_error_detected(&self, diagnostic: &Diagnostic) {}
}
