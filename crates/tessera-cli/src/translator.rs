//! Translator standing in for the native compiler.
//!
//! The module given on the command line is already compiled. Translating it
//! copies the file to the requested output path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tessera_core::{
    Diagnostic, TranslationListener, TranslationPhase, TranslationRequest, Translator,
};

/// Reason code reported when the module cannot be copied.
const COPY_FAILED: i32 = 1;

/// [`Translator`] that copies a prebuilt module into place.
pub struct CopyTranslator {
    source: PathBuf,
    cancelled: Arc<AtomicBool>,
}

impl CopyTranslator {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Translator for CopyTranslator {
    fn translate(&self, request: TranslationRequest, listener: TranslationListener) -> bool {
        if !self.source.is_file() {
            tracing::error!("Module {} does not exist", self.source.display());
            return false;
        }

        tracing::debug!(
            "Copying {} to {} ({:?})",
            self.source.display(),
            request.output_path.display(),
            request.export_mode
        );

        self.cancelled.store(false, Ordering::SeqCst);
        let source = self.source.clone();
        let cancelled = Arc::clone(&self.cancelled);

        let spawned = thread::Builder::new()
            .name("tessera-translate".to_string())
            .spawn(move || copy_module(&source, &request.output_path, &listener, &cancelled));

        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to start translation: {}", e);
                false
            }
        }
    }

    fn abort(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn copy_module(source: &Path, output: &Path, listener: &TranslationListener, cancelled: &AtomicBool) {
    listener.started();

    for phase in [
        TranslationPhase::Translating,
        TranslationPhase::Compiling,
        TranslationPhase::Linking,
    ] {
        if cancelled.load(Ordering::SeqCst) {
            listener.aborted();
            return;
        }
        listener.phase_started(phase, 1);
    }

    match fs::copy(source, output) {
        Ok(_) => listener.completed(true),
        Err(e) => {
            let message = format!("cannot write {}: {}", output.display(), e);
            listener.error_detected(&Diagnostic::new(None, COPY_FAILED, message));
            listener.completed(false);
        }
    }
}
