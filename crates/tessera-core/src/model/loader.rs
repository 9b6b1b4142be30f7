//! Loading compiled model modules.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::error::{Error, Result};

/// Loads one dynamic module at a time and resolves symbols from it.
pub trait ModuleLoader: Send {
    /// Load the module at `path`. Fails if a module is already loaded.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Address of an exported symbol of the loaded module.
    fn resolve(&self, symbol: &str) -> Result<*const c_void>;

    /// Unload the module. Unloading with nothing loaded is a no-op.
    fn unload(&mut self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    fn is_not_loaded(&self) -> bool {
        !self.is_loaded()
    }
}

/// [`ModuleLoader`] backed by the platform dynamic linker.
#[derive(Default)]
pub struct DylibLoader {
    library: Option<Library>,
    path: Option<PathBuf>,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the loaded module.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&mut self, path: &Path) -> Result<()> {
        if self.library.is_some() {
            return Err(Error::InvalidOperation(format!(
                "cannot load {} while {} is loaded",
                path.display(),
                self.path.as_deref().unwrap_or(Path::new("?")).display()
            )));
        }

        // Safety: loading runs the module's initializers; model modules are
        // produced by our own translator.
        let library = unsafe { Library::new(path) }?;
        tracing::info!("Loaded model module {}", path.display());

        self.library = Some(library);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn resolve(&self, symbol: &str) -> Result<*const c_void> {
        let library = self.library.as_ref().ok_or(Error::ModuleNotLoaded)?;

        // Safety: the address is only reinterpreted by the caller, which
        // knows the symbol's real signature.
        let resolved: Symbol<unsafe extern "C" fn()> = unsafe { library.get(symbol.as_bytes()) }
            .map_err(|e| {
                tracing::debug!("Failed to resolve {}: {}", symbol, e);
                Error::MissingSymbol(symbol.to_string())
            })?;

        Ok(*resolved as *const c_void)
    }

    fn unload(&mut self) -> Result<()> {
        self.path = None;
        match self.library.take() {
            Some(library) => {
                library.close()?;
                tracing::debug!("Model module unloaded");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn is_loaded(&self) -> bool {
        self.library.is_some()
    }
}
