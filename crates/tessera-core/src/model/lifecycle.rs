//! Compiled module lifecycle: output path, load, instantiate, teardown.
//!
//! At most one module is loaded at a time. A module is loaded if and only if
//! a model instance exists; both are torn down together by
//! [`ModuleLifecycle::expunge_loaded_model`].

use std::ffi::c_void;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::paths;

use super::ffi::{ALLOCATOR_SYMBOL, AllocatorFn, DEALLOCATOR_SYMBOL, DeallocatorFn, ModelBox};
use super::loader::ModuleLoader;
use super::snapshot::IdentifierSnapshot;
use super::types::Model;

/// A model created by a module's allocator, paired with its identifier
/// snapshot. Dropping it hands the model back to the module's deallocator.
pub struct ModelInstance {
    model: NonNull<ModelBox>,
    deallocate: DeallocatorFn,
    snapshot: IdentifierSnapshot,
}

// Safety: `Model: Send`, and the instance is only touched from the control
// thread that owns the lifecycle.
unsafe impl Send for ModelInstance {}

impl ModelInstance {
    pub fn model(&self) -> &dyn Model {
        // Safety: the pointer is valid until `drop`.
        let boxed: &ModelBox = unsafe { self.model.as_ref() };
        &**boxed
    }

    pub fn model_mut(&mut self) -> &mut dyn Model {
        // Safety: the pointer is valid until `drop`, and `&mut self` is unique.
        let boxed: &mut ModelBox = unsafe { self.model.as_mut() };
        &mut **boxed
    }

    pub fn snapshot(&self) -> &IdentifierSnapshot {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut IdentifierSnapshot {
        &mut self.snapshot
    }

    /// Borrow the model and its snapshot at the same time.
    pub fn parts_mut(&mut self) -> (&mut dyn Model, &mut IdentifierSnapshot) {
        // Safety: as for `model_mut`; the snapshot is a separate field.
        let boxed: &mut ModelBox = unsafe { self.model.as_mut() };
        (&mut **boxed, &mut self.snapshot)
    }
}

impl Drop for ModelInstance {
    fn drop(&mut self) {
        // Safety: the pointer came from the matching allocator and is not
        // used after this point.
        unsafe { (self.deallocate)(self.model.as_ptr()) };
    }
}

/// Owns the compiled module file, the loaded module and the model instance.
pub struct ModuleLifecycle {
    loader: Box<dyn ModuleLoader>,
    instance: Option<ModelInstance>,
    /// Module file on disk, from the moment its path is handed to the
    /// translator until it is deleted.
    module_path: Option<PathBuf>,
}

impl ModuleLifecycle {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            instance: None,
            module_path: None,
        }
    }

    /// Choose and validate the output path for a new build.
    ///
    /// Any earlier module file still on disk is deleted first.
    ///
    /// # Errors
    /// Returns [`Error::DirectoryNotWritable`] if the output directory does
    /// not accept new files.
    pub fn prepare_build(&mut self, document_path: Option<&Path>, config: &EngineConfig) -> Result<PathBuf> {
        assert!(
            self.instance.is_none(),
            "a new build was prepared while a model module is still loaded"
        );
        self.delete_model_file();

        let path = paths::module_output_path(document_path, config);
        let dir = path.parent().unwrap_or(Path::new("."));
        paths::ensure_writable_dir(dir)?;

        tracing::debug!("Model module will be written to {}", path.display());
        self.module_path = Some(path.clone());
        Ok(path)
    }

    /// Load the freshly built module and instantiate its model.
    ///
    /// Any failure unloads the module again; nothing is left half-loaded.
    pub fn load_model(&mut self) -> Result<()> {
        assert!(self.instance.is_none(), "load_model called while a model is loaded");

        let path = self
            .module_path
            .clone()
            .ok_or_else(|| Error::InvalidOperation("no module has been built".to_string()))?;

        self.loader.load(&path)?;

        match self.instantiate() {
            Ok(instance) => {
                tracing::info!(
                    "Model instantiated from {} ({} identifiers)",
                    path.display(),
                    instance.snapshot().len()
                );
                self.instance = Some(instance);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to instantiate model from {}: {}", path.display(), e);
                if let Err(unload) = self.loader.unload() {
                    tracing::warn!("Failed to unload rejected module: {}", unload);
                }
                Err(e)
            }
        }
    }

    fn instantiate(&self) -> Result<ModelInstance> {
        let allocate = self.resolve_entry(ALLOCATOR_SYMBOL)?;
        let deallocate = self.resolve_entry(DEALLOCATOR_SYMBOL)?;

        // Safety: both symbols are the module's entry points with the
        // documented signatures.
        let (allocate, deallocate) = unsafe {
            (
                std::mem::transmute::<*const c_void, AllocatorFn>(allocate),
                std::mem::transmute::<*const c_void, DeallocatorFn>(deallocate),
            )
        };

        // Safety: see above.
        let raw = unsafe { allocate() };
        let model = NonNull::new(raw).ok_or(Error::ModelAllocation)?;

        // Safety: the allocator returned a valid, uniquely owned instance.
        let boxed: &ModelBox = unsafe { model.as_ref() };
        let snapshot = IdentifierSnapshot::capture(&**boxed);

        Ok(ModelInstance {
            model,
            deallocate,
            snapshot,
        })
    }

    fn resolve_entry(&self, symbol: &str) -> Result<*const c_void> {
        let address = self.loader.resolve(symbol)?;
        if address.is_null() {
            return Err(Error::MissingSymbol(symbol.to_string()));
        }
        Ok(address)
    }

    /// Destroy the model instance, discard its snapshot and unload the module.
    ///
    /// # Panics
    /// Panics if no module is loaded.
    pub fn expunge_loaded_model(&mut self) {
        let instance = self.instance.take();
        assert!(instance.is_some(), "expunge_loaded_model called with no model loaded");

        // Deallocate before the module's code goes away
        drop(instance);

        if let Err(e) = self.loader.unload() {
            tracing::warn!("Failed to unload model module: {}", e);
        }
        tracing::debug!("Model expunged");
    }

    /// Remove the module file from disk. A missing file is not an error.
    pub fn delete_model_file(&mut self) {
        let Some(path) = self.module_path.take() else {
            return;
        };

        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Deleted model module {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete model module {}: {}", path.display(), e),
        }
    }

    /// Whether a module is loaded (equivalently, a model instance exists).
    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }

    /// Path of the module file that has not been deleted yet.
    pub fn module_path(&self) -> Option<&Path> {
        self.module_path.as_deref()
    }

    pub fn instance(&self) -> Option<&ModelInstance> {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut ModelInstance> {
        self.instance.as_mut()
    }

    pub fn model_mut(&mut self) -> Option<&mut dyn Model> {
        self.instance.as_mut().map(ModelInstance::model_mut)
    }
}

impl Drop for ModuleLifecycle {
    fn drop(&mut self) {
        if self.instance.is_some() {
            self.expunge_loaded_model();
        }
        self.delete_model_file();
    }
}
