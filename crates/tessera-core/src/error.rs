//! Error types for tessera-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for tessera-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tessera-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The directory that should receive the compiled module is not writable.
    #[error("directory is not writable: {}", .0.display())]
    DirectoryNotWritable(PathBuf),

    /// Failed to load dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// A required entry point is missing from the loaded module.
    #[error("symbol not found in model module: {0}")]
    MissingSymbol(String),

    /// The module allocator returned no instance.
    #[error("model allocator returned a null instance")]
    ModelAllocation,

    /// No module is currently loaded.
    #[error("no model module is loaded")]
    ModuleNotLoaded,

    /// The client is not registered with the translator arbiter.
    #[error("unknown translator client: {0}")]
    UnknownClient(String),

    /// The client tried to drive the translator without owning it.
    #[error("client {0} does not own the translator")]
    NotOwner(String),

    /// The control thread has exited and no longer accepts requests.
    #[error("control thread is no longer running")]
    ControlThreadGone,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid operation for the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
