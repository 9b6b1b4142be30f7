//! Compiled model modules and the running program instance.
//!
//! # Architecture
//!
//! ```text
//! ModuleLifecycle
//!     │
//!     ├── ModuleLoader (DylibLoader via libloading)
//!     │       └── resolve tessera_allocate_model / tessera_deallocate_model
//!     │
//!     └── ModelInstance (Box<dyn Model> from the allocator)
//!             ├── IdentifierSnapshot
//!             └── ModelStatusSink ──► control thread
//! ```
//!
//! # Module Structure
//!
//! - `ffi` - Entry-point symbol names, function types and `export_model!`
//! - `lifecycle` - Output path, load, instantiate, teardown
//! - `loader` - `ModuleLoader` trait and the libloading implementation
//! - `snapshot` - Identifier table and last-read variable values
//! - `status` - Asynchronous status reports from the model
//! - `types` - The `Model` execution API

mod ffi;
mod lifecycle;
mod loader;
mod snapshot;
mod status;
mod types;

pub use ffi::{ALLOCATOR_SYMBOL, AllocatorFn, DEALLOCATOR_SYMBOL, DeallocatorFn, ModelBox};
pub use lifecycle::{ModelInstance, ModuleLifecycle};
pub use loader::{DylibLoader, ModuleLoader};
pub use snapshot::IdentifierSnapshot;
pub use status::{ModelEvent, ModelStatusSink};
pub use types::{AbortReason, IdentifierInfo, Model, RngType, StartOptions};
