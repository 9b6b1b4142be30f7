//! FFI contract between the engine and a compiled model module.
//!
//! A model module exports two C-ABI entry points:
//!
//! - `tessera_allocate_model() -> *mut ModelBox` creates the program instance
//! - `tessera_deallocate_model(*mut ModelBox)` destroys it
//!
//! [`ModelBox`] is a `Box<dyn Model>` behind a thin pointer, so module and
//! engine must be built by the same compiler. Use [`crate::export_model!`] to
//! generate both functions.

use super::types::Model;

/// Symbol name of the allocator entry point.
pub const ALLOCATOR_SYMBOL: &str = "tessera_allocate_model";

/// Symbol name of the deallocator entry point.
pub const DEALLOCATOR_SYMBOL: &str = "tessera_deallocate_model";

/// Heap representation of a model instance crossing the module boundary.
pub type ModelBox = Box<dyn Model>;

/// Allocator entry point. Returns null if the model could not be created.
pub type AllocatorFn = unsafe extern "C" fn() -> *mut ModelBox;

/// Deallocator entry point. Accepts a pointer produced by the allocator.
pub type DeallocatorFn = unsafe extern "C" fn(*mut ModelBox);

/// Export the allocator/deallocator pair for a model type.
///
/// The expression is evaluated on every allocation. A panic while
/// constructing the model makes the allocator return null.
///
/// ```ignore
/// struct Simulation { /* ... */ }
/// impl tessera_core::Model for Simulation { /* ... */ }
///
/// tessera_core::export_model!(Simulation::new());
/// ```
#[macro_export]
macro_rules! export_model {
    ($constructor:expr) => {
        /// Model allocator entry point.
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn tessera_allocate_model() -> *mut $crate::model::ModelBox {
            let created = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(
                || -> $crate::model::ModelBox { ::std::boxed::Box::new($constructor) },
            ));
            match created {
                Ok(model) => ::std::boxed::Box::into_raw(::std::boxed::Box::new(model)),
                Err(_) => ::std::ptr::null_mut(),
            }
        }

        /// Model deallocator entry point.
        ///
        /// # Safety
        /// `model` must come from `tessera_allocate_model` of this module and
        /// must not be used afterwards.
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn tessera_deallocate_model(model: *mut $crate::model::ModelBox) {
            if !model.is_null() {
                drop(unsafe { ::std::boxed::Box::from_raw(model) });
            }
        }
    };
}
