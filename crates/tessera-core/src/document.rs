//! Narrow interfaces onto the document layer.
//!
//! The document's element tree is owned elsewhere. Everything the
//! orchestration core needs from it goes through [`ProgramRoot`]: operation
//! and identifier lookups produced by translation, breakpoint flags, and the
//! hooks used to push live values and diagnostics back into elements.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable identifier of one element in a document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u64);

impl ElementId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Handle of one executable operation, assigned by the translator.
///
/// Valid only for the lifetime of the module it was translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationHandle(u32);

impl OperationHandle {
    pub fn new(handle: u32) -> Self {
        Self(handle)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Handle of one identifier binding, assigned by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentifierHandle(u32);

impl IdentifierHandle {
    pub fn new(handle: u32) -> Self {
        Self(handle)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Entry of the operation database: an operation and the element it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub handle: OperationHandle,
    pub element: ElementId,
}

/// Entry of the document's identifier index.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierEntry {
    pub handle: IdentifierHandle,
    pub name: String,
    /// Every element bound to this identifier. Several elements may alias one
    /// identifier.
    pub elements: Vec<ElementId>,
}

/// A message attached to a document element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Element the diagnostic refers to, if it could be located.
    pub element: Option<ElementId>,
    /// Numeric reason code (translator error code or runtime abort reason).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    pub fn new(element: Option<ElementId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            element,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element {
            Some(element) => write!(f, "{} ({}): {}", element, self.code, self.message),
            None => write!(f, "({}): {}", self.code, self.message),
        }
    }
}

/// The top of one document's program tree, as seen by the build/execute core.
///
/// Lookups return `None` where the document layer reports an invalid entry.
pub trait ProgramRoot: Send + Sync {
    /// Path of the document on disk, or `None` if it has never been saved.
    fn document_path(&self) -> Option<PathBuf>;

    /// Whether the element belongs to this root's tree.
    fn contains(&self, element: ElementId) -> bool;

    /// Parent of an element, `None` at the root.
    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// Whether the user flagged this element with an instruction breakpoint.
    fn has_instruction_breakpoint(&self, element: ElementId) -> bool;

    fn operation_for_element(&self, element: ElementId) -> Option<Operation>;

    fn operation_for_handle(&self, handle: OperationHandle) -> Option<Operation>;

    fn identifier_by_handle(&self, handle: IdentifierHandle) -> Option<IdentifierEntry>;

    /// Identifier an element is bound to, if it is a variable reference.
    fn identifier_for_element(&self, element: ElementId) -> Option<IdentifierHandle>;

    /// Show (or clear, with `None`) the live value displayed by an element.
    fn set_displayed_value(&self, element: ElementId, value: Option<&Value>);

    fn attach_diagnostic(&self, element: ElementId, diagnostic: Diagnostic);
}

/// Non-owning reference to a [`ProgramRoot`].
///
/// The build/execute core never keeps a document alive. Every dereference
/// goes through [`RootRef::upgrade`], which fails once the document is gone.
#[derive(Clone, Default)]
pub struct RootRef {
    inner: Option<Weak<dyn ProgramRoot>>,
}

impl RootRef {
    /// A reference that points at nothing.
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn new(root: &Arc<dyn ProgramRoot>) -> Self {
        Self {
            inner: Some(Arc::downgrade(root)),
        }
    }

    /// Get the root if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<dyn ProgramRoot>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_none(&self) -> bool {
        self.inner.is_none()
    }

    /// Whether the referenced document has been destroyed.
    pub fn is_dead(&self) -> bool {
        self.inner.as_ref().is_some_and(|weak| weak.strong_count() == 0)
    }

    /// Identity comparison; metadata of the trait object is ignored.
    pub fn ptr_eq(&self, other: &RootRef) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether this reference points at `root`.
    pub fn refers_to(&self, root: &Arc<dyn ProgramRoot>) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|weak| std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(root)))
    }
}

impl fmt::Debug for RootRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("RootRef(none)"),
            Some(weak) => write!(f, "RootRef({:p}, alive: {})", weak.as_ptr(), weak.strong_count() > 0),
        }
    }
}
