//! Document view of a prebuilt model module.
//!
//! A module on disk has no element tree of its own. Every operation handle
//! gets one synthetic element under a single root element, and every
//! identifier gets one element bound to it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tessera_core::{
    Diagnostic, ElementId, IdentifierEntry, IdentifierHandle, Operation, OperationHandle,
    ProgramRoot, Value,
};

use crate::colors;

/// Element at the top of the tree.
pub const ROOT_ELEMENT: u64 = 0;

/// First element id used for identifiers. Operation elements stay below it.
const IDENTIFIER_BASE: u64 = 1 << 40;

/// Element representing an operation handle.
pub fn operation_element(handle: OperationHandle) -> ElementId {
    ElementId::new(u64::from(handle.as_u32()) + 1)
}

/// Operation represented by an element, if it is an operation element.
pub fn element_operation(element: ElementId) -> Option<OperationHandle> {
    let id = element.as_u64();
    if id == ROOT_ELEMENT || id >= IDENTIFIER_BASE {
        return None;
    }
    u32::try_from(id - 1).ok().map(OperationHandle::new)
}

pub fn identifier_element(handle: IdentifierHandle) -> ElementId {
    ElementId::new(IDENTIFIER_BASE + u64::from(handle.as_u32()))
}

fn element_identifier(element: ElementId) -> Option<IdentifierHandle> {
    let id = element.as_u64().checked_sub(IDENTIFIER_BASE)?;
    u32::try_from(id).ok().map(IdentifierHandle::new)
}

/// Display name of an identifier; modules do not export source names.
pub fn identifier_name(handle: IdentifierHandle) -> String {
    format!("${}", handle.as_u32())
}

/// [`ProgramRoot`] over a prebuilt module file.
pub struct ModuleDocument {
    path: PathBuf,
    echo: bool,
    breakpoints: Mutex<BTreeSet<ElementId>>,
    displayed: Mutex<BTreeMap<ElementId, Value>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ModuleDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            echo: false,
            breakpoints: Mutex::new(BTreeSet::new()),
            displayed: Mutex::new(BTreeMap::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Print value updates and diagnostics as they arrive.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Flag or unflag the element of an operation. Returns that element.
    pub fn set_breakpoint(&self, handle: OperationHandle, now_set: bool) -> ElementId {
        let element = operation_element(handle);
        let mut breakpoints = lock(&self.breakpoints);
        if now_set {
            breakpoints.insert(element);
        } else {
            breakpoints.remove(&element);
        }
        element
    }

    /// Operations currently flagged with a breakpoint.
    pub fn breakpoints(&self) -> Vec<OperationHandle> {
        lock(&self.breakpoints)
            .iter()
            .filter_map(|element| element_operation(*element))
            .collect()
    }

    /// Value shown for an identifier, if any.
    #[cfg(test)]
    pub fn displayed(&self, handle: IdentifierHandle) -> Option<Value> {
        lock(&self.displayed).get(&identifier_element(handle)).cloned()
    }

    #[cfg(test)]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.diagnostics).clone()
    }
}

impl ProgramRoot for ModuleDocument {
    fn document_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn contains(&self, element: ElementId) -> bool {
        element.as_u64() == ROOT_ELEMENT
            || element_operation(element).is_some()
            || element_identifier(element).is_some()
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        if element.as_u64() == ROOT_ELEMENT || !self.contains(element) {
            None
        } else {
            Some(ElementId::new(ROOT_ELEMENT))
        }
    }

    fn has_instruction_breakpoint(&self, element: ElementId) -> bool {
        lock(&self.breakpoints).contains(&element)
    }

    fn operation_for_element(&self, element: ElementId) -> Option<Operation> {
        element_operation(element).map(|handle| Operation { handle, element })
    }

    fn operation_for_handle(&self, handle: OperationHandle) -> Option<Operation> {
        Some(Operation {
            handle,
            element: operation_element(handle),
        })
    }

    fn identifier_by_handle(&self, handle: IdentifierHandle) -> Option<IdentifierEntry> {
        Some(IdentifierEntry {
            handle,
            name: identifier_name(handle),
            elements: vec![identifier_element(handle)],
        })
    }

    fn identifier_for_element(&self, element: ElementId) -> Option<IdentifierHandle> {
        element_identifier(element)
    }

    fn set_displayed_value(&self, element: ElementId, value: Option<&Value>) {
        let mut displayed = lock(&self.displayed);
        match value {
            Some(value) => {
                if self.echo {
                    if let Some(handle) = element_identifier(element) {
                        println!(
                            "  {}{}{} = {}",
                            colors::CYAN,
                            identifier_name(handle),
                            colors::RESET,
                            value
                        );
                    }
                }
                displayed.insert(element, value.clone());
            }
            None => {
                displayed.remove(&element);
            }
        }
    }

    fn attach_diagnostic(&self, element: ElementId, diagnostic: Diagnostic) {
        if self.echo {
            let location = match element_operation(element) {
                Some(handle) => format!("operation {}", handle.as_u32()),
                None => element.to_string(),
            };
            eprintln!(
                "{}error{} at {}: {}",
                colors::RED,
                colors::RESET,
                location,
                diagnostic.message
            );
        }
        lock(&self.diagnostics).push(diagnostic);
    }
}
