//! Test doubles shared by unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::document::{
    Diagnostic, ElementId, IdentifierEntry, IdentifierHandle, Operation, OperationHandle, ProgramRoot,
};
use crate::model::{IdentifierInfo, Model, ModelStatusSink, StartOptions};
use crate::value::Value;

pub fn e(id: u64) -> ElementId {
    ElementId::new(id)
}

pub fn op(handle: u32) -> OperationHandle {
    OperationHandle::new(handle)
}

pub fn ident(handle: u32) -> IdentifierHandle {
    IdentifierHandle::new(handle)
}

/// Document root backed by plain maps.
#[derive(Default)]
pub struct MapRoot {
    pub path: Option<PathBuf>,
    elements: HashSet<ElementId>,
    parents: HashMap<ElementId, ElementId>,
    operations: Vec<Operation>,
    identifiers: Vec<IdentifierEntry>,
    breakpoints: Mutex<HashSet<ElementId>>,
    displayed: Mutex<HashMap<ElementId, Option<Value>>>,
    diagnostics: Mutex<Vec<(ElementId, Diagnostic)>>,
}

impl MapRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, id: u64, parent: Option<u64>) -> Self {
        self.elements.insert(e(id));
        if let Some(parent) = parent {
            self.parents.insert(e(id), e(parent));
        }
        self
    }

    pub fn operation(mut self, handle: u32, element: u64) -> Self {
        self.elements.insert(e(element));
        self.operations.push(Operation {
            handle: op(handle),
            element: e(element),
        });
        self
    }

    pub fn identifier(mut self, handle: u32, name: &str, elements: &[u64]) -> Self {
        for &element in elements {
            self.elements.insert(e(element));
        }
        self.identifiers.push(IdentifierEntry {
            handle: ident(handle),
            name: name.to_string(),
            elements: elements.iter().copied().map(e).collect(),
        });
        self
    }

    pub fn set_breakpoint(&self, element: u64, now_set: bool) {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        if now_set {
            breakpoints.insert(e(element));
        } else {
            breakpoints.remove(&e(element));
        }
    }

    /// `None` if never touched, `Some(None)` if cleared.
    pub fn displayed(&self, element: u64) -> Option<Option<Value>> {
        self.displayed.lock().unwrap().get(&e(element)).cloned()
    }

    pub fn diagnostics(&self) -> Vec<(ElementId, Diagnostic)> {
        self.diagnostics.lock().unwrap().clone()
    }
}

impl ProgramRoot for MapRoot {
    fn document_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.parents.get(&element).copied()
    }

    fn has_instruction_breakpoint(&self, element: ElementId) -> bool {
        self.breakpoints.lock().unwrap().contains(&element)
    }

    fn operation_for_element(&self, element: ElementId) -> Option<Operation> {
        self.operations.iter().find(|o| o.element == element).copied()
    }

    fn operation_for_handle(&self, handle: OperationHandle) -> Option<Operation> {
        self.operations.iter().find(|o| o.handle == handle).copied()
    }

    fn identifier_by_handle(&self, handle: IdentifierHandle) -> Option<IdentifierEntry> {
        self.identifiers.iter().find(|i| i.handle == handle).cloned()
    }

    fn identifier_for_element(&self, element: ElementId) -> Option<IdentifierHandle> {
        self.identifiers
            .iter()
            .find(|i| i.elements.contains(&element))
            .map(|i| i.handle)
    }

    fn set_displayed_value(&self, element: ElementId, value: Option<&Value>) {
        self.displayed.lock().unwrap().insert(element, value.cloned());
    }

    fn attach_diagnostic(&self, element: ElementId, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push((element, diagnostic));
    }
}

/// Model that records every call.
#[derive(Default)]
pub struct RecordingModel {
    pub calls: Vec<String>,
    pub breakpoints: BTreeSet<OperationHandle>,
    pub run_to: Option<OperationHandle>,
    pub operations: u32,
    pub threads: u32,
    pub identifiers: Vec<IdentifierInfo>,
    pub values: HashMap<IdentifierHandle, Value>,
    pub last_start: Option<StartOptions>,
    pub paused: bool,
}

impl RecordingModel {
    pub fn with_operations(operations: u32) -> Self {
        Self {
            operations,
            threads: 1,
            ..Self::default()
        }
    }

    pub fn variable(mut self, handle: u32, name: &str, value: Option<Value>) -> Self {
        self.identifiers.push(IdentifierInfo {
            handle: ident(handle),
            name: name.to_string(),
            is_variable: true,
        });
        if let Some(value) = value {
            self.values.insert(ident(handle), value);
        }
        self
    }

    pub fn function(mut self, handle: u32, name: &str) -> Self {
        self.identifiers.push(IdentifierInfo {
            handle: ident(handle),
            name: name.to_string(),
            is_variable: false,
        });
        self
    }
}

impl Model for RecordingModel {
    fn start(&mut self, options: StartOptions, _status: ModelStatusSink) {
        self.calls.push("start".to_string());
        self.paused = options.start_paused;
        self.last_start = Some(options);
    }

    fn pause(&mut self) {
        self.calls.push("pause".to_string());
    }

    fn resume(&mut self) -> bool {
        self.calls.push("resume".to_string());
        std::mem::take(&mut self.paused)
    }

    fn single_step(&mut self) -> bool {
        self.calls.push("single_step".to_string());
        self.paused
    }

    fn abort(&mut self) {
        self.calls.push("abort".to_string());
    }

    fn set_break_at_operation(&mut self, handle: OperationHandle, now_set: bool) -> bool {
        if handle.as_u32() >= self.operations {
            return false;
        }
        if now_set {
            self.breakpoints.insert(handle);
        } else {
            self.breakpoints.remove(&handle);
        }
        true
    }

    fn set_run_to_location(&mut self, handle: Option<OperationHandle>) -> bool {
        self.run_to = handle;
        true
    }

    fn number_operation_handles(&self) -> u32 {
        self.operations
    }

    fn number_threads(&self) -> u32 {
        self.threads
    }

    fn identifiers(&self) -> Vec<IdentifierInfo> {
        self.identifiers.clone()
    }

    fn value(&self, handle: IdentifierHandle) -> Option<Value> {
        self.values.get(&handle).cloned()
    }

    fn set_value(&mut self, handle: IdentifierHandle, value: &Value) -> bool {
        if !self.identifiers.iter().any(|i| i.handle == handle && i.is_variable) {
            return false;
        }
        self.values.insert(handle, value.clone());
        true
    }
}
