//! Identifier-value snapshot of a model instance.

use std::collections::HashMap;

use crate::document::IdentifierHandle;
use crate::value::Value;

use super::types::{IdentifierInfo, Model};

/// Identifiers exported by a model and the values last read from it.
///
/// Created together with the model instance and discarded with it.
#[derive(Debug, Default)]
pub struct IdentifierSnapshot {
    identifiers: Vec<IdentifierInfo>,
    by_name: HashMap<String, IdentifierHandle>,
    values: HashMap<IdentifierHandle, Value>,
}

impl IdentifierSnapshot {
    /// Read the identifier table of a freshly created model.
    pub fn capture(model: &dyn Model) -> Self {
        let identifiers = model.identifiers();
        let by_name = identifiers
            .iter()
            .map(|info| (info.name.clone(), info.handle))
            .collect();

        Self {
            identifiers,
            by_name,
            values: HashMap::new(),
        }
    }

    /// Handle of a named identifier in this model.
    pub fn handle_for_name(&self, name: &str) -> Option<IdentifierHandle> {
        self.by_name.get(name).copied()
    }

    /// Identifiers that are variables.
    pub fn variables(&self) -> impl Iterator<Item = &IdentifierInfo> {
        self.identifiers.iter().filter(|info| info.is_variable)
    }

    pub fn is_variable(&self, handle: IdentifierHandle) -> bool {
        self.variables().any(|info| info.handle == handle)
    }

    /// Value last recorded for a variable.
    pub fn value(&self, handle: IdentifierHandle) -> Option<&Value> {
        self.values.get(&handle)
    }

    pub fn record(&mut self, handle: IdentifierHandle, value: Value) {
        self.values.insert(handle, value);
    }

    pub fn forget(&mut self, handle: IdentifierHandle) {
        self.values.remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}
