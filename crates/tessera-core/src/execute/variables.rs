//! Live variable values pushed back into the document.

use std::collections::BTreeSet;

use crate::document::{ElementId, IdentifierHandle, ProgramRoot};
use crate::model::{IdentifierSnapshot, Model};
use crate::value::{CalculatedValue, Value};

/// Keeps document elements in sync with the model's variables.
///
/// Remembers which elements currently show a value so they can be cleared
/// when the model restarts or is torn down.
#[derive(Debug, Default)]
pub struct VariableChangeTracker {
    displayed: BTreeSet<ElementId>,
}

impl VariableChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements currently showing a live value.
    pub fn displayed(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.displayed.iter().copied()
    }

    /// Read every variable from the model and show it on each bound element.
    ///
    /// Called after a pause, abort, or finish. Returns the number of elements updated.
    pub fn update_variables(
        &mut self,
        model: &dyn Model,
        snapshot: &mut IdentifierSnapshot,
        root: &dyn ProgramRoot,
    ) -> usize {
        let handles: Vec<IdentifierHandle> = snapshot.variables().map(|info| info.handle).collect();
        let mut updated = 0;

        for handle in handles {
            let Some(value) = model.value(handle) else {
                snapshot.forget(handle);
                continue;
            };

            if let Some(entry) = root.identifier_by_handle(handle) {
                for element in entry.elements {
                    root.set_displayed_value(element, Some(&value));
                    self.displayed.insert(element);
                    updated += 1;
                }
            }
            snapshot.record(handle, value);
        }

        updated
    }

    /// Clear every value shown since the last start.
    pub fn clear_displayed(&mut self, root: &dyn ProgramRoot) {
        for element in std::mem::take(&mut self.displayed) {
            root.set_displayed_value(element, None);
        }
    }

    /// Invalidate the display of every variable, shown or not.
    ///
    /// Used on final teardown so no element keeps a stale value.
    pub fn invalidate_all(&mut self, root: &dyn ProgramRoot, snapshot: Option<&IdentifierSnapshot>) {
        if let Some(snapshot) = snapshot {
            for info in snapshot.variables() {
                if let Some(entry) = root.identifier_by_handle(info.handle) {
                    self.displayed.extend(entry.elements);
                }
            }
        }
        self.clear_displayed(root);
    }

    /// Write `calculated` into the model by name and fan it out to the document.
    ///
    /// Fails when the loaded model has no variable of that name or rejects the value.
    pub fn update_variable(
        &mut self,
        model: &mut dyn Model,
        snapshot: &mut IdentifierSnapshot,
        root: &dyn ProgramRoot,
        calculated: &CalculatedValue,
    ) -> bool {
        let Some(handle) = snapshot.handle_for_name(&calculated.name) else {
            tracing::debug!("No variable '{}' in the loaded model", calculated.name);
            return false;
        };
        if !snapshot.is_variable(handle) || !model.set_value(handle, &calculated.value) {
            return false;
        }

        snapshot.record(handle, calculated.value.clone());
        if let Some(entry) = root.identifier_by_handle(handle) {
            for element in entry.elements {
                root.set_displayed_value(element, Some(&calculated.value));
                self.displayed.insert(element);
            }
        }

        true
    }

    /// Value last read for the variable bound to `element`.
    pub fn value_for_variable(
        &self,
        snapshot: &IdentifierSnapshot,
        root: &dyn ProgramRoot,
        element: ElementId,
    ) -> Option<Value> {
        let handle = root.identifier_for_element(element)?;
        snapshot.value(handle).cloned()
    }
}
