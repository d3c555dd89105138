//! Variable registry: the value store shared by every component.

use std::collections::HashMap;

use super::types::{join_path, ComponentId, Direction, VarId};
use crate::error::{MdoError, Result};

/// A declared input or output slot.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Variable name, unique within its component
    pub name: String,
    /// Full `"component.variable"` path (for diagnostics and wiring)
    pub path: String,
    /// Component that declared the variable
    pub owner: ComponentId,
    /// Input or output
    pub direction: Direction,
    /// Physical unit, `None` for dimensionless / unspecified
    pub unit: Option<String>,
    /// Value assigned at declaration time
    pub default: Vec<f64>,
    /// Current value (scalars are length 1)
    pub value: Vec<f64>,
}

impl Variable {
    /// Number of scalar entries.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Check whether the variable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Registry of all variables in a graph.
///
/// Variables are identified by `(component, name)`; the runtime access path is
/// the [`VarId`] returned at declaration time.
#[derive(Debug, Default, Clone)]
pub struct VariableRegistry {
    vars: Vec<Variable>,
    index: HashMap<(ComponentId, String), VarId>,
}

impl VariableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable owned by `owner`.
    ///
    /// Inputs and outputs share one namespace per component.
    pub fn declare(
        &mut self,
        owner: ComponentId,
        owner_name: &str,
        name: &str,
        unit: Option<String>,
        default: Vec<f64>,
        direction: Direction,
    ) -> Result<VarId> {
        let key = (owner, name.to_string());
        if self.index.contains_key(&key) {
            return Err(MdoError::DuplicateName {
                component: owner_name.to_string(),
                name: name.to_string(),
            });
        }

        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            name: name.to_string(),
            path: join_path(owner_name, name),
            owner,
            direction,
            unit,
            value: default.clone(),
            default,
        });
        self.index.insert(key, id);
        Ok(id)
    }

    /// Get the current value of a variable.
    pub fn get(&self, id: VarId) -> &[f64] {
        &self.vars[id.0].value
    }

    /// Overwrite the value of a variable. The length must match.
    pub fn set(&mut self, id: VarId, value: &[f64]) -> Result<()> {
        let var = &mut self.vars[id.0];
        if var.value.len() != value.len() {
            return Err(MdoError::ShapeMismatch {
                path: var.path.clone(),
                expected: var.value.len(),
                actual: value.len(),
            });
        }
        var.value.copy_from_slice(value);
        Ok(())
    }

    /// Mutable access to a value, for in-place transfers.
    pub(crate) fn value_mut(&mut self, id: VarId) -> &mut [f64] {
        &mut self.vars[id.0].value
    }

    /// Get the full variable record.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    /// Find a variable by owner and name.
    pub fn find(&self, owner: ComponentId, name: &str) -> Option<VarId> {
        self.index.get(&(owner, name.to_string())).copied()
    }

    /// Restore every variable to its declared default.
    pub fn reset_to_defaults(&mut self) {
        for var in &mut self.vars {
            var.value.clone_from(&var.default);
        }
    }

    /// Number of declared variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check whether no variables are declared.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over `(VarId, &Variable)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars.iter().enumerate().map(|(i, v)| (VarId(i), v))
    }
}
