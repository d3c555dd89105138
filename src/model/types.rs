//! Core types for model representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a component in the graph.
/// Assigned in insertion order, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Global handle of a variable in the [`VariableRegistry`](super::VariableRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Handle of an input, local to the component that declared it.
///
/// Returned by [`Declarations::add_input`](crate::components::Declarations::add_input)
/// and used to index [`Inputs`](crate::components::Inputs) at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputHandle(pub(crate) usize);

impl InputHandle {
    /// Position of the input in declaration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle of an output, local to the component that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputHandle(pub(crate) usize);

impl OutputHandle {
    /// Position of the output in declaration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Whether a variable is read or written by its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// How a component produces its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Outputs are a direct function of inputs.
    Explicit,
    /// Outputs are the root of a residual equation.
    Implicit,
}

/// Split a variable path `"component.variable"` at the first dot.
///
/// Component names never contain dots, variable names may contain anything
/// else (e.g. `"n1.I_in:0"`).
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let (component, variable) = path.split_once('.')?;
    if component.is_empty() || variable.is_empty() {
        None
    } else {
        Some((component, variable))
    }
}

/// Join a component name and a variable name into a path.
pub fn join_path(component: &str, variable: &str) -> String {
    format!("{}.{}", component, variable)
}
