//! Residual system of a coupled group.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{ComponentId, Graph, VarId};

/// The unknowns of a coupled group and their residual equations.
///
/// Unknowns are the outputs of every member, member by member in
/// schedule order. Explicit members contribute `y - f(x)`, implicit members
/// their own residuals, so row `i` of the residual belongs to unknown `i`.
#[derive(Debug, Clone)]
pub struct GroupSystem {
    members: Vec<ComponentId>,
    unknowns: Vec<VarId>,
    offsets: HashMap<VarId, usize>,
    size: usize,
}

impl GroupSystem {
    pub fn new(graph: &Graph, members: &[ComponentId]) -> Self {
        let mut unknowns = Vec::new();
        let mut offsets = HashMap::new();
        let mut size = 0;
        for &member in members {
            for &var in &graph.component(member).outputs {
                unknowns.push(var);
                offsets.insert(var, size);
                size += graph.value(var).len();
            }
        }
        Self {
            members: members.to_vec(),
            unknowns,
            offsets,
            size,
        }
    }

    pub fn members(&self) -> &[ComponentId] {
        &self.members
    }

    /// Output variables solved for, in row order.
    pub fn unknowns(&self) -> &[VarId] {
        &self.unknowns
    }

    /// First row of an unknown, `None` if the variable is not one.
    pub fn offset(&self, var: VarId) -> Option<usize> {
        self.offsets.get(&var).copied()
    }

    /// Total number of scalar unknowns.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current values of all unknowns as one vector.
    pub fn gather(&self, graph: &Graph) -> Vec<f64> {
        let mut u = Vec::with_capacity(self.size);
        for &var in &self.unknowns {
            u.extend_from_slice(graph.value(var));
        }
        u
    }

    /// Write a vector of unknowns back into the graph.
    pub fn scatter(&self, graph: &mut Graph, u: &[f64]) {
        for &var in &self.unknowns {
            let start = self.offsets[&var];
            let value = graph.value_mut(var);
            let end = start + value.len();
            value.copy_from_slice(&u[start..end]);
        }
    }

    /// Residual vector at the current state of the graph.
    pub fn residual(&self, graph: &mut Graph) -> Result<Vec<f64>> {
        let mut r = Vec::with_capacity(self.size);
        for &member in &self.members {
            for block in graph.residuals_of(member)? {
                r.extend(block);
            }
        }
        Ok(r)
    }
}
