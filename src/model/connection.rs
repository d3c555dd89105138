//! Connections between an output and an input.

use serde::{Deserialize, Serialize};

use super::registry::Variable;
use super::types::VarId;
use crate::error::{MdoError, Result};

/// Optional routing for a connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Source entries routed to the target, one per target entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_map: Option<Vec<usize>>,
    /// Explicit conversion factor applied to every routed entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl ConnectOptions {
    /// Route the given source indices to the target.
    pub fn with_index_map(mut self, index_map: Vec<usize>) -> Self {
        self.index_map = Some(index_map);
        self
    }

    /// Multiply routed values by a conversion factor.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// A directed edge from an output variable to an input variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: VarId,
    pub target: VarId,
    pub index_map: Option<Vec<usize>>,
    pub scale: Option<f64>,
}

impl Connection {
    /// Conversion factor (1.0 when none was given).
    pub fn factor(&self) -> f64 {
        self.scale.unwrap_or(1.0)
    }

    /// Source index feeding target entry `k`.
    pub fn source_index(&self, k: usize) -> usize {
        match &self.index_map {
            Some(map) => map[k],
            None => k,
        }
    }

    /// Copy (and convert) the source value into the target.
    pub fn apply(&self, source: &[f64], target: &mut [f64]) {
        let factor = self.factor();
        for (k, t) in target.iter_mut().enumerate() {
            *t = factor * source[self.source_index(k)];
        }
    }

    /// Get the options this connection was created with.
    pub fn options(&self) -> ConnectOptions {
        ConnectOptions {
            index_map: self.index_map.clone(),
            scale: self.scale,
        }
    }
}

/// Check that two units may be connected.
///
/// A missing unit on either side is compatible with anything; otherwise the
/// unit strings must match unless an explicit conversion factor is supplied.
pub fn check_units(source: &Variable, target: &Variable, scale: Option<f64>) -> Result<()> {
    if scale.is_some() {
        return Ok(());
    }
    match (&source.unit, &target.unit) {
        (Some(su), Some(tu)) if su != tu => Err(MdoError::UnitMismatch {
            source_path: source.path.clone(),
            source_unit: su.clone(),
            target: target.path.clone(),
            target_unit: tu.clone(),
        }),
        _ => Ok(()),
    }
}

/// Check index map bounds and resulting shape against the endpoints.
pub fn check_shapes(source: &Variable, target: &Variable, index_map: Option<&[usize]>) -> Result<()> {
    let routed_len = match index_map {
        Some(map) => {
            if let Some(&index) = map.iter().find(|&&i| i >= source.len()) {
                return Err(MdoError::IndexOutOfRange {
                    path: source.path.clone(),
                    index,
                    len: source.len(),
                });
            }
            map.len()
        }
        None => source.len(),
    };

    if routed_len != target.len() {
        return Err(MdoError::ShapeMismatch {
            path: target.path.clone(),
            expected: target.len(),
            actual: routed_len,
        });
    }
    Ok(())
}
