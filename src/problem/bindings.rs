//! Design variable, objective and constraint bindings.

use serde::{Deserialize, Serialize};

use crate::error::{MdoError, Result};
use crate::model::VarId;

/// Optimization direction of the objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// Feasible set of a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintBounds {
    /// `lower <= value <= upper`; at least one side is set
    Range {
        lower: Option<f64>,
        upper: Option<f64>,
    },
    /// `value == target`
    Equals(f64),
}

impl ConstraintBounds {
    /// Upper bound only.
    pub fn upper(upper: f64) -> Self {
        ConstraintBounds::Range {
            lower: None,
            upper: Some(upper),
        }
    }

    /// Lower bound only.
    pub fn lower(lower: f64) -> Self {
        ConstraintBounds::Range {
            lower: Some(lower),
            upper: None,
        }
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        ConstraintBounds::Range {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn equals(target: f64) -> Self {
        ConstraintBounds::Equals(target)
    }

    /// Build bounds from the optional `lower` / `upper` / `equals` triple of a
    /// model description. `equals` excludes the other two.
    pub fn from_parts(
        path: &str,
        lower: Option<f64>,
        upper: Option<f64>,
        equals: Option<f64>,
    ) -> Result<Self> {
        let bounds = match (lower, upper, equals) {
            (None, None, Some(target)) => ConstraintBounds::Equals(target),
            (_, _, Some(_)) => {
                return Err(MdoError::malformed_bounds(
                    path,
                    "'equals' cannot be combined with 'lower' or 'upper'",
                ))
            }
            (lower, upper, None) => ConstraintBounds::Range { lower, upper },
        };
        bounds.validate(path)?;
        Ok(bounds)
    }

    /// Split back into `(lower, upper, equals)`.
    pub fn parts(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        match *self {
            ConstraintBounds::Range { lower, upper } => (lower, upper, None),
            ConstraintBounds::Equals(target) => (None, None, Some(target)),
        }
    }

    pub fn validate(&self, path: &str) -> Result<()> {
        match *self {
            ConstraintBounds::Range { lower: None, upper: None } => Err(MdoError::malformed_bounds(
                path,
                "a constraint needs 'lower', 'upper' or 'equals'",
            )),
            ConstraintBounds::Range { lower, upper } => {
                if lower.is_some_and(f64::is_nan) || upper.is_some_and(f64::is_nan) {
                    return Err(MdoError::malformed_bounds(path, "bounds must not be NaN"));
                }
                if let (Some(lo), Some(hi)) = (lower, upper) {
                    if lo > hi {
                        return Err(MdoError::malformed_bounds(
                            path,
                            format!("lower bound {} exceeds upper bound {}", lo, hi),
                        ));
                    }
                }
                Ok(())
            }
            ConstraintBounds::Equals(target) if !target.is_finite() => {
                Err(MdoError::malformed_bounds(path, "'equals' must be finite"))
            }
            ConstraintBounds::Equals(_) => Ok(()),
        }
    }

    /// Distance of `value` from the feasible set (zero when feasible).
    pub fn violation(&self, value: f64) -> f64 {
        match *self {
            ConstraintBounds::Range { lower, upper } => {
                let below = lower.map_or(0.0, |lo| (lo - value).max(0.0));
                let above = upper.map_or(0.0, |hi| (value - hi).max(0.0));
                below + above
            }
            ConstraintBounds::Equals(target) => (value - target).abs(),
        }
    }

    pub fn is_satisfied(&self, value: f64, tol: f64) -> bool {
        self.violation(value) <= tol
    }
}

/// Check a selection of entries against the length of the bound variable.
pub(crate) fn check_indices(path: &str, indices: &[usize], len: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(MdoError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        }),
        None => Ok(()),
    }
}

fn pick(value: &[f64], indices: Option<&[usize]>) -> Vec<f64> {
    match indices {
        Some(indices) => indices.iter().map(|&i| value[i]).collect(),
        None => value.to_vec(),
    }
}

/// A design variable: an independent quantity the driver may change.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignVar {
    pub path: String,
    pub var: VarId,
    /// Bounds applied to every entry
    pub lower: f64,
    pub upper: f64,
    /// Entries exposed to the driver; `None` exposes all of them
    pub indices: Option<Vec<usize>>,
    /// Number of entries in the design vector
    pub size: usize,
}

impl DesignVar {
    /// The exposed entries of `value`.
    pub fn select(&self, value: &[f64]) -> Vec<f64> {
        pick(value, self.indices.as_deref())
    }

    /// Write the exposed entries of `value` from `design`.
    pub fn scatter(&self, design: &[f64], value: &mut [f64]) {
        match &self.indices {
            Some(indices) => {
                for (&i, &x) in indices.iter().zip(design) {
                    value[i] = x;
                }
            }
            None => value.copy_from_slice(design),
        }
    }
}

/// The objective binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub path: String,
    pub var: VarId,
    pub sense: Sense,
}

impl Objective {
    /// The value a minimizer should see.
    pub fn minimization_value(&self, value: f64) -> f64 {
        match self.sense {
            Sense::Minimize => value,
            Sense::Maximize => -value,
        }
    }
}

/// A constraint binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub path: String,
    pub var: VarId,
    pub bounds: ConstraintBounds,
    /// Constrained entries; `None` constrains all of them
    pub indices: Option<Vec<usize>>,
}

impl Constraint {
    /// The constrained entries of `value`.
    pub fn select(&self, value: &[f64]) -> Vec<f64> {
        pick(value, self.indices.as_deref())
    }
}
