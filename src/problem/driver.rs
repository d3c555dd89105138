//! Driver seam for optimizers.

use log::info;

use super::{EvaluationPoint, Problem};
use crate::error::Result;

/// Something that decides where a [`Problem`] is evaluated.
///
/// Optimizers implement this on top of [`Problem::evaluate`],
/// [`Problem::evaluate_with_totals`] and [`Problem::design_bounds`].
pub trait Driver {
    /// Drive the problem and return the final point.
    fn run(&mut self, problem: &mut Problem) -> Result<EvaluationPoint>;
}

/// Evaluate once at the current design point.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOnce {
    /// Also compute total derivatives
    pub totals: bool,
}

impl RunOnce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_totals(mut self) -> Self {
        self.totals = true;
        self
    }
}

impl Driver for RunOnce {
    fn run(&mut self, problem: &mut Problem) -> Result<EvaluationPoint> {
        let design = problem.design_vector();
        let point = if self.totals {
            problem.evaluate_with_totals(&design)?
        } else {
            problem.evaluate(&design)?
        };
        info!(
            "run once: objective {:.6e}, {} constraint value(s)",
            point.objective,
            point.constraints.len()
        );
        Ok(point)
    }
}
