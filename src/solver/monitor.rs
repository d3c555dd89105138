//! Convergence monitoring for iterative group solves.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::SolverConfig;

/// Final state of a group solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    Diverged,
    MaxIterExceeded,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "converged"),
            SolveStatus::Diverged => write!(f, "diverged"),
            SolveStatus::MaxIterExceeded => write!(f, "exceeded the iteration limit"),
        }
    }
}

/// Solver state machine.
///
/// `Init -> Iterating -> {Converged, Diverged, MaxIterExceeded}`; the
/// initial residual alone may already settle the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Iterating,
    Done(SolveStatus),
}

impl Phase {
    pub fn is_done(&self) -> bool {
        matches!(self, Phase::Done(_))
    }
}

/// Tracks residual norms against tolerances and the divergence detector.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    atol: f64,
    rtol: f64,
    max_iterations: usize,
    divergence_factor: f64,
    divergence_patience: usize,
    history: Vec<f64>,
    above_threshold: usize,
    phase: Phase,
}

impl ConvergenceMonitor {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            atol: config.atol,
            rtol: config.rtol,
            max_iterations: config.max_iterations,
            divergence_factor: config.divergence_factor,
            divergence_patience: config.divergence_patience,
            history: Vec::new(),
            above_threshold: 0,
            phase: Phase::Init,
        }
    }

    /// Record the residual norm before the first iteration.
    pub fn start(&mut self, norm0: f64) -> Phase {
        self.history.clear();
        self.history.push(norm0);
        self.above_threshold = 0;
        self.phase = if !norm0.is_finite() {
            Phase::Done(SolveStatus::Diverged)
        } else if norm0 == 0.0 || norm0 < self.atol {
            Phase::Done(SolveStatus::Converged)
        } else {
            Phase::Iterating
        };
        self.phase
    }

    /// Record the residual norm after one iteration.
    pub fn update(&mut self, norm: f64) -> Phase {
        self.history.push(norm);
        let norm0 = self.history[0];

        self.phase = if !norm.is_finite() {
            Phase::Done(SolveStatus::Diverged)
        } else if norm < self.atol || (norm0 > 0.0 && norm / norm0 < self.rtol) {
            Phase::Done(SolveStatus::Converged)
        } else {
            if norm > self.divergence_factor * norm0 {
                self.above_threshold += 1;
            } else {
                self.above_threshold = 0;
            }

            if self.above_threshold >= self.divergence_patience {
                Phase::Done(SolveStatus::Diverged)
            } else if self.iterations() >= self.max_iterations {
                Phase::Done(SolveStatus::MaxIterExceeded)
            } else {
                Phase::Iterating
            }
        };
        self.phase
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Iterations recorded since [`ConvergenceMonitor::start`].
    pub fn iterations(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Residual norms, starting with the initial one.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn last(&self) -> f64 {
        self.history.last().copied().unwrap_or(0.0)
    }

    pub fn into_history(self) -> Vec<f64> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ConvergenceMonitor {
        ConvergenceMonitor::new(&SolverConfig::default().with_max_iterations(5))
    }

    #[test]
    fn test_zero_initial_residual_converges_immediately() {
        let mut m = monitor();
        assert_eq!(m.start(0.0), Phase::Done(SolveStatus::Converged));
        assert_eq!(m.iterations(), 0);
    }

    #[test]
    fn test_relative_tolerance() {
        let mut m = ConvergenceMonitor::new(&SolverConfig::default().with_tolerances(0.0, 1e-3));
        assert_eq!(m.start(100.0), Phase::Iterating);
        assert_eq!(m.update(1.0), Phase::Iterating);
        assert_eq!(m.update(0.05), Phase::Done(SolveStatus::Converged));
        assert_eq!(m.history(), &[100.0, 1.0, 0.05]);
    }

    #[test]
    fn test_max_iterations() {
        let mut m = monitor();
        m.start(1.0);
        for _ in 0..4 {
            assert_eq!(m.update(0.5), Phase::Iterating);
        }
        assert_eq!(m.update(0.5), Phase::Done(SolveStatus::MaxIterExceeded));
        assert_eq!(m.iterations(), 5);
    }

    #[test]
    fn test_divergence_needs_consecutive_growth() {
        let mut m = ConvergenceMonitor::new(&SolverConfig::default());
        m.start(1.0);
        assert_eq!(m.update(2e4), Phase::Iterating);
        assert_eq!(m.update(3e4), Phase::Iterating);
        // Dropping back resets the counter
        assert_eq!(m.update(10.0), Phase::Iterating);
        assert_eq!(m.update(2e4), Phase::Iterating);
        assert_eq!(m.update(2e4), Phase::Iterating);
        assert_eq!(m.update(2e4), Phase::Done(SolveStatus::Diverged));
    }

    #[test]
    fn test_non_finite_is_diverged() {
        let mut m = monitor();
        assert_eq!(m.start(f64::NAN), Phase::Done(SolveStatus::Diverged));
        m.start(1.0);
        assert_eq!(m.update(f64::INFINITY), Phase::Done(SolveStatus::Diverged));
    }
}
