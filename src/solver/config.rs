//! Solver and differencing configuration.

use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_ATOL, DEFAULT_DIVERGENCE_FACTOR, DEFAULT_DIVERGENCE_PATIENCE, DEFAULT_FD_STEP,
    DEFAULT_MAX_ITERATIONS, DEFAULT_RTOL,
};
use crate::error::{MdoError, Result};

/// Nonlinear strategy for coupled groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Nonlinear block Gauss-Seidel: sweep components in order
    GaussSeidel,
    /// Newton on all group outputs simultaneously
    #[default]
    Newton,
}

/// Residual norm used for convergence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    #[default]
    L2,
    MaxAbs,
}

impl Norm {
    /// Compute the norm of a vector.
    pub fn of(self, v: &[f64]) -> f64 {
        match self {
            Norm::L2 => v.iter().map(|x| x * x).sum::<f64>().sqrt(),
            Norm::MaxAbs => v.iter().fold(0.0f64, |m, x| m.max(x.abs())),
        }
    }
}

/// Finite difference scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdScheme {
    #[default]
    Forward,
    Backward,
    Central,
}

/// Finite difference settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdConfig {
    pub scheme: FdScheme,
    pub step: f64,
    /// Scale the step by `max(|x|, 1)`
    pub relative: bool,
}

impl Default for FdConfig {
    fn default() -> Self {
        Self {
            scheme: FdScheme::Forward,
            step: DEFAULT_FD_STEP,
            relative: false,
        }
    }
}

impl FdConfig {
    /// Step size to use around `x`.
    pub fn step_at(&self, x: f64) -> f64 {
        if self.relative {
            self.step * x.abs().max(1.0)
        } else {
            self.step
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(MdoError::solver_config("finite difference step must be positive"));
        }
        Ok(())
    }
}

/// Armijo-Goldstein backtracking line search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    pub max_iterations: usize,
    /// Initial step length
    pub alpha: f64,
    /// Contraction factor per backtrack
    pub rho: f64,
    /// Sufficient decrease parameter
    pub c: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            alpha: 1.0,
            rho: 0.5,
            c: 0.1,
        }
    }
}

impl LineSearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(MdoError::solver_config("line search alpha must be positive"));
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(MdoError::solver_config("line search rho must be in (0, 1)"));
        }
        if !(self.c > 0.0 && self.c < 1.0) {
            return Err(MdoError::solver_config("line search c must be in (0, 1)"));
        }
        Ok(())
    }
}

/// Configuration for the nonlinear solver of a coupled group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: Strategy,
    /// Maximum iterations per group
    pub max_iterations: usize,
    /// Absolute residual tolerance
    pub atol: f64,
    /// Residual tolerance relative to the initial residual
    pub rtol: f64,
    pub norm: Norm,
    /// Diverged when the residual exceeds this multiple of the initial one
    pub divergence_factor: f64,
    /// ...for this many consecutive iterations
    pub divergence_patience: usize,
    /// Gauss-Seidel under/over-relaxation
    pub relaxation: f64,
    /// Newton backtracking; `None` takes full steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_search: Option<LineSearchConfig>,
    /// Default differencing for undeclared partials
    pub fd: FdConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Newton,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            atol: DEFAULT_ATOL,
            rtol: DEFAULT_RTOL,
            norm: Norm::L2,
            divergence_factor: DEFAULT_DIVERGENCE_FACTOR,
            divergence_patience: DEFAULT_DIVERGENCE_PATIENCE,
            relaxation: 1.0,
            line_search: None,
            fd: FdConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gauss-Seidel with default settings.
    pub fn gauss_seidel() -> Self {
        Self::default().with_strategy(Strategy::GaussSeidel)
    }

    /// Newton with default settings.
    pub fn newton() -> Self {
        Self::default().with_strategy(Strategy::Newton)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set absolute and relative tolerances.
    ///
    /// A group converges when either is met.
    pub fn with_tolerances(mut self, atol: f64, rtol: f64) -> Self {
        self.atol = atol;
        self.rtol = rtol;
        self
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    /// Set the divergence detector.
    pub fn with_divergence(mut self, factor: f64, patience: usize) -> Self {
        self.divergence_factor = factor;
        self.divergence_patience = patience;
        self
    }

    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Enable backtracking line search for Newton.
    pub fn with_line_search(mut self, line_search: LineSearchConfig) -> Self {
        self.line_search = Some(line_search);
        self
    }

    pub fn with_fd(mut self, fd: FdConfig) -> Self {
        self.fd = fd;
        self
    }

    /// Check all parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(MdoError::solver_config("max_iterations must be at least 1"));
        }
        if !self.atol.is_finite() || self.atol < 0.0 {
            return Err(MdoError::solver_config("atol must be finite and non-negative"));
        }
        if !self.rtol.is_finite() || self.rtol < 0.0 {
            return Err(MdoError::solver_config("rtol must be finite and non-negative"));
        }
        if !(self.divergence_factor > 1.0) {
            return Err(MdoError::solver_config("divergence_factor must be greater than 1"));
        }
        if self.divergence_patience == 0 {
            return Err(MdoError::solver_config("divergence_patience must be at least 1"));
        }
        if !(self.relaxation > 0.0 && self.relaxation <= 2.0) {
            return Err(MdoError::solver_config("relaxation must be in (0, 2]"));
        }
        if let Some(ls) = &self.line_search {
            ls.validate()?;
        }
        self.fd.validate()
    }
}
