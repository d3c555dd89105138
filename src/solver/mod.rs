//! Nonlinear solvers for coupled groups.
//!
//! This module provides the numerical engine that evaluates a [`Graph`](crate::model::Graph).
//!
//! ## Residual formulation
//!
//! Every coupled group is solved as one system `R(u) = 0`, where `u` stacks
//! the outputs of all members:
//! ```text
//! explicit member:  R = y - f(x)
//! implicit member:  R = residual(x, y)
//! ```
//! Inputs fed by other members of the group are functions of `u`; inputs fed
//! from outside the group are held fixed.
//!
//! ## Strategies
//!
//! - Gauss-Seidel sweeps the members in schedule order, recomputing explicit
//!   outputs and running the local solve of implicit members.
//! - Newton assembles the group Jacobian from component partials (analytic
//!   or finite-difference) and solves `J * delta = -R` by LU with partial
//!   pivoting, optionally with Armijo backtracking.
//!
//! Both stop on the first of: residual below `atol`, residual ratio below
//! `rtol`, sustained growth beyond the divergence factor, or the iteration cap.

mod config;
mod derivatives;
mod evaluator;
mod gauss_seidel;
mod line_search;
mod linear;
mod monitor;
mod newton;
mod system;

pub use config::{FdConfig, FdScheme, LineSearchConfig, Norm, SolverConfig, Strategy};
pub use derivatives::{component_partials, group_jacobian};
pub use evaluator::{EvaluationReport, Evaluator, GroupReport};
pub use linear::DenseMatrix;
pub use monitor::{ConvergenceMonitor, Phase, SolveStatus};
pub use system::GroupSystem;

/// Absolute residual tolerance.
pub const DEFAULT_ATOL: f64 = 1e-10;

/// Residual tolerance relative to the initial residual.
pub const DEFAULT_RTOL: f64 = 1e-10;

/// Maximum nonlinear iterations per group.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Residual growth factor (relative to the initial residual) counted as divergent.
pub const DEFAULT_DIVERGENCE_FACTOR: f64 = 1e4;

/// Consecutive divergent iterations before giving up.
pub const DEFAULT_DIVERGENCE_PATIENCE: usize = 3;

/// Finite difference step.
pub const DEFAULT_FD_STEP: f64 = 1e-6;
