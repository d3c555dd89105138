//! # MDO Core
//!
//! Evaluation and convergence kernel for multidisciplinary design
//! optimization models.
//!
//! This library provides:
//! - A component contract for explicit (`y = f(x)`) and implicit
//!   (`R(x, y) = 0`) computations, with a library of ready-made components
//! - A connection graph with unit, shape and single-source checks
//! - Automatic detection of coupled groups (strongly connected components)
//! - Gauss-Seidel and Newton solvers with convergence monitoring
//! - A binding layer exposing design variables, objective and constraints to
//!   an external optimizer
//! - JSON model descriptions and text/Graphviz reports
//!
//! ## Architecture
//!
//! - [`components`] - Component trait and component library
//! - [`expr`] - Expression language behind [`components::ExecComp`]
//! - [`model`] - Variable registry, connection graph and schedule
//! - [`solver`] - Nonlinear solvers, derivatives and the evaluator
//! - [`problem`] - Optimization bindings and model descriptions
//! - [`report`] - Listings and DOT export
//!
//! ## Usage
//!
//! ```bash
//! mdo sellar.json --strategy gauss_seidel -v
//! ```
//!
//! ```no_run
//! use mdo_core::components::Paraboloid;
//! use mdo_core::model::Graph;
//! use mdo_core::problem::{Problem, Sense};
//!
//! # fn main() -> mdo_core::Result<()> {
//! let mut graph = Graph::new();
//! graph.add_component("p", Paraboloid::new())?;
//!
//! let mut problem = Problem::new(graph);
//! problem.bind_design_var("p.x", -50.0, 50.0)?;
//! problem.bind_design_var("p.y", -50.0, 50.0)?;
//! problem.bind_objective("p.f_xy", Sense::Minimize)?;
//!
//! let point = problem.evaluate(&[1.0, 2.0])?;
//! println!("f = {}", point.objective);
//! # Ok(())
//! # }
//! ```
//!
//! ## Evaluation
//!
//! Components are partitioned into units: each strongly connected component
//! of the connection graph, each implicit component and each designated group
//! is a coupled unit; every other component runs once. Units execute in
//! dependency order, ties broken by insertion order. Coupled units are solved
//! until their residual norm meets the configured tolerances, and the outcome
//! of every solve is returned as data in an [`solver::EvaluationReport`].

pub mod components;
pub mod error;
pub mod expr;
pub mod model;
pub mod problem;
pub mod report;
pub mod solver;

// Re-export main types for convenience
pub use error::{MdoError, Result};
pub use model::Graph;
pub use problem::{ModelSpec, Problem};
pub use solver::{EvaluationReport, SolverConfig};
