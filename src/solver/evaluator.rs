//! Whole-graph evaluation.

use log::{debug, info, warn};
use serde::Serialize;

use super::config::{SolverConfig, Strategy};
use super::monitor::{ConvergenceMonitor, Phase, SolveStatus};
use super::system::GroupSystem;
use super::{gauss_seidel, newton};
use crate::error::{MdoError, Result};
use crate::model::{Graph, Schedule, Unit};

/// Outcome of one coupled group solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub name: String,
    /// Member component names
    pub members: Vec<String>,
    pub strategy: Strategy,
    pub status: SolveStatus,
    pub iterations: usize,
    /// Residual norm before the first iteration and after each one
    pub residual_history: Vec<f64>,
}

impl GroupReport {
    pub fn final_residual(&self) -> f64 {
        self.residual_history.last().copied().unwrap_or(0.0)
    }

    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Outcome of one evaluation of the graph.
///
/// Non-convergence is data here: downstream components still ran with the
/// last iterate. Use [`EvaluationReport::into_result`] to treat it as an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Unit names in execution order
    pub order: Vec<String>,
    /// One entry per coupled unit, in execution order
    pub groups: Vec<GroupReport>,
}

impl EvaluationReport {
    /// Check whether every coupled group converged.
    pub fn converged(&self) -> bool {
        self.groups.iter().all(GroupReport::converged)
    }

    pub fn find(&self, name: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Fail with the first group that did not converge.
    pub fn into_result(self) -> Result<Self> {
        if let Some(group) = self.groups.iter().find(|g| !g.converged()) {
            return Err(MdoError::NonConvergence {
                group: group.name.clone(),
                status: group.status.to_string(),
                iterations: group.iterations,
                residual: group.final_residual(),
            });
        }
        Ok(self)
    }
}

/// Runs a graph's schedule: plain components once, coupled units through
/// their nonlinear solver.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: SolverConfig,
    schedule: Schedule,
    revision: u64,
}

impl Evaluator {
    /// Validate the solver settings and build the schedule.
    pub fn new(graph: &Graph, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let schedule = Schedule::build(graph, &config)?;
        Ok(Self {
            config,
            schedule,
            revision: graph.revision(),
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Evaluate every unit in order.
    ///
    /// The schedule is rebuilt first if the graph changed since it was built.
    /// Component errors (domain violations, singular Jacobians) abort the run.
    pub fn run(&mut self, graph: &mut Graph) -> Result<EvaluationReport> {
        if graph.revision() != self.revision {
            debug!("graph changed, rebuilding schedule");
            self.schedule = Schedule::build(graph, &self.config)?;
            self.revision = graph.revision();
        }

        let mut report = EvaluationReport::default();
        for unit in &self.schedule.units {
            report.order.push(unit.name.clone());
            if unit.coupled {
                report.groups.push(solve_unit(graph, unit, &self.config)?);
            } else {
                for &member in &unit.members {
                    graph.compute_component(member)?;
                }
            }
        }
        Ok(report)
    }
}

fn solve_unit(graph: &mut Graph, unit: &Unit, default: &SolverConfig) -> Result<GroupReport> {
    let config = unit.config(default);
    let system = GroupSystem::new(graph, &unit.members);
    let mut monitor = ConvergenceMonitor::new(config);

    match config.strategy {
        Strategy::GaussSeidel => gauss_seidel::solve(graph, &system, config, &mut monitor, &unit.name)?,
        Strategy::Newton => newton::solve(graph, &system, config, &mut monitor, &unit.name)?,
    }

    let status = match monitor.phase() {
        Phase::Done(status) => status,
        Phase::Init | Phase::Iterating => SolveStatus::MaxIterExceeded,
    };
    let iterations = monitor.iterations();
    match status {
        SolveStatus::Converged => info!(
            "{}: converged in {} iterations (residual {:.3e})",
            unit.name,
            iterations,
            monitor.last()
        ),
        SolveStatus::Diverged => warn!(
            "{}: diverged after {} iterations (residual {:.3e})",
            unit.name,
            iterations,
            monitor.last()
        ),
        SolveStatus::MaxIterExceeded => warn!(
            "{}: not converged after {} iterations (residual {:.3e})",
            unit.name,
            iterations,
            monitor.last()
        ),
    }

    Ok(GroupReport {
        name: unit.name.clone(),
        members: unit
            .members
            .iter()
            .map(|&m| graph.component(m).name.clone())
            .collect(),
        strategy: config.strategy,
        status,
        iterations,
        residual_history: monitor.into_history(),
    })
}
