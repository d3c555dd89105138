//! Nonlinear block Gauss-Seidel.

use log::debug;

use super::config::SolverConfig;
use super::monitor::ConvergenceMonitor;
use super::system::GroupSystem;
use crate::error::Result;
use crate::model::{Graph, Kind};

/// Sweep the group's members in order until the residual converges.
///
/// Explicit members recompute their outputs (blended with the previous
/// value when `relaxation != 1`); implicit members run their local solve.
pub fn solve(
    graph: &mut Graph,
    system: &GroupSystem,
    config: &SolverConfig,
    monitor: &mut ConvergenceMonitor,
    name: &str,
) -> Result<()> {
    let norm0 = config.norm.of(&system.residual(graph)?);
    let mut phase = monitor.start(norm0);
    debug!("{}: gauss-seidel start, residual {:.3e}", name, norm0);

    while !phase.is_done() {
        sweep(graph, system, config.relaxation)?;
        let norm = config.norm.of(&system.residual(graph)?);
        phase = monitor.update(norm);
        debug!(
            "{}: gauss-seidel iteration {}, residual {:.3e}",
            name,
            monitor.iterations(),
            norm
        );
    }
    Ok(())
}

fn sweep(graph: &mut Graph, system: &GroupSystem, relaxation: f64) -> Result<()> {
    for &member in system.members() {
        graph.transfer(member);
        let inputs = graph.inputs_of(member);
        let previous = graph.outputs_of(member);
        let mut outputs = previous.clone();

        let entry = graph.component(member);
        match entry.kind {
            Kind::Explicit => {
                entry.component().compute(&inputs, &mut outputs)?;
                if relaxation != 1.0 {
                    for (new, old) in outputs.values_mut().iter_mut().zip(previous.values()) {
                        for (n, o) in new.iter_mut().zip(old) {
                            *n = o + relaxation * (*n - o);
                        }
                    }
                }
            }
            Kind::Implicit => entry.component().solve_nonlinear(&inputs, &mut outputs)?,
        }
        graph.store_outputs(member, outputs);
    }
    Ok(())
}
