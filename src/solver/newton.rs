//! Newton-Raphson iteration over all outputs of a coupled group.

use log::debug;

use super::config::SolverConfig;
use super::derivatives::group_jacobian;
use super::line_search::backtrack;
use super::monitor::ConvergenceMonitor;
use super::system::GroupSystem;
use crate::error::Result;
use crate::model::Graph;

/// Solve `R(u) = 0` for the group's unknowns.
///
/// Each iteration assembles the Jacobian, solves `J * delta = -R` and
/// steps (optionally with backtracking). A singular Jacobian is an error.
pub fn solve(
    graph: &mut Graph,
    system: &GroupSystem,
    config: &SolverConfig,
    monitor: &mut ConvergenceMonitor,
    name: &str,
) -> Result<()> {
    let mut residual = system.residual(graph)?;
    let mut norm = config.norm.of(&residual);
    let mut phase = monitor.start(norm);
    debug!("{}: newton start, residual {:.3e}", name, norm);

    while !phase.is_done() {
        let mut jac = group_jacobian(graph, system, config.fd)?;
        jac.factor()?;
        let rhs: Vec<f64> = residual.iter().map(|r| -r).collect();
        let delta = jac.solve(&rhs);
        let u0 = system.gather(graph);

        match &config.line_search {
            Some(ls) => {
                let step = backtrack(graph, system, ls, config.norm, &u0, &delta, norm)?;
                residual = step.residual;
                norm = step.norm;
                debug!(
                    "{}: newton iteration {}, alpha {:.3e}, residual {:.3e}",
                    name,
                    monitor.iterations() + 1,
                    step.alpha,
                    norm
                );
            }
            None => {
                let u: Vec<f64> = u0.iter().zip(&delta).map(|(a, d)| a + d).collect();
                system.scatter(graph, &u);
                residual = system.residual(graph)?;
                norm = config.norm.of(&residual);
                debug!(
                    "{}: newton iteration {}, residual {:.3e}",
                    name,
                    monitor.iterations() + 1,
                    norm
                );
            }
        }
        phase = monitor.update(norm);
    }
    Ok(())
}
