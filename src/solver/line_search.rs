//! Armijo-Goldstein backtracking on the residual norm.

use log::debug;

use super::config::{LineSearchConfig, Norm};
use super::system::GroupSystem;
use crate::error::Result;
use crate::model::Graph;

/// Result of a line search: the accepted step length and residual.
#[derive(Debug, Clone)]
pub struct Step {
    pub alpha: f64,
    pub residual: Vec<f64>,
    pub norm: f64,
}

/// Move along `delta` from `u0`, shrinking the step until
/// `|R(u0 + alpha * delta)| <= (1 - c * alpha) * |R(u0)|`.
///
/// When no trial satisfies the condition the last one is kept. Trial points
/// rejected by a component's domain check count as failed trials.
pub fn backtrack(
    graph: &mut Graph,
    system: &GroupSystem,
    config: &LineSearchConfig,
    norm: Norm,
    u0: &[f64],
    delta: &[f64],
    norm0: f64,
) -> Result<Step> {
    let mut alpha = config.alpha;
    let tries = config.max_iterations.max(1);
    let mut u = vec![0.0; u0.len()];

    let mut attempt = 0;
    loop {
        attempt += 1;
        for ((ui, a), d) in u.iter_mut().zip(u0).zip(delta) {
            *ui = a + alpha * d;
        }
        system.scatter(graph, &u);

        let residual = match system.residual(graph) {
            Ok(r) => r,
            Err(e) if e.is_domain() && attempt < tries => {
                debug!("line search: alpha {:.3e} left the domain ({})", alpha, e);
                alpha *= config.rho;
                continue;
            }
            Err(e) => return Err(e),
        };
        let trial = norm.of(&residual);

        if trial <= (1.0 - config.c * alpha) * norm0 || attempt == tries {
            return Ok(Step {
                alpha,
                residual,
                norm: trial,
            });
        }
        debug!("line search: alpha {:.3e} rejected, residual {:.3e}", alpha, trial);
        alpha *= config.rho;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ExecComp;
    use crate::model::ComponentId;

    #[test]
    fn test_full_step_accepted_on_linear_problem() {
        let mut g = Graph::new();
        g.add_component("a", ExecComp::new(&["y = 0.5*x + 1"]).unwrap())
            .unwrap();
        let system = GroupSystem::new(&g, &[ComponentId(0)]);
        // y = 1, f = 1.5 -> Newton step +0.5
        let u0 = system.gather(&g);
        let step = backtrack(
            &mut g,
            &system,
            &LineSearchConfig::default(),
            Norm::L2,
            &u0,
            &[0.5],
            0.5,
        )
        .unwrap();
        assert_eq!(step.alpha, 1.0);
        assert_eq!(step.norm, 0.0);
        assert_eq!(g.get_scalar("a.y").unwrap(), 1.5);
    }

    #[test]
    fn test_overshoot_is_shortened() {
        let mut g = Graph::new();
        g.add_component("a", ExecComp::new(&["y = 0.5*x + 1"]).unwrap())
            .unwrap();
        let system = GroupSystem::new(&g, &[ComponentId(0)]);
        let u0 = system.gather(&g);
        // A step of +2 overshoots to a residual of 1.5
        let step = backtrack(
            &mut g,
            &system,
            &LineSearchConfig::default(),
            Norm::L2,
            &u0,
            &[2.0],
            0.5,
        )
        .unwrap();
        assert_eq!(step.alpha, 0.25);
        assert_eq!(step.norm, 0.0);
    }
}
