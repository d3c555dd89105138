//! Optimization problem: a graph plus design variables, an objective and
//! constraints, evaluated on behalf of an external driver.
//!
//! The driver loop itself lives outside this crate; [`Driver`] is the seam
//! and [`RunOnce`] the built-in driver.

mod bindings;
mod driver;
mod spec;

pub use bindings::{Constraint, ConstraintBounds, DesignVar, Objective, Sense};
use bindings::check_indices;
pub use driver::{Driver, RunOnce};
pub use spec::{ComponentDef, ConnectionDef, ConstraintDef, DesignVarDef, GroupSpec, ModelSpec, ObjectiveDef};

use log::debug;

use crate::error::{MdoError, Result};
use crate::model::{Direction, Graph, VarId};
use crate::solver::{EvaluationReport, Evaluator, SolverConfig};

/// Total derivatives of the responses with respect to the design vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    /// `d objective / d design[j]`
    pub objective: Vec<f64>,
    /// One row per flattened constraint entry
    pub constraints: Vec<Vec<f64>>,
}

/// Responses of one evaluation at a design point.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPoint {
    pub design: Vec<f64>,
    pub objective: f64,
    /// Constraint values, flattened in binding order
    pub constraints: Vec<f64>,
    pub report: EvaluationReport,
    pub totals: Option<Totals>,
}

impl EvaluationPoint {
    /// Check whether the model converged at this point.
    pub fn converged(&self) -> bool {
        self.report.converged()
    }
}

/// A graph with its optimization bindings.
#[derive(Debug)]
pub struct Problem {
    graph: Graph,
    solver: SolverConfig,
    evaluator: Option<Evaluator>,
    design_vars: Vec<DesignVar>,
    objective: Option<Objective>,
    constraints: Vec<Constraint>,
}

impl Problem {
    /// Wrap a graph with the default solver.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            solver: SolverConfig::default(),
            evaluator: None,
            design_vars: Vec::new(),
            objective: None,
            constraints: Vec::new(),
        }
    }

    /// Set the solver used for coupled units without their own settings.
    pub fn with_solver(mut self, solver: SolverConfig) -> Result<Self> {
        solver.validate()?;
        self.solver = solver;
        self.evaluator = None;
        Ok(self)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access to the graph; structural changes are picked up on the
    /// next run.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn solver(&self) -> &SolverConfig {
        &self.solver
    }

    pub fn design_vars(&self) -> &[DesignVar] {
        &self.design_vars
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Expose an independent quantity to the driver.
    ///
    /// `path` must name an output of a component without inputs or an input
    /// with no incoming connection.
    pub fn bind_design_var(&mut self, path: &str, lower: f64, upper: f64) -> Result<()> {
        self.bind_design_var_with(path, lower, upper, None)
    }

    /// Like [`Problem::bind_design_var`], exposing only the given entries of
    /// a vector variable, in the given order.
    pub fn bind_design_var_with(
        &mut self,
        path: &str,
        lower: f64,
        upper: f64,
        indices: Option<Vec<usize>>,
    ) -> Result<()> {
        let var = self.graph.resolve(path)?;
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(MdoError::malformed_bounds(
                path,
                format!("invalid design bounds [{}, {}]", lower, upper),
            ));
        }
        if self.design_vars.iter().any(|d| d.var == var) {
            return Err(MdoError::InvalidDesignVar {
                path: path.to_string(),
                message: "already bound".to_string(),
            });
        }

        let variable = self.graph.registry().variable(var);
        match variable.direction {
            Direction::Output => {
                let owner = self.graph.component(variable.owner);
                if !owner.inputs.is_empty() {
                    return Err(MdoError::InvalidDesignVar {
                        path: path.to_string(),
                        message: format!("'{}' computes it from its inputs", owner.name),
                    });
                }
            }
            Direction::Input => {
                if let Some(conn) = self.graph.source_of(var) {
                    return Err(MdoError::InvalidDesignVar {
                        path: path.to_string(),
                        message: format!(
                            "connected to '{}'",
                            self.graph.registry().variable(conn.source).path
                        ),
                    });
                }
            }
        }

        let size = match &indices {
            Some(idx) => {
                check_indices(path, idx, variable.len())?;
                let mut sorted = idx.clone();
                sorted.sort_unstable();
                sorted.dedup();
                if idx.is_empty() || sorted.len() != idx.len() {
                    return Err(MdoError::InvalidDesignVar {
                        path: path.to_string(),
                        message: "indices must be non-empty and distinct".to_string(),
                    });
                }
                idx.len()
            }
            None => variable.len(),
        };

        self.design_vars.push(DesignVar {
            path: variable.path.clone(),
            var,
            lower,
            upper,
            indices,
            size,
        });
        Ok(())
    }

    /// Bind the scalar objective.
    pub fn bind_objective(&mut self, path: &str, sense: Sense) -> Result<()> {
        if let Some(existing) = &self.objective {
            return Err(MdoError::DuplicateObjective {
                existing: existing.path.clone(),
            });
        }
        let var = self.graph.resolve(path)?;
        let variable = self.graph.registry().variable(var);
        if variable.len() != 1 {
            return Err(MdoError::ShapeMismatch {
                path: variable.path.clone(),
                expected: 1,
                actual: variable.len(),
            });
        }
        self.objective = Some(Objective {
            path: variable.path.clone(),
            var,
            sense,
        });
        Ok(())
    }

    pub fn bind_constraint(&mut self, path: &str, bounds: ConstraintBounds) -> Result<()> {
        self.bind_constraint_with(path, bounds, None)
    }

    /// Constrain only the given entries of a vector variable.
    pub fn bind_constraint_with(
        &mut self,
        path: &str,
        bounds: ConstraintBounds,
        indices: Option<Vec<usize>>,
    ) -> Result<()> {
        let var = self.graph.resolve(path)?;
        bounds.validate(path)?;
        let variable = self.graph.registry().variable(var);
        if let Some(idx) = &indices {
            if idx.is_empty() {
                return Err(MdoError::malformed_bounds(path, "indices must not be empty"));
            }
            check_indices(path, idx, variable.len())?;
        }
        self.constraints.push(Constraint {
            path: variable.path.clone(),
            var,
            bounds,
            indices,
        });
        Ok(())
    }

    /// Length of the flattened design vector.
    pub fn design_size(&self) -> usize {
        self.design_vars.iter().map(|d| d.size).sum()
    }

    /// Current design variable values, flattened in binding order.
    pub fn design_vector(&self) -> Vec<f64> {
        self.design_vars
            .iter()
            .flat_map(|d| d.select(self.graph.value(d.var)))
            .collect()
    }

    /// `(lower, upper)` per design vector entry.
    pub fn design_bounds(&self) -> Vec<(f64, f64)> {
        self.design_vars
            .iter()
            .flat_map(|d| std::iter::repeat((d.lower, d.upper)).take(d.size))
            .collect()
    }

    /// Write a flattened design vector into the graph.
    pub fn set_design(&mut self, design: &[f64]) -> Result<()> {
        if design.len() != self.design_size() {
            return Err(MdoError::ShapeMismatch {
                path: "design vector".to_string(),
                expected: self.design_size(),
                actual: design.len(),
            });
        }
        let mut offset = 0;
        for d in &self.design_vars {
            let mut value = self.graph.value(d.var).to_vec();
            d.scatter(&design[offset..offset + d.size], &mut value);
            self.graph.set_value(d.var, &value)?;
            offset += d.size;
        }
        Ok(())
    }

    /// Evaluate the graph at its current values.
    pub fn run(&mut self) -> Result<EvaluationReport> {
        let evaluator = match self.evaluator.take() {
            Some(evaluator) => evaluator,
            None => Evaluator::new(&self.graph, self.solver.clone())?,
        };
        self.evaluator.insert(evaluator).run(&mut self.graph)
    }

    /// Set the design vector, run the model and collect the responses.
    pub fn evaluate(&mut self, design: &[f64]) -> Result<EvaluationPoint> {
        let objective = self.objective.as_ref().ok_or(MdoError::MissingObjective)?.var;
        self.set_design(design)?;
        let report = self.run()?;
        Ok(EvaluationPoint {
            design: design.to_vec(),
            objective: self.graph.value(objective)[0],
            constraints: self.constraint_values(),
            report,
            totals: None,
        })
    }

    /// Like [`Problem::evaluate`], with total derivatives by forward
    /// differences over full model runs.
    ///
    /// The graph is left at the requested design point.
    pub fn evaluate_with_totals(&mut self, design: &[f64]) -> Result<EvaluationPoint> {
        let mut point = self.evaluate(design)?;
        let n = design.len();
        let mut totals = Totals {
            objective: vec![0.0; n],
            constraints: vec![vec![0.0; n]; point.constraints.len()],
        };

        let fd = self.solver.fd;
        let mut shifted = design.to_vec();
        for j in 0..n {
            let h = fd.step_at(design[j]);
            shifted[j] = design[j] + h;
            let perturbed = self.evaluate(&shifted)?;
            shifted[j] = design[j];
            debug!("totals: column {} with step {:.3e}", j, h);

            totals.objective[j] = (perturbed.objective - point.objective) / h;
            for (row, (plus, base)) in totals
                .constraints
                .iter_mut()
                .zip(perturbed.constraints.iter().zip(&point.constraints))
            {
                row[j] = (plus - base) / h;
            }
        }

        // Restore the graph state at the requested point
        self.set_design(design)?;
        self.run()?;
        point.totals = Some(totals);
        Ok(point)
    }

    /// Current constraint values, flattened in binding order.
    pub fn constraint_values(&self) -> Vec<f64> {
        self.constraints
            .iter()
            .flat_map(|c| c.select(self.graph.value(c.var)))
            .collect()
    }

    /// `(path, value, satisfied)` for every constraint entry.
    pub fn constraint_status(&self, tol: f64) -> Vec<(String, f64, bool)> {
        self.constraints
            .iter()
            .flat_map(|c| {
                c.select(self.graph.value(c.var))
                    .into_iter()
                    .map(move |v| (c.path.clone(), v, c.bounds.is_satisfied(v, tol)))
            })
            .collect()
    }

    pub(crate) fn var_path(&self, var: VarId) -> &str {
        &self.graph.registry().variable(var).path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Battery, ExecComp, IndepVar, Paraboloid, SellarDis1, SellarDis2};
    use approx::assert_relative_eq;

    fn paraboloid() -> Problem {
        let mut g = Graph::new();
        g.add_component("p", Paraboloid::new()).unwrap();
        let mut problem = Problem::new(g);
        problem.bind_design_var("p.x", -50.0, 50.0).unwrap();
        problem.bind_design_var("p.y", -50.0, 50.0).unwrap();
        problem.bind_objective("p.f_xy", Sense::Minimize).unwrap();
        problem
    }

    fn sellar() -> Problem {
        let mut g = Graph::new();
        g.add_component(
            "dvs",
            IndepVar::default()
                .with_output("x", 1.0, None)
                .with_output("z", vec![5.0, 2.0], None),
        )
        .unwrap();
        g.add_component("d1", SellarDis1::new()).unwrap();
        g.add_component("d2", SellarDis2::new()).unwrap();
        g.add_component(
            "obj_cmp",
            ExecComp::new(&["obj = x**2 + z[1] + y1 + exp(-y2)"])
                .unwrap()
                .with_default("z", vec![0.0, 0.0]),
        )
        .unwrap();
        g.add_component("cons", ExecComp::new(&["con1 = 3.16 - y1", "con2 = y2 - 24.0"]).unwrap())
            .unwrap();
        for (src, dst) in [
            ("dvs.x", "d1.x"),
            ("dvs.z", "d1.z"),
            ("dvs.z", "d2.z"),
            ("d1.y1", "d2.y1"),
            ("d2.y2", "d1.y2"),
            ("dvs.x", "obj_cmp.x"),
            ("dvs.z", "obj_cmp.z"),
            ("d1.y1", "obj_cmp.y1"),
            ("d2.y2", "obj_cmp.y2"),
            ("d1.y1", "cons.y1"),
            ("d2.y2", "cons.y2"),
        ] {
            g.connect(src, dst).unwrap();
        }
        g.add_group("cycle", &["d1", "d2"], Some(SolverConfig::newton()))
            .unwrap();

        let mut problem = Problem::new(g);
        problem.bind_design_var("dvs.x", 0.0, 10.0).unwrap();
        problem.bind_design_var("dvs.z", -10.0, 10.0).unwrap();
        problem.bind_objective("obj_cmp.obj", Sense::Minimize).unwrap();
        problem
            .bind_constraint("cons.con1", ConstraintBounds::upper(0.0))
            .unwrap();
        problem
            .bind_constraint("cons.con2", ConstraintBounds::upper(0.0))
            .unwrap();
        problem
    }

    #[test]
    fn test_design_var_must_be_independent() {
        let mut problem = sellar();
        let err = problem.bind_design_var("d1.y1", 0.0, 1.0).unwrap_err();
        assert!(matches!(err, MdoError::InvalidDesignVar { .. }));
        let err = problem.bind_design_var("d1.x", 0.0, 1.0).unwrap_err();
        assert!(matches!(err, MdoError::InvalidDesignVar { .. }));
        let err = problem.bind_design_var("dvs.x", 0.0, 1.0).unwrap_err();
        assert!(matches!(err, MdoError::InvalidDesignVar { .. }));
        let err = problem.bind_design_var("obj_cmp.z", 1.0, 0.0).unwrap_err();
        assert!(matches!(err, MdoError::MalformedBounds { .. }));
    }

    #[test]
    fn test_single_objective() {
        let mut problem = sellar();
        let err = problem.bind_objective("cons.con1", Sense::Minimize).unwrap_err();
        match err {
            MdoError::DuplicateObjective { existing } => assert_eq!(existing, "obj_cmp.obj"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_design_layout() {
        let problem = sellar();
        assert_eq!(problem.design_size(), 3);
        assert_eq!(problem.design_vector(), vec![1.0, 5.0, 2.0]);
        assert_eq!(
            problem.design_bounds(),
            vec![(0.0, 10.0), (-10.0, 10.0), (-10.0, 10.0)]
        );
    }

    #[test]
    fn test_evaluate_sellar() {
        let mut problem = sellar();
        let point = problem.evaluate(&[1.0, 5.0, 2.0]).unwrap();
        assert!(point.converged());
        assert_relative_eq!(point.constraints[0], 3.16 - 25.58830237, epsilon = 1e-6);
        assert_relative_eq!(point.constraints[1], 12.05848815 - 24.0, epsilon = 1e-6);
        let status = problem.constraint_status(1e-6);
        assert!(status.iter().all(|(_, _, ok)| *ok));

        let err = problem.evaluate(&[1.0]).unwrap_err();
        assert!(matches!(err, MdoError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_totals_of_paraboloid() {
        let mut problem = paraboloid();
        let point = problem.evaluate_with_totals(&[1.0, 2.0]).unwrap();
        let totals = point.totals.unwrap();
        // df/dx = 2(x-3) + y, df/dy = x + 2(y+4)
        assert_relative_eq!(totals.objective[0], -2.0, epsilon = 1e-4);
        assert_relative_eq!(totals.objective[1], 13.0, epsilon = 1e-4);
        assert_eq!(problem.graph().get_scalar("p.x").unwrap(), 1.0);
    }

    #[test]
    fn test_indexed_bindings() {
        let mut g = Graph::new();
        g.add_component(
            "dvs",
            IndepVar::default()
                .with_output("z", vec![1.0, 2.0, 3.0], None)
                .with_output("w", vec![0.0, 0.0], None),
        )
        .unwrap();
        g.add_component(
            "theta_con",
            ExecComp::new(&["g = 2.0 * z", "total = sum(z)"])
                .unwrap()
                .with_shape("z", 3),
        )
        .unwrap();
        g.connect("dvs.z", "theta_con.z").unwrap();

        let mut problem = Problem::new(g);
        problem
            .bind_design_var_with("dvs.z", 0.0, 10.0, Some(vec![2, 0]))
            .unwrap();
        problem.bind_objective("theta_con.total", Sense::Minimize).unwrap();
        problem
            .bind_constraint_with("theta_con.g", ConstraintBounds::upper(5.0), Some(vec![0, 2]))
            .unwrap();

        assert_eq!(problem.design_size(), 2);
        assert_eq!(problem.design_vector(), vec![3.0, 1.0]);
        assert_eq!(problem.design_bounds(), vec![(0.0, 10.0), (0.0, 10.0)]);

        let point = problem.evaluate(&[4.0, 0.5]).unwrap();
        assert_eq!(problem.graph().get("dvs.z").unwrap(), &[0.5, 2.0, 4.0]);
        assert_relative_eq!(point.objective, 6.5, epsilon = 1e-12);
        assert_eq!(point.constraints.len(), 2);
        assert_relative_eq!(point.constraints[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(point.constraints[1], 8.0, epsilon = 1e-12);
        let satisfied: Vec<bool> = problem.constraint_status(1e-9).into_iter().map(|(_, _, ok)| ok).collect();
        assert_eq!(satisfied, vec![true, false]);

        let err = problem
            .bind_constraint_with("theta_con.g", ConstraintBounds::upper(0.0), Some(vec![3]))
            .unwrap_err();
        assert!(matches!(err, MdoError::IndexOutOfRange { index: 3, len: 3, .. }));
        let err = problem
            .bind_constraint_with("theta_con.g", ConstraintBounds::upper(0.0), Some(vec![]))
            .unwrap_err();
        assert!(matches!(err, MdoError::MalformedBounds { .. }));
        let err = problem
            .bind_design_var_with("dvs.w", 0.0, 1.0, Some(vec![2]))
            .unwrap_err();
        assert!(matches!(err, MdoError::IndexOutOfRange { .. }));
        let err = problem
            .bind_design_var_with("dvs.w", 0.0, 1.0, Some(vec![1, 1]))
            .unwrap_err();
        assert!(matches!(err, MdoError::InvalidDesignVar { .. }));
    }

    #[test]
    fn test_missing_objective() {
        let mut g = Graph::new();
        g.add_component("p", Paraboloid::new()).unwrap();
        let mut problem = Problem::new(g);
        assert!(matches!(problem.evaluate(&[]), Err(MdoError::MissingObjective)));
        // Running without bindings is fine
        problem.run().unwrap();
    }

    #[test]
    fn test_battery_domain_error_propagates() {
        let mut g = Graph::new();
        g.add_component("batt", Battery::new()).unwrap();
        let mut problem = Problem::new(g);
        problem.bind_design_var("batt.P_batt", 0.0, 1e6).unwrap();
        problem.bind_objective("batt.SoC_final", Sense::Maximize).unwrap();

        // 30 Wh at C = 1 allows 30 W
        let point = problem.evaluate(&[20.0]).unwrap();
        assert!(point.objective < 1.0);
        let err = problem.evaluate(&[40.0]).unwrap_err();
        assert!(err.is_domain());
    }
}
