//! Serializable model descriptions.
//!
//! A [`ModelSpec`] carries everything needed to rebuild a [`Problem`]:
//! components, connections, groups, solver settings, bindings and every
//! value (independent or starting guess) that differs from its default.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ConstraintBounds, Problem, Sense};
use crate::components::ComponentSpec;
use crate::error::{MdoError, Result};
use crate::model::{ConnectOptions, Direction, Graph};
use crate::solver::SolverConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    pub spec: ComponentSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDef {
    /// Output path
    pub source: String,
    /// Input path
    pub target: String,
    #[serde(flatten)]
    pub options: ConnectOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

/// Design variable binding; missing bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignVarDef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    /// Exposed entries of a vector variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveDef {
    pub path: String,
    #[serde(default)]
    pub sense: Sense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<f64>,
    /// Constrained entries of a vector variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

/// Full description of a model and its optimization bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub components: Vec<ComponentDef>,
    pub connections: Vec<ConnectionDef>,
    pub groups: Vec<GroupSpec>,
    /// Solver for coupled units without their own settings
    pub solver: SolverConfig,
    pub design_vars: Vec<DesignVarDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<ObjectiveDef>,
    pub constraints: Vec<ConstraintDef>,
    /// Initial values by path
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, Vec<f64>>,
}

impl ModelSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON model description from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| MdoError::FileReadError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

impl Problem {
    /// Build a problem from its description.
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let mut graph = Graph::new();
        for def in &spec.components {
            graph.add_boxed(&def.name, def.spec.build()?)?;
        }
        for conn in &spec.connections {
            graph.connect_with(&conn.source, &conn.target, conn.options.clone())?;
        }
        for group in &spec.groups {
            let members: Vec<&str> = group.members.iter().map(String::as_str).collect();
            graph.add_group(&group.name, &members, group.solver.clone())?;
        }
        for (path, value) in &spec.values {
            graph.set(path, value)?;
        }

        let mut problem = Problem::new(graph).with_solver(spec.solver.clone())?;
        for dv in &spec.design_vars {
            problem.bind_design_var_with(
                &dv.path,
                dv.lower.unwrap_or(f64::NEG_INFINITY),
                dv.upper.unwrap_or(f64::INFINITY),
                dv.indices.clone(),
            )?;
        }
        if let Some(objective) = &spec.objective {
            problem.bind_objective(&objective.path, objective.sense)?;
        }
        for c in &spec.constraints {
            let bounds = ConstraintBounds::from_parts(&c.path, c.lower, c.upper, c.equals)?;
            problem.bind_constraint_with(&c.path, bounds, c.indices.clone())?;
        }
        Ok(problem)
    }

    /// Describe the problem.
    ///
    /// Fails with [`MdoError::NotSerializable`] if a component has no
    /// description. Values are recorded for every output and unconnected
    /// input that differs from its default, so coupled groups restart from
    /// the same guesses.
    pub fn to_spec(&self) -> Result<ModelSpec> {
        let graph = self.graph();

        let mut components = Vec::with_capacity(graph.components().len());
        for entry in graph.components() {
            let spec = entry.component().spec().ok_or_else(|| MdoError::NotSerializable {
                name: entry.name.clone(),
            })?;
            components.push(ComponentDef {
                name: entry.name.clone(),
                spec,
            });
        }

        let connections = graph
            .connections()
            .iter()
            .map(|c| ConnectionDef {
                source: self.var_path(c.source).to_string(),
                target: self.var_path(c.target).to_string(),
                options: c.options(),
            })
            .collect();

        let groups = graph
            .groups()
            .iter()
            .map(|g| GroupSpec {
                name: g.name.clone(),
                members: g.members.iter().map(|&id| graph.component(id).name.clone()).collect(),
                solver: g.solver.clone(),
            })
            .collect();

        // Connected inputs are overwritten on every transfer; everything else
        // is either an independent value or a starting guess.
        let values = graph
            .registry()
            .iter()
            .filter(|(id, var)| {
                let connected = var.direction == Direction::Input && graph.source_of(*id).is_some();
                !connected && var.value != var.default
            })
            .map(|(_, var)| (var.path.clone(), var.value.clone()))
            .collect();

        let design_vars = self
            .design_vars()
            .iter()
            .map(|d| DesignVarDef {
                path: d.path.clone(),
                lower: Some(d.lower).filter(|v| v.is_finite()),
                upper: Some(d.upper).filter(|v| v.is_finite()),
                indices: d.indices.clone(),
            })
            .collect();

        let constraints = self
            .constraints()
            .iter()
            .map(|c| {
                let (lower, upper, equals) = c.bounds.parts();
                ConstraintDef {
                    path: c.path.clone(),
                    lower,
                    upper,
                    equals,
                    indices: c.indices.clone(),
                }
            })
            .collect();

        Ok(ModelSpec {
            components,
            connections,
            groups,
            solver: self.solver().clone(),
            design_vars,
            objective: self.objective().map(|o| ObjectiveDef {
                path: o.path.clone(),
                sense: o.sense,
            }),
            constraints,
            values,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_spec(&ModelSpec::from_json(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        self.to_spec()?.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, Declarations, ExecComp};
    use approx::assert_relative_eq;

    const SELLAR: &str = r#"{
        "components": [
            {"name": "dvs", "spec": {"type": "indep_var", "outputs": [
                {"name": "x", "val": [1.0]},
                {"name": "z", "val": [5.0, 2.0]}
            ]}},
            {"name": "d1", "spec": {"type": "sellar_dis1"}},
            {"name": "d2", "spec": {"type": "sellar_dis2"}},
            {"name": "obj_cmp", "spec": {"type": "exec",
                "exprs": ["obj = x**2 + z[1] + y1 + exp(-y2)"],
                "shapes": {"z": 2}}},
            {"name": "cons", "spec": {"type": "exec",
                "exprs": ["con1 = 3.16 - y1", "con2 = y2 - 24.0"]}}
        ],
        "connections": [
            {"source": "dvs.x", "target": "d1.x"},
            {"source": "dvs.z", "target": "d1.z"},
            {"source": "dvs.z", "target": "d2.z"},
            {"source": "d1.y1", "target": "d2.y1"},
            {"source": "d2.y2", "target": "d1.y2"},
            {"source": "dvs.x", "target": "obj_cmp.x"},
            {"source": "dvs.z", "target": "obj_cmp.z"},
            {"source": "d1.y1", "target": "obj_cmp.y1"},
            {"source": "d2.y2", "target": "obj_cmp.y2"},
            {"source": "d1.y1", "target": "cons.y1"},
            {"source": "d2.y2", "target": "cons.y2"}
        ],
        "groups": [{"name": "cycle", "members": ["d1", "d2"], "solver": {"strategy": "newton"}}],
        "design_vars": [
            {"path": "dvs.x", "lower": 0.0, "upper": 10.0},
            {"path": "dvs.z", "lower": -10.0, "upper": 10.0}
        ],
        "objective": {"path": "obj_cmp.obj"},
        "constraints": [
            {"path": "cons.con1", "upper": 0.0},
            {"path": "cons.con2", "upper": 0.0}
        ]
    }"#;

    #[derive(Debug)]
    struct Opaque;

    impl Component for Opaque {
        fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
            decl.add_output("y", 1.0, None)?;
            Ok(())
        }
    }

    #[test]
    fn test_load_sellar() {
        let mut problem = Problem::from_json(SELLAR).unwrap();
        assert_eq!(problem.design_size(), 3);
        assert_eq!(problem.constraints().len(), 2);
        assert_eq!(problem.objective().unwrap().sense, Sense::Minimize);

        problem.run().unwrap();
        assert_relative_eq!(problem.graph().get_scalar("d1.y1").unwrap(), 25.58830237, epsilon = 1e-6);
        assert_relative_eq!(problem.graph().get_scalar("d2.y2").unwrap(), 12.05848815, epsilon = 1e-6);
    }

    #[test]
    fn test_json_round_trip_converges_to_same_values() {
        let mut original = Problem::from_json(SELLAR).unwrap();
        original.graph_mut().set("dvs.z", &[4.0, 1.0]).unwrap();
        let first = original.evaluate(&original.design_vector()).unwrap();

        let json = original.to_json().unwrap();
        let spec = ModelSpec::from_json(&json).unwrap();
        assert_eq!(spec.values.get("dvs.z"), Some(&vec![4.0, 1.0]));
        assert!(spec.values.contains_key("d1.y1"));
        assert!(!spec.values.contains_key("d2.y1"));
        assert_eq!(spec.groups[0].members, vec!["d1", "d2"]);

        let mut rebuilt = Problem::from_spec(&spec).unwrap();
        assert_eq!(rebuilt.design_vector(), vec![1.0, 4.0, 1.0]);
        let second = rebuilt.evaluate(&rebuilt.design_vector()).unwrap();
        assert!(second.converged());
        assert_relative_eq!(first.objective, second.objective, epsilon = 1e-9);
        for (a, b) in first.constraints.iter().zip(&second.constraints) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    /// `x = 3y` then `y = x**2`, started at `x = 1`, `y = 0`.
    fn cycle_from_guess() -> Problem {
        let mut g = Graph::new();
        g.add_component("lin", ExecComp::new(&["x = 3 * y"]).unwrap()).unwrap();
        g.add_component("sq", ExecComp::new(&["y = x**2"]).unwrap()).unwrap();
        g.connect("lin.x", "sq.x").unwrap();
        g.connect("sq.y", "lin.y").unwrap();
        g.set_scalar("lin.x", 1.0).unwrap();
        g.set_scalar("sq.y", 0.0).unwrap();
        Problem::new(g).with_solver(SolverConfig::gauss_seidel()).unwrap()
    }

    #[test]
    fn test_round_trip_keeps_starting_guesses() {
        let mut original = cycle_from_guess();
        let spec = original.to_spec().unwrap();
        assert_eq!(spec.values.get("sq.y"), Some(&vec![0.0]));
        // lin.x defaults to 1.0 already
        assert!(!spec.values.contains_key("lin.x"));
        assert!(!spec.values.contains_key("sq.x"));

        let mut rebuilt = Problem::from_json(&spec.to_json().unwrap()).unwrap();
        let first = original.run().unwrap();
        let second = rebuilt.run().unwrap();

        assert!(first.converged());
        assert_eq!(first.groups[0].status, second.groups[0].status);
        assert_eq!(first.groups[0].iterations, second.groups[0].iterations);
        for path in ["lin.x", "sq.y"] {
            assert_eq!(
                original.graph().get_scalar(path).unwrap(),
                rebuilt.graph().get_scalar(path).unwrap()
            );
        }
    }

    #[test]
    fn test_indices_round_trip() {
        let json = r#"{
            "components": [
                {"name": "dvs", "spec": {"type": "indep_var", "outputs": [{"name": "z", "val": [1.0, 2.0, 3.0]}]}},
                {"name": "theta_con", "spec": {"type": "exec", "exprs": ["g = 2.0 * z"], "shapes": {"z": 3}}}
            ],
            "connections": [{"source": "dvs.z", "target": "theta_con.z"}],
            "design_vars": [{"path": "dvs.z", "lower": 0.0, "indices": [1]}],
            "constraints": [{"path": "theta_con.g", "equals": 0.0, "indices": [0, 2]}]
        }"#;
        let problem = Problem::from_json(json).unwrap();
        assert_eq!(problem.design_vector(), vec![2.0]);
        assert_eq!(problem.constraints()[0].indices, Some(vec![0, 2]));

        let spec = problem.to_spec().unwrap();
        assert_eq!(spec.design_vars[0].indices, Some(vec![1]));
        assert_eq!(spec.constraints[0].indices, Some(vec![0, 2]));

        let bad = json.replace("\"indices\": [0, 2]", "\"indices\": [0, 5]");
        let err = Problem::from_json(&bad).unwrap_err();
        assert!(matches!(err, MdoError::IndexOutOfRange { index: 5, .. }));
    }

    #[test]
    fn test_unbounded_design_var() {
        let json = r#"{
            "components": [{"name": "p", "spec": {"type": "paraboloid"}}],
            "design_vars": [{"path": "p.x"}]
        }"#;
        let problem = Problem::from_json(json).unwrap();
        assert_eq!(problem.design_bounds(), vec![(f64::NEG_INFINITY, f64::INFINITY)]);
        let spec = problem.to_spec().unwrap();
        assert_eq!(spec.design_vars[0].lower, None);
        assert_eq!(spec.design_vars[0].upper, None);
    }

    #[test]
    fn test_malformed_constraint_rejected() {
        let json = r#"{
            "components": [{"name": "p", "spec": {"type": "paraboloid"}}],
            "constraints": [{"path": "p.f_xy", "upper": 1.0, "equals": 0.0}]
        }"#;
        let err = Problem::from_json(json).unwrap_err();
        assert!(matches!(err, MdoError::MalformedBounds { .. }));
    }

    #[test]
    fn test_unknown_component_type() {
        let json = r#"{"components": [{"name": "p", "spec": {"type": "warp_drive"}}]}"#;
        let err = Problem::from_json(json).unwrap_err();
        assert!(matches!(err, MdoError::Serialization(_)));
    }

    #[test]
    fn test_custom_component_not_serializable() {
        let mut g = Graph::new();
        g.add_component("opaque", Opaque).unwrap();
        let problem = Problem::new(g);
        match problem.to_spec().unwrap_err() {
            MdoError::NotSerializable { name } => assert_eq!(name, "opaque"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = ModelSpec::load("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, MdoError::FileReadError { .. }));
    }
}
