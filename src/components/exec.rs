//! Components defined by expression strings.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{Component, ComponentSpec, Declarations, Derivative, Inputs, Outputs};
use crate::error::{MdoError, Result};
use crate::expr::{parse_statement, Scope, Statement};
use crate::model::{InputHandle, OutputHandle};
use crate::solver::{FdConfig, FdScheme};

/// Serializable description of an [`ExecComp`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecSpec {
    /// One `output = expression` per entry
    pub exprs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shapes: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, Vec<f64>>,
}

/// Explicit component whose outputs are given by expressions.
///
/// Names on the left of `=` become outputs; every other name becomes an
/// input, in order of first appearance. Unless set otherwise, variables are
/// scalars defaulting to `1.0`. Partials are taken by central differences.
#[derive(Debug, Clone)]
pub struct ExecComp {
    spec: ExecSpec,
    statements: Vec<Statement>,
    input_names: Vec<String>,
    inputs: Vec<InputHandle>,
    outputs: Vec<OutputHandle>,
}

struct ExecScope<'a> {
    names: &'a [String],
    handles: &'a [InputHandle],
    inputs: &'a Inputs,
}

impl Scope for ExecScope<'_> {
    fn lookup(&self, name: &str) -> Option<&[f64]> {
        let pos = self.names.iter().position(|n| n == name)?;
        Some(self.inputs.get(self.handles[pos]))
    }
}

impl ExecComp {
    /// Parse one or more `output = expression` lines.
    pub fn new(exprs: &[&str]) -> Result<Self> {
        Self::from_spec(ExecSpec {
            exprs: exprs.iter().map(|s| s.to_string()).collect(),
            ..ExecSpec::default()
        })
    }

    pub fn from_spec(spec: ExecSpec) -> Result<Self> {
        let statements = spec
            .exprs
            .iter()
            .map(|s| parse_statement(s))
            .collect::<Result<Vec<_>>>()?;

        let mut targets: Vec<&str> = Vec::new();
        for stmt in &statements {
            if targets.contains(&stmt.target.as_str()) {
                return Err(MdoError::ExprError {
                    expr: stmt.source.clone(),
                    message: format!("output '{}' assigned twice", stmt.target),
                });
            }
            targets.push(&stmt.target);
        }

        let mut input_names = Vec::new();
        for stmt in &statements {
            let mut names = Vec::new();
            stmt.expr.variables(&mut names);
            if let Some(name) = names.iter().find(|n| targets.contains(&n.as_str())) {
                return Err(MdoError::ExprError {
                    expr: stmt.source.clone(),
                    message: format!("output '{}' cannot be read by an expression", name),
                });
            }
            for name in names {
                if !input_names.contains(&name) {
                    input_names.push(name);
                }
            }
        }

        Ok(Self {
            spec,
            statements,
            input_names,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
    }

    /// Set the default value (and therefore the shape) of a variable.
    pub fn with_default(mut self, name: &str, value: impl Into<Vec<f64>>) -> Self {
        self.spec.defaults.insert(name.to_string(), value.into());
        self
    }

    /// Set the unit of a variable.
    pub fn with_unit(mut self, name: &str, unit: &str) -> Self {
        self.spec.units.insert(name.to_string(), unit.to_string());
        self
    }

    /// Set the length of a variable whose default is not given.
    pub fn with_shape(mut self, name: &str, len: usize) -> Self {
        self.spec.shapes.insert(name.to_string(), len);
        self
    }

    /// Input names in declaration order.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn declared_len(&self, name: &str) -> Result<Option<usize>> {
        let from_default = self.spec.defaults.get(name).map(Vec::len);
        let from_shape = self.spec.shapes.get(name).copied();
        match (from_default, from_shape) {
            (Some(d), Some(s)) if d != s => Err(MdoError::ShapeMismatch {
                path: name.to_string(),
                expected: s,
                actual: d,
            }),
            (d, s) => Ok(d.or(s)),
        }
    }

    fn default_for(&self, name: &str, len: usize) -> Vec<f64> {
        self.spec
            .defaults
            .get(name)
            .cloned()
            .unwrap_or_else(|| vec![1.0; len])
    }
}

impl Component for ExecComp {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        let mut shapes = HashMap::new();
        let mut inputs = Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let len = self.declared_len(name)?.unwrap_or(1);
            shapes.insert(name.clone(), len);
            let unit = self.spec.units.get(name).map(String::as_str);
            inputs.push(decl.add_input(name, self.default_for(name, len), unit)?);
        }

        let mut outputs = Vec::with_capacity(self.statements.len());
        for stmt in &self.statements {
            let inferred = stmt.expr.shape(&shapes).map_err(|message| MdoError::ExprError {
                expr: stmt.source.clone(),
                message,
            })?;
            let len = match self.declared_len(&stmt.target)? {
                Some(len) if len != inferred && inferred != 1 => {
                    return Err(MdoError::ShapeMismatch {
                        path: format!("{}.{}", decl.component(), stmt.target),
                        expected: len,
                        actual: inferred,
                    });
                }
                Some(len) => len,
                None => inferred,
            };
            let unit = self.spec.units.get(&stmt.target).map(String::as_str);
            outputs.push(decl.add_output(&stmt.target, self.default_for(&stmt.target, len), unit)?);
        }

        self.inputs = inputs;
        self.outputs = outputs;
        decl.declare_all_partials(Derivative::FiniteDifference(FdConfig {
            scheme: FdScheme::Central,
            ..FdConfig::default()
        }));
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let scope = ExecScope {
            names: &self.input_names,
            handles: &self.inputs,
            inputs,
        };
        for (stmt, &out) in self.statements.iter().zip(&self.outputs) {
            let value = stmt.expr.eval(&scope)?;
            let target = outputs.get_mut(out);
            if value.len() == target.len() {
                target.copy_from_slice(&value);
            } else if value.len() == 1 {
                target.fill(value[0]);
            } else {
                return Err(MdoError::ShapeMismatch {
                    path: format!("{}.{}", inputs.component(), stmt.target),
                    expected: target.len(),
                    actual: value.len(),
                });
            }
        }
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Exec(self.spec.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_in_first_appearance_order() {
        let comp = ExecComp::new(&["obj = x**2 + z[1] + y1 + exp(-y2)"]).unwrap();
        assert_eq!(comp.input_names(), &["x", "z", "y1", "y2"]);
    }

    #[test]
    fn test_setup_uses_defaults_for_shape() {
        let mut comp = ExecComp::new(&["obj = x**2 + z[1]"])
            .unwrap()
            .with_default("z", vec![0.0, 0.0]);
        let mut decl = Declarations::new("obj_cmp");
        comp.setup(&mut decl).unwrap();
        assert_eq!(decl.inputs()[0].default, vec![1.0]);
        assert_eq!(decl.inputs()[1].default, vec![0.0, 0.0]);
        assert_eq!(decl.outputs()[0].default, vec![1.0]);
    }

    #[test]
    fn test_index_out_of_range_at_setup() {
        let mut comp = ExecComp::new(&["y = z[2]"]).unwrap().with_shape("z", 2);
        let err = comp.setup(&mut Declarations::new("c")).unwrap_err();
        assert!(matches!(err, MdoError::ExprError { .. }));
    }

    #[test]
    fn test_compute_two_statements() {
        let mut comp = ExecComp::new(&["con1 = 3.16 - y1", "con2 = y2 - 24.0"]).unwrap();
        comp.setup(&mut Declarations::new("cons")).unwrap();
        let inputs = Inputs::new("cons", vec![vec![3.0], vec![25.0]]);
        let mut outputs = Outputs::new(vec![vec![0.0], vec![0.0]]);
        comp.compute(&inputs, &mut outputs).unwrap();
        assert!((outputs.values()[0][0] - 0.16).abs() < 1e-12);
        assert_eq!(outputs.values()[1][0], 1.0);
    }

    #[test]
    fn test_output_cannot_feed_expression() {
        let err = ExecComp::new(&["a = b + 1", "b = a * 2"]).unwrap_err();
        assert!(matches!(err, MdoError::ExprError { .. }));
    }
}
