//! Independent variables and balance equations.

use serde::{Deserialize, Serialize};

use super::{
    Component, ComponentSpec, Declarations, Derivative, Inputs, IntoValue, Outputs, Partials, Residuals,
};
use crate::error::Result;
use crate::model::{InputHandle, Kind, OutputHandle};

fn default_val() -> Vec<f64> {
    vec![1.0]
}

/// An output of an [`IndepVar`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndepOutput {
    pub name: String,
    #[serde(default = "default_val")]
    pub val: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl IndepOutput {
    pub fn new(name: &str, val: impl IntoValue) -> Self {
        Self {
            name: name.to_string(),
            val: val.into_value(),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

/// Component with outputs only. Its outputs hold externally set values
/// (design variables, fixed parameters) and are never recomputed.
#[derive(Debug, Clone, Default)]
pub struct IndepVar {
    outputs: Vec<IndepOutput>,
}

impl IndepVar {
    pub fn new(outputs: Vec<IndepOutput>) -> Self {
        Self { outputs }
    }

    /// Add an output; builder style.
    pub fn with_output(mut self, name: &str, val: impl IntoValue, unit: Option<&str>) -> Self {
        let mut out = IndepOutput::new(name, val);
        out.unit = unit.map(str::to_string);
        self.outputs.push(out);
        self
    }
}

impl Component for IndepVar {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        for out in &self.outputs {
            decl.add_output(&out.name, out.val.clone(), out.unit.as_deref())?;
        }
        Ok(())
    }

    /// Outputs hold whatever was last set.
    fn compute(&self, _inputs: &Inputs, _outputs: &mut Outputs) -> Result<()> {
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::IndepVar {
            outputs: self.outputs.clone(),
        })
    }
}

/// An output of a [`Balance`]: the unknown plus its `lhs:`/`rhs:` inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceOutput {
    pub name: String,
    #[serde(default = "default_val")]
    pub val: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Unit of the `lhs:`/`rhs:` inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_units: Option<String>,
}

impl BalanceOutput {
    pub fn new(name: &str, val: impl IntoValue) -> Self {
        Self {
            name: name.to_string(),
            val: val.into_value(),
            unit: None,
            eq_units: None,
        }
    }

    pub fn with_units(mut self, unit: Option<&str>, eq_units: Option<&str>) -> Self {
        self.unit = unit.map(str::to_string);
        self.eq_units = eq_units.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct BalanceSlot {
    output: OutputHandle,
    lhs: InputHandle,
    rhs: InputHandle,
}

/// Implicit component enforcing `lhs:<name> = rhs:<name>` by varying `<name>`.
///
/// The residual `lhs - rhs` does not depend on the output itself; the
/// enclosing group supplies the coupling.
#[derive(Debug, Clone, Default)]
pub struct Balance {
    outputs: Vec<BalanceOutput>,
    slots: Vec<BalanceSlot>,
}

impl Balance {
    pub fn new(outputs: Vec<BalanceOutput>) -> Self {
        Self {
            outputs,
            slots: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: BalanceOutput) -> Self {
        self.outputs.push(output);
        self
    }
}

impl Component for Balance {
    fn kind(&self) -> Kind {
        Kind::Implicit
    }

    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.slots.clear();
        for out in &self.outputs {
            let output = decl.add_output(&out.name, out.val.clone(), out.unit.as_deref())?;
            let zeros = vec![0.0; out.val.len()];
            let lhs = decl.add_input(&format!("lhs:{}", out.name), zeros.clone(), out.eq_units.as_deref())?;
            let rhs = decl.add_input(&format!("rhs:{}", out.name), zeros, out.eq_units.as_deref())?;
            decl.declare_partials(output, lhs, Derivative::Analytic);
            decl.declare_partials(output, rhs, Derivative::Analytic);
            decl.declare_partials(output, output, Derivative::Analytic);
            self.slots.push(BalanceSlot { output, lhs, rhs });
        }
        Ok(())
    }

    fn apply_residual(&self, inputs: &Inputs, _outputs: &Outputs, residuals: &mut Residuals) -> Result<()> {
        for slot in &self.slots {
            let lhs = inputs.get(slot.lhs);
            let rhs = inputs.get(slot.rhs);
            for ((r, l), rh) in residuals.get_mut(slot.output).iter_mut().zip(lhs).zip(rhs) {
                *r = l - rh;
            }
        }
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        for slot in &self.slots {
            let n = inputs.get(slot.lhs).len();
            let mut eye = vec![0.0; n * n];
            for i in 0..n {
                eye[i * n + i] = 1.0;
            }
            partials.set(slot.output, slot.lhs, &eye);
            let neg: Vec<f64> = eye.iter().map(|v| -v).collect();
            partials.set(slot.output, slot.rhs, &neg);
        }
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Balance {
            outputs: self.outputs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indep_var_declares_outputs_only() {
        let mut ivc = IndepVar::default()
            .with_output("x", 1.0, None)
            .with_output("z", vec![5.0, 2.0], None);
        let mut decl = Declarations::new("dvs");
        ivc.setup(&mut decl).unwrap();
        assert!(decl.inputs().is_empty());
        assert_eq!(decl.outputs().len(), 2);
        assert_eq!(decl.outputs()[1].default, vec![5.0, 2.0]);
    }

    #[test]
    fn test_indep_var_compute_keeps_values() {
        let ivc = IndepVar::default().with_output("x", 3.0, None);
        let inputs = Inputs::new("dvs", Vec::new());
        let mut outputs = Outputs::new(vec![vec![7.5]]);
        ivc.compute(&inputs, &mut outputs).unwrap();
        assert_eq!(outputs.values()[0], vec![7.5]);
    }

    #[test]
    fn test_balance_residual() {
        let mut bal = Balance::default().with_output(BalanceOutput::new("x", vec![1.0, 1.0]));
        let mut decl = Declarations::new("bal");
        bal.setup(&mut decl).unwrap();
        assert_eq!(decl.inputs()[0].name, "lhs:x");
        assert_eq!(decl.inputs()[1].name, "rhs:x");

        let inputs = Inputs::new("bal", vec![vec![3.0, 1.0], vec![1.0, 1.0]]);
        let outputs = Outputs::new(vec![vec![1.0, 1.0]]);
        let mut residuals = Residuals::zeros_like(&outputs);
        bal.apply_residual(&inputs, &outputs, &mut residuals).unwrap();
        assert_eq!(residuals.get(OutputHandle(0)), &[2.0, 0.0]);
    }
}
