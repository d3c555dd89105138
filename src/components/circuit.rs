//! Circuit components: Resistor and Node.
//!
//! Currents are outputs of the branch components; node voltages are outputs
//! of implicit [`Node`] components whose residual is Kirchhoff's current law.

use super::{ComponentSpec, Declarations, Derivative, Inputs, Outputs, Partials, Residuals};
use crate::components::Component;
use crate::error::{MdoError, Result};
use crate::model::{InputHandle, Kind, OutputHandle};

/// Ohm's law: `I = (V_in - V_out) / R`.
#[derive(Debug, Clone)]
pub struct Resistor {
    /// Resistance in ohms
    pub resistance: f64,
    v_in: InputHandle,
    v_out: InputHandle,
    current: OutputHandle,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            v_in: InputHandle(0),
            v_out: InputHandle(1),
            current: OutputHandle(0),
        }
    }

    /// Conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Component for Resistor {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        if !(self.resistance.is_finite() && self.resistance != 0.0) {
            return Err(MdoError::invalid_option(
                decl.component(),
                "R",
                "resistance must be finite and non-zero",
            ));
        }
        self.v_in = decl.add_input("V_in", 0.0, Some("V"))?;
        self.v_out = decl.add_input("V_out", 0.0, Some("V"))?;
        self.current = decl.add_output("I", 0.0, Some("A"))?;
        decl.declare_partials(self.current, self.v_in, Derivative::Analytic);
        decl.declare_partials(self.current, self.v_out, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let delta_v = inputs.scalar(self.v_in) - inputs.scalar(self.v_out);
        outputs.set_scalar(self.current, delta_v / self.resistance);
        Ok(())
    }

    fn compute_partials(&self, _inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let g = self.conductance();
        partials.set_scalar(self.current, self.v_in, g);
        partials.set_scalar(self.current, self.v_out, -g);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Resistor { r: self.resistance })
    }
}

/// Circuit node: solves for the voltage `V` that balances the currents.
///
/// Residual: `R(V) = sum(I_in:i) - sum(I_out:j)`. The residual does not depend
/// on `V` directly; the coupling comes through the branch components that read
/// the node voltage.
#[derive(Debug, Clone)]
pub struct Node {
    pub n_in: usize,
    pub n_out: usize,
    voltage: OutputHandle,
    currents_in: Vec<InputHandle>,
    currents_out: Vec<InputHandle>,
}

impl Node {
    /// Create a node with the given number of incoming and outgoing currents.
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_out,
            voltage: OutputHandle(0),
            currents_in: Vec::new(),
            currents_out: Vec::new(),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Component for Node {
    fn kind(&self) -> Kind {
        Kind::Implicit
    }

    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.voltage = decl.add_output("V", 5.0, Some("V"))?;

        self.currents_in = (0..self.n_in)
            .map(|i| decl.add_input(&format!("I_in:{}", i), 0.0, Some("A")))
            .collect::<Result<_>>()?;
        self.currents_out = (0..self.n_out)
            .map(|i| decl.add_input(&format!("I_out:{}", i), 0.0, Some("A")))
            .collect::<Result<_>>()?;

        for &h in self.currents_in.iter().chain(self.currents_out.iter()) {
            decl.declare_partials(self.voltage, h, Derivative::Analytic);
        }
        decl.declare_partials(self.voltage, self.voltage, Derivative::Analytic);
        Ok(())
    }

    fn apply_residual(&self, inputs: &Inputs, _outputs: &Outputs, residuals: &mut Residuals) -> Result<()> {
        let incoming: f64 = self.currents_in.iter().map(|&h| inputs.scalar(h)).sum();
        let outgoing: f64 = self.currents_out.iter().map(|&h| inputs.scalar(h)).sum();
        residuals.set_scalar(self.voltage, incoming - outgoing);
        Ok(())
    }

    fn compute_partials(&self, _inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        for &h in &self.currents_in {
            partials.set_scalar(self.voltage, h, 1.0);
        }
        for &h in &self.currents_out {
            partials.set_scalar(self.voltage, h, -1.0);
        }
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Node {
            n_in: self.n_in,
            n_out: self.n_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resistor_ohms_law() {
        let mut r = Resistor::new(100.0);
        let mut decl = Declarations::new("R1");
        r.setup(&mut decl).unwrap();

        let inputs = Inputs::new("R1", vec![vec![10.0], vec![0.0]]);
        let mut outputs = Outputs::new(vec![vec![0.0]]);
        r.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(r.current), 0.1);
    }

    #[test]
    fn test_resistor_compute_is_idempotent() {
        let mut r = Resistor::new(10_000.0);
        let mut decl = Declarations::new("R2");
        r.setup(&mut decl).unwrap();

        let inputs = Inputs::new("R2", vec![vec![9.9], vec![0.7]]);
        let mut first = Outputs::new(vec![vec![0.0]]);
        let mut second = Outputs::new(vec![vec![123.0]]);
        r.compute(&inputs, &mut first).unwrap();
        r.compute(&inputs, &mut second).unwrap();
        assert_eq!(first.get(r.current), second.get(r.current));
    }

    #[test]
    fn test_zero_resistance_rejected() {
        let mut r = Resistor::new(0.0);
        let mut decl = Declarations::new("R0");
        assert!(matches!(
            r.setup(&mut decl),
            Err(MdoError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_node_kcl_residual() {
        let mut n = Node::new(1, 2);
        let mut decl = Declarations::new("n1");
        n.setup(&mut decl).unwrap();
        assert_eq!(decl.inputs().len(), 3);
        assert_eq!(decl.inputs()[2].name, "I_out:1");

        let inputs = Inputs::new("n1", vec![vec![0.1], vec![0.07], vec![0.02]]);
        let outputs = Outputs::new(vec![vec![5.0]]);
        let mut residuals = Residuals::zeros_like(&outputs);
        n.apply_residual(&inputs, &outputs, &mut residuals).unwrap();
        assert_relative_eq!(residuals.get(n.voltage)[0], 0.01, epsilon = 1e-15);
    }
}
