//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp((V_in - V_out) / Vt) - 1)
//!
//! The conductance dI/dV = Is/Vt * exp(V/Vt) is supplied analytically so
//! Newton iterations on circuits see the exact Jacobian.

use super::{ComponentSpec, Declarations, Derivative, Inputs, Outputs, Partials};
use crate::components::Component;
use crate::error::{MdoError, Result};
use crate::model::{InputHandle, OutputHandle};

/// Default saturation current, in A.
pub const DEFAULT_SATURATION_CURRENT: f64 = 1e-15;

/// Default thermal voltage, in V.
pub const DEFAULT_THERMAL_VOLTAGE: f64 = 0.025875;

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    /// Saturation current (Is)
    pub is: f64,
    /// Thermal voltage (Vt)
    pub vt: f64,
    v_in: InputHandle,
    v_out: InputHandle,
    current: OutputHandle,
}

impl Default for Diode {
    fn default() -> Self {
        Self::new(DEFAULT_SATURATION_CURRENT, DEFAULT_THERMAL_VOLTAGE)
    }
}

impl Diode {
    /// Create a new diode.
    pub fn new(is: f64, vt: f64) -> Self {
        Self {
            is,
            vt,
            v_in: InputHandle(0),
            v_out: InputHandle(1),
            current: OutputHandle(0),
        }
    }

    /// Calculate the diode current at a given voltage.
    pub fn current(&self, v: f64) -> f64 {
        self.is * ((v / self.vt).exp() - 1.0)
    }

    /// Calculate the conductance (dI/dV) at a given voltage.
    pub fn conductance(&self, v: f64) -> f64 {
        self.is / self.vt * (v / self.vt).exp()
    }
}

impl Component for Diode {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        if !(self.vt.is_finite() && self.vt > 0.0) {
            return Err(MdoError::invalid_option(
                decl.component(),
                "Vt",
                "thermal voltage must be positive",
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
        let v = inputs.scalar(self.v_in) - inputs.scalar(self.v_out);
        outputs.set_scalar(self.current, self.current(v));
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let v = inputs.scalar(self.v_in) - inputs.scalar(self.v_out);
        let g = self.conductance(v);
        partials.set_scalar(self.current, self.v_in, g);
        partials.set_scalar(self.current, self.v_out, -g);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Diode {
            is: self.is,
            vt: self.vt,
        })
    }
}
