//! Analytic test problems: the Sellar disciplines and the paraboloid.

use super::{Component, ComponentSpec, Declarations, Derivative, Inputs, Outputs, Partials};
use crate::error::Result;
use crate::model::{InputHandle, OutputHandle};
use crate::solver::FdConfig;

/// Sellar discipline 1: `y1 = z1^2 + z2 + x - 0.2 * y2`.
#[derive(Debug, Clone)]
pub struct SellarDis1 {
    z: InputHandle,
    x: InputHandle,
    y2: InputHandle,
    y1: OutputHandle,
}

impl SellarDis1 {
    pub fn new() -> Self {
        Self {
            z: InputHandle(0),
            x: InputHandle(1),
            y2: InputHandle(2),
            y1: OutputHandle(0),
        }
    }
}

impl Default for SellarDis1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for SellarDis1 {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.z = decl.add_input("z", [0.0, 0.0], None)?;
        self.x = decl.add_input("x", 0.0, None)?;
        self.y2 = decl.add_input("y2", 1.0, None)?;
        self.y1 = decl.add_output("y1", 1.0, None)?;
        decl.declare_partials(self.y1, self.z, Derivative::Analytic);
        decl.declare_partials(self.y1, self.x, Derivative::Analytic);
        decl.declare_partials(self.y1, self.y2, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let z = inputs.get(self.z);
        let y1 = z[0] * z[0] + z[1] + inputs.scalar(self.x) - 0.2 * inputs.scalar(self.y2);
        outputs.set_scalar(self.y1, y1);
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let z = inputs.get(self.z);
        partials.set(self.y1, self.z, &[2.0 * z[0], 1.0]);
        partials.set_scalar(self.y1, self.x, 1.0);
        partials.set_scalar(self.y1, self.y2, -0.2);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::SellarDis1)
    }
}

/// Sellar discipline 2: `y2 = sqrt(|y1|) + z1 + z2`.
#[derive(Debug, Clone)]
pub struct SellarDis2 {
    z: InputHandle,
    y1: InputHandle,
    y2: OutputHandle,
}

impl SellarDis2 {
    pub fn new() -> Self {
        Self {
            z: InputHandle(0),
            y1: InputHandle(1),
            y2: OutputHandle(0),
        }
    }
}

impl Default for SellarDis2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for SellarDis2 {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.z = decl.add_input("z", [0.0, 0.0], None)?;
        self.y1 = decl.add_input("y1", 1.0, None)?;
        self.y2 = decl.add_output("y2", 1.0, None)?;
        decl.declare_partials(self.y2, self.z, Derivative::Analytic);
        decl.declare_partials(self.y2, self.y1, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let z = inputs.get(self.z);
        let y2 = inputs.scalar(self.y1).abs().sqrt() + z[0] + z[1];
        outputs.set_scalar(self.y2, y2);
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let y1 = inputs.scalar(self.y1);
        partials.set(self.y2, self.z, &[1.0, 1.0]);
        // d sqrt(|y1|) / dy1, zero at the kink
        let d = if y1 == 0.0 {
            0.0
        } else {
            y1.signum() * 0.5 / y1.abs().sqrt()
        };
        partials.set_scalar(self.y2, self.y1, d);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::SellarDis2)
    }
}

/// `f_xy = (x - 3)^2 + x*y + (y + 4)^2 - 3`, minimum at `(20/3, -22/3)`.
///
/// Partials come from finite differences.
#[derive(Debug, Clone)]
pub struct Paraboloid {
    x: InputHandle,
    y: InputHandle,
    f_xy: OutputHandle,
}

impl Paraboloid {
    pub fn new() -> Self {
        Self {
            x: InputHandle(0),
            y: InputHandle(1),
            f_xy: OutputHandle(0),
        }
    }
}

impl Default for Paraboloid {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Paraboloid {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.x = decl.add_input("x", 0.0, None)?;
        self.y = decl.add_input("y", 0.0, None)?;
        self.f_xy = decl.add_output("f_xy", 0.0, None)?;
        decl.declare_all_partials(Derivative::FiniteDifference(FdConfig::default()));
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let x = inputs.scalar(self.x);
        let y = inputs.scalar(self.y);
        outputs.set_scalar(self.f_xy, (x - 3.0).powi(2) + x * y + (y + 4.0).powi(2) - 3.0);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Paraboloid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sellar_dis1_value() {
        let mut d1 = SellarDis1::new();
        d1.setup(&mut Declarations::new("d1")).unwrap();
        let inputs = Inputs::new("d1", vec![vec![5.0, 2.0], vec![1.0], vec![10.0]]);
        let mut outputs = Outputs::new(vec![vec![1.0]]);
        d1.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(d1.y1), 25.0 + 2.0 + 1.0 - 2.0);
    }

    #[test]
    fn test_sellar_dis2_handles_negative_coupling() {
        let mut d2 = SellarDis2::new();
        d2.setup(&mut Declarations::new("d2")).unwrap();
        let inputs = Inputs::new("d2", vec![vec![5.0, 2.0], vec![-4.0]]);
        let mut outputs = Outputs::new(vec![vec![1.0]]);
        d2.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(d2.y2), 9.0);
    }

    #[test]
    fn test_paraboloid_minimum() {
        let mut p = Paraboloid::new();
        p.setup(&mut Declarations::new("parab")).unwrap();
        let inputs = Inputs::new("parab", vec![vec![20.0 / 3.0], vec![-22.0 / 3.0]]);
        let mut outputs = Outputs::new(vec![vec![0.0]]);
        p.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(p.f_xy), -27.0 - 1.0 / 3.0, epsilon = 1e-12);
    }
}
