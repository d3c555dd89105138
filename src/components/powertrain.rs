//! Hybrid powertrain sizing components.
//!
//! Power flows motor -> splitter -> (fuel cell, battery) -> total mass. All
//! components are explicit with analytic partials.

use super::{Component, ComponentSpec, Declarations, Derivative, Inputs, Outputs, Partials};
use crate::error::{MdoError, Result};
use crate::model::{InputHandle, OutputHandle};

/// Seconds per hour, for C-rate conversions.
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Slack on the C-rate limit.
const C_RATE_TOLERANCE: f64 = 1e-14;

/// Electric motor: `P_in = P_req_shaft / efficiency`.
#[derive(Debug, Clone)]
pub struct Motor {
    pub efficiency: f64,
    shaft: InputHandle,
    p_in: OutputHandle,
}

impl Motor {
    pub fn new(efficiency: f64) -> Self {
        Self {
            efficiency,
            shaft: InputHandle(0),
            p_in: OutputHandle(0),
        }
    }
}

impl Component for Motor {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(MdoError::invalid_option(
                decl.component(),
                "efficiency",
                "must be in (0, 1]",
            ));
        }
        self.shaft = decl.add_input("P_req_shaft", 0.0, Some("W"))?;
        self.p_in = decl.add_output("P_in", 0.0, Some("W"))?;
        decl.declare_partials(self.p_in, self.shaft, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        outputs.set_scalar(self.p_in, inputs.scalar(self.shaft) / self.efficiency);
        Ok(())
    }

    fn compute_partials(&self, _inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        partials.set_scalar(self.p_in, self.shaft, 1.0 / self.efficiency);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Motor {
            efficiency: self.efficiency,
        })
    }
}

/// Splits a power demand between the fuel cell and the battery.
#[derive(Debug, Clone)]
pub struct PowerSplitter {
    /// Share drawn from the fuel cell
    pub fraction: f64,
    p_out: InputHandle,
    p_fuelcell: OutputHandle,
    p_battery: OutputHandle,
}

impl PowerSplitter {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            p_out: InputHandle(0),
            p_fuelcell: OutputHandle(0),
            p_battery: OutputHandle(1),
        }
    }
}

impl Component for PowerSplitter {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fraction) {
            return Err(MdoError::invalid_option(
                decl.component(),
                "fraction",
                "must be in [0, 1]",
            ));
        }
        self.p_out = decl.add_input("P_out", 0.0, Some("W"))?;
        self.p_fuelcell = decl.add_output("P_fuelcell", 0.0, Some("W"))?;
        self.p_battery = decl.add_output("P_battery", 0.0, Some("W"))?;
        decl.declare_partials(self.p_fuelcell, self.p_out, Derivative::Analytic);
        decl.declare_partials(self.p_battery, self.p_out, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let p = inputs.scalar(self.p_out);
        outputs.set_scalar(self.p_fuelcell, self.fraction * p);
        outputs.set_scalar(self.p_battery, (1.0 - self.fraction) * p);
        Ok(())
    }

    fn compute_partials(&self, _inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        partials.set_scalar(self.p_fuelcell, self.p_out, self.fraction);
        partials.set_scalar(self.p_battery, self.p_out, 1.0 - self.fraction);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::PowerSplitter {
            fraction: self.fraction,
        })
    }
}

/// Fuel cell: passes the requested power through.
#[derive(Debug, Clone)]
pub struct FuelCell {
    p_fc: InputHandle,
    p_fuelcell: OutputHandle,
}

impl FuelCell {
    pub fn new() -> Self {
        Self {
            p_fc: InputHandle(0),
            p_fuelcell: OutputHandle(0),
        }
    }
}

impl Default for FuelCell {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for FuelCell {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.p_fc = decl.add_input("P_fc", 0.0, Some("W"))?;
        self.p_fuelcell = decl.add_output("P_fuelcell", 0.0, Some("W"))?;
        decl.declare_partials(self.p_fuelcell, self.p_fc, Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        outputs.set_scalar(self.p_fuelcell, inputs.scalar(self.p_fc));
        Ok(())
    }

    fn compute_partials(&self, _inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        partials.set_scalar(self.p_fuelcell, self.p_fc, 1.0);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::FuelCell)
    }
}

/// Battery energy balance over one time step.
///
/// - `E_final_batt = E_capacity * SoC_initial - P_batt * time`
/// - `SoC_final = SoC_initial - P_batt * time / E_capacity`
/// - `E_in_battery = E_capacity`
///
/// Drawing more than `E_capacity * SoC_initial * C_rate / 3600` is a domain
/// error.
#[derive(Debug, Clone)]
pub struct Battery {
    p_batt: InputHandle,
    capacity: InputHandle,
    soc_initial: InputHandle,
    c_rate: InputHandle,
    time: InputHandle,
    e_final: OutputHandle,
    soc_final: OutputHandle,
    e_in: OutputHandle,
}

impl Battery {
    pub fn new() -> Self {
        Self {
            p_batt: InputHandle(0),
            capacity: InputHandle(1),
            soc_initial: InputHandle(2),
            c_rate: InputHandle(3),
            time: InputHandle(4),
            e_final: OutputHandle(0),
            soc_final: OutputHandle(1),
            e_in: OutputHandle(2),
        }
    }

    /// Highest power the battery may deliver at the given state.
    pub fn max_power(capacity: f64, soc: f64, c_rate: f64) -> f64 {
        capacity * soc * c_rate / SECONDS_PER_HOUR
    }
}

impl Default for Battery {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Battery {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.p_batt = decl.add_input("P_batt", 0.0, Some("W"))?;
        self.capacity = decl.add_input("E_capacity_batt", 30.0 * SECONDS_PER_HOUR, Some("J"))?;
        self.soc_initial = decl.add_input("SoC_initial", 1.0, None)?;
        self.c_rate = decl.add_input("C_rate_batt", 1.0, None)?;
        self.time = decl.add_input("time", 1.0, Some("s"))?;
        self.e_final = decl.add_output("E_final_batt", 0.0, Some("J"))?;
        self.soc_final = decl.add_output("SoC_final", 0.0, None)?;
        self.e_in = decl.add_output("E_in_battery", 0.0, Some("J"))?;

        // All pairs analytic; pairs left unset are zero
        decl.declare_all_partials(Derivative::Analytic);
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let p = inputs.scalar(self.p_batt);
        let e = inputs.scalar(self.capacity);
        let soc = inputs.scalar(self.soc_initial);
        let c_rate = inputs.scalar(self.c_rate);
        let t = inputs.scalar(self.time);

        let limit = Self::max_power(e, soc, c_rate);
        if p > limit + C_RATE_TOLERANCE {
            return Err(MdoError::domain(
                inputs.component(),
                format!(
                    "battery power {} W exceeds maximum {} W allowed by C-rate",
                    p, limit
                ),
            ));
        }
        if e == 0.0 {
            return Err(MdoError::domain(inputs.component(), "battery capacity is zero"));
        }

        outputs.set_scalar(self.e_final, e * soc - p * t);
        outputs.set_scalar(self.soc_final, soc - p * t / e);
        outputs.set_scalar(self.e_in, e);
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let p = inputs.scalar(self.p_batt);
        let e = inputs.scalar(self.capacity);
        let soc = inputs.scalar(self.soc_initial);
        let t = inputs.scalar(self.time);

        partials.set_scalar(self.e_final, self.p_batt, -t);
        partials.set_scalar(self.e_final, self.capacity, soc);
        partials.set_scalar(self.e_final, self.soc_initial, e);
        partials.set_scalar(self.e_final, self.time, -p);

        partials.set_scalar(self.soc_final, self.p_batt, -t / e);
        partials.set_scalar(self.soc_final, self.capacity, p * t / (e * e));
        partials.set_scalar(self.soc_final, self.soc_initial, 1.0);
        partials.set_scalar(self.soc_final, self.time, -p / e);

        partials.set_scalar(self.e_in, self.capacity, 1.0);
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::Battery)
    }
}

/// Mass of the fuel cell plus the battery.
#[derive(Debug, Clone)]
pub struct TotalMass {
    p_fuelcell: InputHandle,
    e_battery: InputHandle,
    power_density: InputHandle,
    energy_density: InputHandle,
    mass: OutputHandle,
}

impl TotalMass {
    pub fn new() -> Self {
        Self {
            p_fuelcell: InputHandle(0),
            e_battery: InputHandle(1),
            power_density: InputHandle(2),
            energy_density: InputHandle(3),
            mass: OutputHandle(0),
        }
    }
}

impl Default for TotalMass {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for TotalMass {
    fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
        self.p_fuelcell = decl.add_input("P_fuelcell", 0.0, Some("W"))?;
        self.e_battery = decl.add_input("E_battery", 0.0, Some("J"))?;
        self.power_density = decl.add_input("fuelcell_power_density", 1000.0, Some("W/kg"))?;
        self.energy_density =
            decl.add_input("battery_energy_density", 25.0 * SECONDS_PER_HOUR, Some("J/kg"))?;
        self.mass = decl.add_output("mass_total", 0.0, Some("kg"))?;
        for wrt in [
            self.p_fuelcell,
            self.e_battery,
            self.power_density,
            self.energy_density,
        ] {
            decl.declare_partials(self.mass, wrt, Derivative::Analytic);
        }
        Ok(())
    }

    fn compute(&self, inputs: &Inputs, outputs: &mut Outputs) -> Result<()> {
        let mass_fc = inputs.scalar(self.p_fuelcell) / inputs.scalar(self.power_density);
        let mass_batt = inputs.scalar(self.e_battery) / inputs.scalar(self.energy_density);
        outputs.set_scalar(self.mass, mass_fc + mass_batt);
        Ok(())
    }

    fn compute_partials(&self, inputs: &Inputs, _outputs: &Outputs, partials: &mut Partials) -> Result<()> {
        let rho_p = inputs.scalar(self.power_density);
        let rho_e = inputs.scalar(self.energy_density);
        partials.set_scalar(self.mass, self.p_fuelcell, 1.0 / rho_p);
        partials.set_scalar(self.mass, self.e_battery, 1.0 / rho_e);
        partials.set_scalar(
            self.mass,
            self.power_density,
            -inputs.scalar(self.p_fuelcell) / (rho_p * rho_p),
        );
        partials.set_scalar(
            self.mass,
            self.energy_density,
            -inputs.scalar(self.e_battery) / (rho_e * rho_e),
        );
        Ok(())
    }

    fn spec(&self) -> Option<ComponentSpec> {
        Some(ComponentSpec::TotalMass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn battery_inputs(p: f64) -> Inputs {
        Inputs::new("battery", vec![vec![p], vec![30.0 * 3600.0], vec![1.0], vec![1.0], vec![1.0]])
    }

    #[test]
    fn test_splitter_shares() {
        let mut s = PowerSplitter::new(0.7);
        s.setup(&mut Declarations::new("split")).unwrap();
        let inputs = Inputs::new("split", vec![vec![100.0]]);
        let mut outputs = Outputs::new(vec![vec![0.0], vec![0.0]]);
        s.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(s.p_fuelcell), 70.0);
        assert_relative_eq!(outputs.scalar(s.p_battery), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_battery_energy_balance() {
        let mut b = Battery::new();
        b.setup(&mut Declarations::new("battery")).unwrap();
        let mut outputs = Outputs::new(vec![vec![0.0]; 3]);
        b.compute(&battery_inputs(30.0), &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(b.e_final), 108_000.0 - 30.0);
        assert_relative_eq!(outputs.scalar(b.soc_final), 1.0 - 30.0 / 108_000.0);
        assert_relative_eq!(outputs.scalar(b.e_in), 108_000.0);
    }

    #[test]
    fn test_battery_c_rate_limit() {
        let mut b = Battery::new();
        b.setup(&mut Declarations::new("battery")).unwrap();
        let mut outputs = Outputs::new(vec![vec![0.0]; 3]);

        // 30 Wh at 1C allows 30 W
        assert!(b.compute(&battery_inputs(30.0), &mut outputs).is_ok());
        let err = b.compute(&battery_inputs(30.1), &mut outputs).unwrap_err();
        assert!(err.is_domain());
        assert!(err.to_string().contains("battery"));
    }

    #[test]
    fn test_total_mass() {
        let mut m = TotalMass::new();
        m.setup(&mut Declarations::new("mass")).unwrap();
        let inputs = Inputs::new(
            "mass",
            vec![vec![70.0], vec![108_000.0], vec![1000.0], vec![90_000.0]],
        );
        let mut outputs = Outputs::new(vec![vec![0.0]]);
        m.compute(&inputs, &mut outputs).unwrap();
        assert_relative_eq!(outputs.scalar(m.mass), 0.07 + 1.2, epsilon = 1e-12);
    }

    #[test]
    fn test_motor_rejects_bad_efficiency() {
        let mut motor = Motor::new(1.5);
        assert!(motor.setup(&mut Declarations::new("motor")).is_err());
    }
}
