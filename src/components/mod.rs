//! Component contract and component library.
//!
//! A component is a unit of computation wired into a [`Graph`](crate::model::Graph):
//! - Explicit components compute `outputs = f(inputs)`
//! - Implicit components define `residual(inputs, outputs) = 0`
//!
//! Components declare their variables once in [`Component::setup`] and keep
//! the typed handles they get back; at run time they read [`Inputs`] and write
//! [`Outputs`] or [`Residuals`] through those handles.
//!
//! The library covers the components used by the bundled models:
//! - Circuit: Resistor, Diode, Node
//! - Sources: IndepVar, Balance
//! - Powertrain: Motor, PowerSplitter, FuelCell, Battery, TotalMass
//! - Analytic test problems: SellarDis1, SellarDis2, Paraboloid
//! - Expressions: ExecComp

mod circuit;
mod diode;
mod exec;
mod powertrain;
mod sellar;
mod sources;

pub use circuit::{Node, Resistor};
pub use diode::{Diode, DEFAULT_SATURATION_CURRENT, DEFAULT_THERMAL_VOLTAGE};
pub use exec::{ExecComp, ExecSpec};
pub use powertrain::{Battery, FuelCell, Motor, PowerSplitter, TotalMass};
pub use sellar::{Paraboloid, SellarDis1, SellarDis2};
pub use sources::{Balance, BalanceOutput, IndepOutput, IndepVar};

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MdoError, Result};
use crate::model::{InputHandle, Kind, OutputHandle};
use crate::solver::FdConfig;

/// A unit of computation in the graph.
pub trait Component: fmt::Debug {
    /// Explicit or implicit.
    fn kind(&self) -> Kind {
        Kind::Explicit
    }

    /// Declare inputs, outputs and partial-derivative strategies.
    ///
    /// Called exactly once when the component is added to a graph.
    fn setup(&mut self, decl: &mut Declarations) -> Result<()>;

    /// Compute outputs from inputs (explicit components).
    ///
    /// `outputs` arrives holding the current output values. Explicit
    /// components must override this.
    fn compute(&self, inputs: &Inputs, _outputs: &mut Outputs) -> Result<()> {
        Err(MdoError::missing_method(inputs.component(), "compute"))
    }

    /// Evaluate residuals (implicit components). Must not change outputs.
    ///
    /// Implicit components must override this.
    fn apply_residual(
        &self,
        inputs: &Inputs,
        _outputs: &Outputs,
        _residuals: &mut Residuals,
    ) -> Result<()> {
        Err(MdoError::missing_method(inputs.component(), "apply_residual"))
    }

    /// Whether [`Component::solve_nonlinear`] can drive this component's
    /// residuals to zero on its own.
    fn can_solve_nonlinear(&self) -> bool {
        false
    }

    /// Solve the component's own residuals for its outputs.
    fn solve_nonlinear(&self, _inputs: &Inputs, _outputs: &mut Outputs) -> Result<()> {
        Ok(())
    }

    /// Fill partials declared [`Derivative::Analytic`].
    ///
    /// Blocks are row-major `[len(of) x len(wrt)]`. Pairs left unset are zero.
    fn compute_partials(
        &self,
        _inputs: &Inputs,
        _outputs: &Outputs,
        _partials: &mut Partials,
    ) -> Result<()> {
        Ok(())
    }

    /// Serializable description, if the component has one.
    fn spec(&self) -> Option<ComponentSpec> {
        None
    }
}

/// Conversion of declaration defaults into variable values.
pub trait IntoValue {
    fn into_value(self) -> Vec<f64>;
}

impl IntoValue for f64 {
    fn into_value(self) -> Vec<f64> {
        vec![self]
    }
}

impl IntoValue for Vec<f64> {
    fn into_value(self) -> Vec<f64> {
        self
    }
}

impl IntoValue for &[f64] {
    fn into_value(self) -> Vec<f64> {
        self.to_vec()
    }
}

impl<const N: usize> IntoValue for [f64; N] {
    fn into_value(self) -> Vec<f64> {
        self.to_vec()
    }
}

/// How a partial derivative is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivative {
    /// Supplied by [`Component::compute_partials`]
    Analytic,
    /// Finite differences with the given settings
    FiniteDifference(FdConfig),
}

/// Variable a partial derivative is taken with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrt {
    Input(InputHandle),
    Output(OutputHandle),
}

impl From<InputHandle> for Wrt {
    fn from(h: InputHandle) -> Self {
        Wrt::Input(h)
    }
}

impl From<OutputHandle> for Wrt {
    fn from(h: OutputHandle) -> Self {
        Wrt::Output(h)
    }
}

/// A declared variable, before it is registered in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub unit: Option<String>,
    pub default: Vec<f64>,
}

/// A declared partial derivative strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialDecl {
    pub of: OutputHandle,
    pub wrt: Wrt,
    pub method: Derivative,
}

/// Collects declarations made during [`Component::setup`].
#[derive(Debug, Clone)]
pub struct Declarations {
    component: String,
    pub(crate) inputs: Vec<VarDecl>,
    pub(crate) outputs: Vec<VarDecl>,
    pub(crate) partials: Vec<PartialDecl>,
    pub(crate) default_derivative: Option<Derivative>,
}

impl Declarations {
    /// Start declarations for the named component.
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            partials: Vec::new(),
            default_derivative: None,
        }
    }

    /// Name of the component being set up.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Declare an input and get its handle.
    pub fn add_input(
        &mut self,
        name: &str,
        default: impl IntoValue,
        unit: Option<&str>,
    ) -> Result<InputHandle> {
        let decl = self.make_decl(name, default.into_value(), unit)?;
        self.inputs.push(decl);
        Ok(InputHandle(self.inputs.len() - 1))
    }

    /// Declare an output and get its handle.
    pub fn add_output(
        &mut self,
        name: &str,
        default: impl IntoValue,
        unit: Option<&str>,
    ) -> Result<OutputHandle> {
        let decl = self.make_decl(name, default.into_value(), unit)?;
        self.outputs.push(decl);
        Ok(OutputHandle(self.outputs.len() - 1))
    }

    /// Choose how `d of / d wrt` is obtained.
    pub fn declare_partials(&mut self, of: OutputHandle, wrt: impl Into<Wrt>, method: Derivative) {
        let wrt = wrt.into();
        self.partials.retain(|p| !(p.of == of && p.wrt == wrt));
        self.partials.push(PartialDecl { of, wrt, method });
    }

    /// Strategy for every pair not declared individually.
    pub fn declare_all_partials(&mut self, method: Derivative) {
        self.default_derivative = Some(method);
    }

    /// Inputs declared so far.
    pub fn inputs(&self) -> &[VarDecl] {
        &self.inputs
    }

    /// Outputs declared so far.
    pub fn outputs(&self) -> &[VarDecl] {
        &self.outputs
    }

    fn make_decl(&self, name: &str, default: Vec<f64>, unit: Option<&str>) -> Result<VarDecl> {
        let taken = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|v| v.name == name);
        if taken {
            return Err(MdoError::DuplicateName {
                component: self.component.clone(),
                name: name.to_string(),
            });
        }
        if default.is_empty() {
            return Err(MdoError::ShapeMismatch {
                path: format!("{}.{}", self.component, name),
                expected: 1,
                actual: 0,
            });
        }
        Ok(VarDecl {
            name: name.to_string(),
            unit: unit.map(str::to_string),
            default,
        })
    }
}

/// Read-only view of a component's input values for one call.
#[derive(Debug, Clone)]
pub struct Inputs {
    component: String,
    values: Vec<Vec<f64>>,
}

impl Inputs {
    pub fn new(component: impl Into<String>, values: Vec<Vec<f64>>) -> Self {
        Self {
            component: component.into(),
            values,
        }
    }

    /// Name of the component instance being evaluated (for error messages).
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn get(&self, h: InputHandle) -> &[f64] {
        &self.values[h.0]
    }

    /// First entry of an input; the usual accessor for scalars.
    pub fn scalar(&self, h: InputHandle) -> f64 {
        self.values[h.0][0]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.values
    }

    pub(crate) fn into_values(self) -> Vec<Vec<f64>> {
        self.values
    }
}

/// A component's output values for one call.
#[derive(Debug, Clone)]
pub struct Outputs {
    values: Vec<Vec<f64>>,
}

impl Outputs {
    pub fn new(values: Vec<Vec<f64>>) -> Self {
        Self { values }
    }

    pub fn get(&self, h: OutputHandle) -> &[f64] {
        &self.values[h.0]
    }

    pub fn scalar(&self, h: OutputHandle) -> f64 {
        self.values[h.0][0]
    }

    pub fn get_mut(&mut self, h: OutputHandle) -> &mut [f64] {
        &mut self.values[h.0]
    }

    /// Copy `value` into an output. Lengths must match.
    pub fn set(&mut self, h: OutputHandle, value: &[f64]) {
        self.values[h.0].copy_from_slice(value);
    }

    pub fn set_scalar(&mut self, h: OutputHandle, value: f64) {
        self.values[h.0][0] = value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Vec<f64>] {
        &mut self.values
    }

    pub(crate) fn into_values(self) -> Vec<Vec<f64>> {
        self.values
    }
}

/// Residual values, shaped like the component's outputs.
#[derive(Debug, Clone)]
pub struct Residuals {
    values: Vec<Vec<f64>>,
}

impl Residuals {
    /// Zero residuals shaped like `outputs`.
    pub fn zeros_like(outputs: &Outputs) -> Self {
        Self {
            values: outputs.values.iter().map(|v| vec![0.0; v.len()]).collect(),
        }
    }

    pub fn get(&self, h: OutputHandle) -> &[f64] {
        &self.values[h.0]
    }

    pub fn get_mut(&mut self, h: OutputHandle) -> &mut [f64] {
        &mut self.values[h.0]
    }

    pub fn set(&mut self, h: OutputHandle, value: &[f64]) {
        self.values[h.0].copy_from_slice(value);
    }

    pub fn set_scalar(&mut self, h: OutputHandle, value: f64) {
        self.values[h.0][0] = value;
    }

    pub(crate) fn into_values(self) -> Vec<Vec<f64>> {
        self.values
    }
}

/// Analytic partial derivative blocks filled by [`Component::compute_partials`].
#[derive(Debug, Default, Clone)]
pub struct Partials {
    blocks: HashMap<(OutputHandle, Wrt), Vec<f64>>,
}

impl Partials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a row-major `[len(of) x len(wrt)]` block.
    pub fn set(&mut self, of: OutputHandle, wrt: impl Into<Wrt>, values: &[f64]) {
        self.blocks.insert((of, wrt.into()), values.to_vec());
    }

    /// Set a 1x1 block.
    pub fn set_scalar(&mut self, of: OutputHandle, wrt: impl Into<Wrt>, value: f64) {
        self.blocks.insert((of, wrt.into()), vec![value]);
    }

    pub fn get(&self, of: OutputHandle, wrt: impl Into<Wrt>) -> Option<&[f64]> {
        self.blocks.get(&(of, wrt.into())).map(Vec::as_slice)
    }
}

/// Serializable description of a library component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentSpec {
    IndepVar {
        outputs: Vec<IndepOutput>,
    },
    Exec(ExecSpec),
    Balance {
        outputs: Vec<BalanceOutput>,
    },
    Resistor {
        #[serde(default = "default_resistance")]
        r: f64,
    },
    Diode {
        #[serde(default = "default_saturation_current")]
        is: f64,
        #[serde(default = "default_thermal_voltage")]
        vt: f64,
    },
    Node {
        #[serde(default = "default_one")]
        n_in: usize,
        #[serde(default = "default_one")]
        n_out: usize,
    },
    Motor {
        #[serde(default = "default_efficiency")]
        efficiency: f64,
    },
    PowerSplitter {
        #[serde(default = "default_fuel_cell_fraction")]
        fraction: f64,
    },
    FuelCell,
    Battery,
    TotalMass,
    SellarDis1,
    SellarDis2,
    Paraboloid,
}

fn default_resistance() -> f64 {
    1.0
}

fn default_saturation_current() -> f64 {
    DEFAULT_SATURATION_CURRENT
}

fn default_thermal_voltage() -> f64 {
    DEFAULT_THERMAL_VOLTAGE
}

fn default_one() -> usize {
    1
}

fn default_efficiency() -> f64 {
    1.0
}

fn default_fuel_cell_fraction() -> f64 {
    0.7
}

impl ComponentSpec {
    /// Instantiate the described component.
    pub fn build(&self) -> Result<Box<dyn Component>> {
        Ok(match self {
            ComponentSpec::IndepVar { outputs } => Box::new(IndepVar::new(outputs.clone())),
            ComponentSpec::Exec(spec) => Box::new(ExecComp::from_spec(spec.clone())?),
            ComponentSpec::Balance { outputs } => Box::new(Balance::new(outputs.clone())),
            ComponentSpec::Resistor { r } => Box::new(Resistor::new(*r)),
            ComponentSpec::Diode { is, vt } => Box::new(Diode::new(*is, *vt)),
            ComponentSpec::Node { n_in, n_out } => Box::new(Node::new(*n_in, *n_out)),
            ComponentSpec::Motor { efficiency } => Box::new(Motor::new(*efficiency)),
            ComponentSpec::PowerSplitter { fraction } => Box::new(PowerSplitter::new(*fraction)),
            ComponentSpec::FuelCell => Box::new(FuelCell::new()),
            ComponentSpec::Battery => Box::new(Battery::new()),
            ComponentSpec::TotalMass => Box::new(TotalMass::new()),
            ComponentSpec::SellarDis1 => Box::new(SellarDis1::new()),
            ComponentSpec::SellarDis2 => Box::new(SellarDis2::new()),
            ComponentSpec::Paraboloid => Box::new(Paraboloid::new()),
        })
    }
}
