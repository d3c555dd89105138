//! Component graph: components, their variables and the connections
//! between them.

use std::collections::HashMap;

use super::connection::{check_shapes, check_units, ConnectOptions, Connection};
use super::registry::VariableRegistry;
use super::types::{split_path, ComponentId, Direction, Kind, OutputHandle, VarId};
use crate::components::{
    Component, Declarations, Derivative, Inputs, Outputs, PartialDecl, Residuals, Wrt,
};
use crate::error::{MdoError, Result};
use crate::solver::{FdConfig, SolverConfig};

/// A component instance placed in a graph.
#[derive(Debug)]
pub struct ComponentEntry {
    pub id: ComponentId,
    pub name: String,
    pub kind: Kind,
    /// Registry ids of the inputs, in declaration order
    pub inputs: Vec<VarId>,
    /// Registry ids of the outputs, in declaration order
    pub outputs: Vec<VarId>,
    component: Box<dyn Component>,
    partials: Vec<PartialDecl>,
    default_derivative: Option<Derivative>,
}

impl ComponentEntry {
    /// The component implementation.
    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }

    /// How `d of / d wrt` is obtained: the declared method, else the
    /// component-wide default, else finite differences with `fallback`.
    pub fn derivative_for(&self, of: OutputHandle, wrt: Wrt, fallback: FdConfig) -> Derivative {
        self.partials
            .iter()
            .find(|p| p.of == of && p.wrt == wrt)
            .map(|p| p.method)
            .or(self.default_derivative)
            .unwrap_or(Derivative::FiniteDifference(fallback))
    }

    /// The `(of, wrt)` pairs that enter this component's Jacobian.
    ///
    /// Explicit components differentiate outputs with respect to inputs;
    /// implicit components additionally with respect to their own outputs.
    pub fn partial_pairs(&self) -> Vec<(OutputHandle, Wrt)> {
        let mut pairs = Vec::new();
        for o in 0..self.outputs.len() {
            let of = OutputHandle(o);
            for i in 0..self.inputs.len() {
                pairs.push((of, Wrt::Input(super::types::InputHandle(i))));
            }
            if self.kind == Kind::Implicit {
                for o2 in 0..self.outputs.len() {
                    pairs.push((of, Wrt::Output(OutputHandle(o2))));
                }
            }
        }
        pairs
    }
}

/// A designated coupled group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDef {
    pub name: String,
    /// Members, in insertion order
    pub members: Vec<ComponentId>,
    /// Solver override for this group
    pub solver: Option<SolverConfig>,
}

/// One resolved entry of a derivative plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPartial {
    pub of: String,
    pub wrt: String,
    pub method: Derivative,
}

/// The assembled model: components, variables and connections.
///
/// Every structural change bumps [`Graph::revision`]; evaluators rebuild
/// their schedule when it changes.
#[derive(Debug, Default)]
pub struct Graph {
    components: Vec<ComponentEntry>,
    name_map: HashMap<String, ComponentId>,
    registry: VariableRegistry,
    connections: Vec<Connection>,
    /// Target input -> index into `connections`
    incoming: HashMap<VarId, usize>,
    groups: Vec<GroupDef>,
    revision: u64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component under a unique name and run its setup.
    pub fn add_component(
        &mut self,
        name: &str,
        component: impl Component + 'static,
    ) -> Result<ComponentId> {
        self.add_boxed(name, Box::new(component))
    }

    /// Add an already boxed component.
    pub fn add_boxed(&mut self, name: &str, mut component: Box<dyn Component>) -> Result<ComponentId> {
        if name.is_empty() || name.contains('.') {
            return Err(MdoError::invalid_option(
                name,
                "name",
                "component names must be non-empty and contain no '.'",
            ));
        }
        if self.name_map.contains_key(name) || self.groups.iter().any(|g| g.name == name) {
            return Err(MdoError::DuplicateComponent {
                name: name.to_string(),
            });
        }

        let mut decl = Declarations::new(name);
        component.setup(&mut decl)?;

        let id = ComponentId(self.components.len());
        let mut inputs = Vec::with_capacity(decl.inputs.len());
        for var in decl.inputs {
            inputs.push(self.registry.declare(id, name, &var.name, var.unit, var.default, Direction::Input)?);
        }
        let mut outputs = Vec::with_capacity(decl.outputs.len());
        for var in decl.outputs {
            outputs.push(self.registry.declare(id, name, &var.name, var.unit, var.default, Direction::Output)?);
        }

        self.components.push(ComponentEntry {
            id,
            name: name.to_string(),
            kind: component.kind(),
            inputs,
            outputs,
            component,
            partials: decl.partials,
            default_derivative: decl.default_derivative,
        });
        self.name_map.insert(name.to_string(), id);
        self.revision += 1;
        Ok(id)
    }

    /// Connect an output to an input by path (`"component.variable"`).
    pub fn connect(&mut self, source: &str, target: &str) -> Result<()> {
        self.connect_with(source, target, ConnectOptions::default())
    }

    /// Connect with an index map and/or unit conversion factor.
    pub fn connect_with(&mut self, source: &str, target: &str, options: ConnectOptions) -> Result<()> {
        let src = self.resolve(source)?;
        let dst = self.resolve(target)?;
        let src_var = self.registry.variable(src);
        let dst_var = self.registry.variable(dst);

        if src_var.direction != Direction::Output {
            return Err(MdoError::InvalidConnection {
                source_path: source.to_string(),
                target: target.to_string(),
                message: format!("source is an {}, not an output", src_var.direction),
            });
        }
        if dst_var.direction != Direction::Input {
            return Err(MdoError::InvalidConnection {
                source_path: source.to_string(),
                target: target.to_string(),
                message: format!("target is an {}, not an input", dst_var.direction),
            });
        }
        if let Some(&existing) = self.incoming.get(&dst) {
            let existing = self.connections[existing].source;
            return Err(MdoError::MultipleSource {
                target: dst_var.path.clone(),
                existing: self.registry.variable(existing).path.clone(),
                source_path: src_var.path.clone(),
            });
        }
        if let Some(scale) = options.scale {
            if !(scale.is_finite() && scale != 0.0) {
                return Err(MdoError::InvalidConnection {
                    source_path: source.to_string(),
                    target: target.to_string(),
                    message: "scale must be finite and non-zero".to_string(),
                });
            }
        }
        check_units(src_var, dst_var, options.scale)?;
        check_shapes(src_var, dst_var, options.index_map.as_deref())?;

        self.incoming.insert(dst, self.connections.len());
        self.connections.push(Connection {
            source: src,
            target: dst,
            index_map: options.index_map,
            scale: options.scale,
        });
        self.revision += 1;
        Ok(())
    }

    /// Designate a coupled group solved as one unit.
    ///
    /// Members must exist and may belong to at most one group.
    pub fn add_group(&mut self, name: &str, members: &[&str], solver: Option<SolverConfig>) -> Result<()> {
        if self.name_map.contains_key(name) || self.groups.iter().any(|g| g.name == name) {
            return Err(MdoError::DuplicateComponent {
                name: name.to_string(),
            });
        }
        if members.is_empty() {
            return Err(MdoError::invalid_option(name, "members", "a group needs at least one member"));
        }
        if let Some(config) = &solver {
            config.validate()?;
        }

        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            let id = self.component_id(member)?;
            if let Some(owner) = self.group_of(id) {
                return Err(MdoError::invalid_option(
                    *member,
                    "group",
                    format!("already a member of group '{}'", owner.name),
                ));
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids.sort();

        self.groups.push(GroupDef {
            name: name.to_string(),
            members: ids,
            solver,
        });
        self.revision += 1;
        Ok(())
    }

    /// Resolve a `"component.variable"` path.
    pub fn resolve(&self, path: &str) -> Result<VarId> {
        let (component, variable) = split_path(path).ok_or_else(|| MdoError::UnknownVariable {
            path: path.to_string(),
        })?;
        let id = self.component_id(component)?;
        self.registry
            .find(id, variable)
            .ok_or_else(|| MdoError::UnknownVariable {
                path: path.to_string(),
            })
    }

    /// Current value of a variable by path.
    pub fn get(&self, path: &str) -> Result<&[f64]> {
        Ok(self.registry.get(self.resolve(path)?))
    }

    /// First entry of a variable by path.
    pub fn get_scalar(&self, path: &str) -> Result<f64> {
        Ok(self.get(path)?[0])
    }

    /// Overwrite a variable by path. Connected inputs are overwritten again
    /// on the next evaluation.
    pub fn set(&mut self, path: &str, value: &[f64]) -> Result<()> {
        let id = self.resolve(path)?;
        self.registry.set(id, value)
    }

    pub fn set_scalar(&mut self, path: &str, value: f64) -> Result<()> {
        self.set(path, &[value])
    }

    /// Value of a variable by id.
    pub fn value(&self, id: VarId) -> &[f64] {
        self.registry.get(id)
    }

    pub(crate) fn set_value(&mut self, id: VarId, value: &[f64]) -> Result<()> {
        self.registry.set(id, value)
    }

    pub(crate) fn value_mut(&mut self, id: VarId) -> &mut [f64] {
        self.registry.value_mut(id)
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Restore every variable to its declared default.
    pub fn reset(&mut self) {
        self.registry.reset_to_defaults();
    }

    pub fn components(&self) -> &[ComponentEntry] {
        &self.components
    }

    pub fn component(&self, id: ComponentId) -> &ComponentEntry {
        &self.components[id.0]
    }

    /// Look up a component id by name.
    pub fn component_id(&self, name: &str) -> Result<ComponentId> {
        self.name_map
            .get(name)
            .copied()
            .ok_or_else(|| MdoError::UnknownComponent {
                name: name.to_string(),
            })
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Incoming connection of an input, if any.
    pub fn source_of(&self, target: VarId) -> Option<&Connection> {
        self.incoming.get(&target).map(|&i| &self.connections[i])
    }

    pub fn groups(&self) -> &[GroupDef] {
        &self.groups
    }

    /// Designated group a component belongs to.
    pub fn group_of(&self, id: ComponentId) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.members.contains(&id))
    }

    /// Counter bumped by every structural change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy connected source values into the component's inputs.
    pub fn transfer(&mut self, id: ComponentId) {
        for &input in &self.components[id.0].inputs {
            if let Some(&conn_index) = self.incoming.get(&input) {
                let conn = &self.connections[conn_index];
                let source = self.registry.get(conn.source).to_vec();
                conn.apply(&source, self.registry.value_mut(conn.target));
            }
        }
    }

    /// Snapshot of a component's input values.
    pub fn inputs_of(&self, id: ComponentId) -> Inputs {
        let entry = &self.components[id.0];
        Inputs::new(
            entry.name.clone(),
            entry.inputs.iter().map(|&v| self.registry.get(v).to_vec()).collect(),
        )
    }

    /// Snapshot of a component's output values.
    pub fn outputs_of(&self, id: ComponentId) -> Outputs {
        let entry = &self.components[id.0];
        Outputs::new(entry.outputs.iter().map(|&v| self.registry.get(v).to_vec()).collect())
    }

    /// Write output values back into the registry.
    pub(crate) fn store_outputs(&mut self, id: ComponentId, outputs: Outputs) {
        for (k, value) in outputs.into_values().into_iter().enumerate() {
            let var = self.components[id.0].outputs[k];
            self.registry.value_mut(var).copy_from_slice(&value);
        }
    }

    /// Transfer inputs, run `compute` and store the outputs.
    pub fn compute_component(&mut self, id: ComponentId) -> Result<()> {
        self.transfer(id);
        let inputs = self.inputs_of(id);
        let mut outputs = self.outputs_of(id);
        self.components[id.0].component.compute(&inputs, &mut outputs)?;
        self.store_outputs(id, outputs);
        Ok(())
    }

    /// Transfer inputs and evaluate the component's residuals at the
    /// current outputs. Explicit components report `y - f(x)`.
    pub fn residuals_of(&mut self, id: ComponentId) -> Result<Vec<Vec<f64>>> {
        self.transfer(id);
        let inputs = self.inputs_of(id);
        let outputs = self.outputs_of(id);
        let entry = &self.components[id.0];
        match entry.kind {
            Kind::Explicit => {
                let mut computed = outputs.clone();
                entry.component.compute(&inputs, &mut computed)?;
                Ok(outputs
                    .values()
                    .iter()
                    .zip(computed.values())
                    .map(|(y, f)| y.iter().zip(f).map(|(a, b)| a - b).collect())
                    .collect())
            }
            Kind::Implicit => {
                let mut residuals = Residuals::zeros_like(&outputs);
                entry.component.apply_residual(&inputs, &outputs, &mut residuals)?;
                Ok(residuals.into_values())
            }
        }
    }

    /// Resolved differentiation strategy for every partial of a component.
    pub fn derivative_plan(&self, name: &str, fallback: FdConfig) -> Result<Vec<PlannedPartial>> {
        let entry = self.component(self.component_id(name)?);
        let var_name = |id: VarId| self.registry.variable(id).name.clone();
        Ok(entry
            .partial_pairs()
            .into_iter()
            .map(|(of, wrt)| PlannedPartial {
                of: var_name(entry.outputs[of.index()]),
                wrt: match wrt {
                    Wrt::Input(h) => var_name(entry.inputs[h.index()]),
                    Wrt::Output(h) => var_name(entry.outputs[h.index()]),
                },
                method: entry.derivative_for(of, wrt, fallback),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Diode, IndepVar, Node, Resistor, SellarDis1};

    fn circuit() -> Graph {
        let mut g = Graph::new();
        g.add_component("ground", IndepVar::default().with_output("V", 0.0, Some("V")))
            .unwrap();
        g.add_component("R1", Resistor::new(100.0)).unwrap();
        g.add_component("n1", Node::new(1, 1)).unwrap();
        g
    }

    #[test]
    fn test_add_and_resolve() {
        let g = circuit();
        let id = g.resolve("n1.V").unwrap();
        assert_eq!(g.value(id), &[5.0]);
        assert_eq!(g.get_scalar("R1.V_in").unwrap(), 0.0);
        assert!(matches!(g.resolve("R9.I"), Err(MdoError::UnknownComponent { .. })));
        assert!(matches!(g.resolve("R1.Q"), Err(MdoError::UnknownVariable { .. })));
        assert!(matches!(g.resolve("R1"), Err(MdoError::UnknownVariable { .. })));
    }

    #[test]
    fn test_duplicate_component_name() {
        let mut g = circuit();
        let err = g.add_component("R1", Resistor::new(10.0)).unwrap_err();
        assert!(matches!(err, MdoError::DuplicateComponent { .. }));
    }

    #[test]
    fn test_multiple_source() {
        let mut g = circuit();
        g.connect("n1.V", "R1.V_in").unwrap();
        let err = g.connect("ground.V", "R1.V_in").unwrap_err();
        match err {
            MdoError::MultipleSource { existing, .. } => assert_eq!(existing, "n1.V"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unit_mismatch_and_scale() {
        let mut g = circuit();
        // V -> A without a factor is rejected
        let err = g.connect("n1.V", "n1.I_in:0").unwrap_err();
        assert!(matches!(err, MdoError::UnitMismatch { .. }));
        g.connect_with("n1.V", "n1.I_in:0", ConnectOptions::default().with_scale(0.01))
            .unwrap();
    }

    #[test]
    fn test_direction_checked() {
        let mut g = circuit();
        let err = g.connect("R1.V_in", "R1.V_out").unwrap_err();
        assert!(matches!(err, MdoError::InvalidConnection { .. }));
        let err = g.connect("R1.I", "n1.V").unwrap_err();
        assert!(matches!(err, MdoError::InvalidConnection { .. }));
    }

    #[test]
    fn test_index_map_connection() {
        let mut g = Graph::new();
        g.add_component("dvs", IndepVar::default().with_output("z", vec![5.0, 2.0, 7.0], None))
            .unwrap();
        g.add_component("d1", SellarDis1::new()).unwrap();
        let err = g
            .connect_with("dvs.z", "d1.z", ConnectOptions::default().with_index_map(vec![0, 3]))
            .unwrap_err();
        assert!(matches!(err, MdoError::IndexOutOfRange { index: 3, .. }));
        assert!(matches!(g.connect("dvs.z", "d1.z"), Err(MdoError::ShapeMismatch { .. })));

        g.connect_with("dvs.z", "d1.z", ConnectOptions::default().with_index_map(vec![2, 0]))
            .unwrap();
        let d1 = g.component_id("d1").unwrap();
        g.transfer(d1);
        assert_eq!(g.get("d1.z").unwrap(), &[7.0, 5.0]);
    }

    #[test]
    fn test_compute_component_and_residuals() {
        let mut g = circuit();
        g.add_component("D1", Diode::default()).unwrap();
        g.connect("n1.V", "R1.V_in").unwrap();
        g.connect("ground.V", "R1.V_out").unwrap();
        let r1 = g.component_id("R1").unwrap();
        g.compute_component(r1).unwrap();
        assert_eq!(g.get_scalar("R1.I").unwrap(), 0.05);

        let residuals = g.residuals_of(r1).unwrap();
        assert_eq!(residuals, vec![vec![0.0]]);

        let n1 = g.component_id("n1").unwrap();
        g.connect("R1.I", "n1.I_out:0").unwrap();
        g.set_scalar("n1.I_in:0", 0.1).unwrap();
        let residuals = g.residuals_of(n1).unwrap();
        assert!((residuals[0][0] - 0.05).abs() < 1e-15);
    }

    #[test]
    fn test_revision_tracks_structure() {
        let mut g = circuit();
        let before = g.revision();
        g.set_scalar("n1.V", 3.0).unwrap();
        assert_eq!(g.revision(), before);
        g.connect("n1.V", "R1.V_in").unwrap();
        assert!(g.revision() > before);
    }

    #[test]
    fn test_group_membership_is_exclusive() {
        let mut g = circuit();
        g.add_group("cycle", &["R1", "n1"], None).unwrap();
        assert!(g.add_group("other", &["R1"], None).is_err());
        assert!(matches!(
            g.add_group("cycle", &["ground"], None),
            Err(MdoError::DuplicateComponent { .. })
        ));
        assert!(matches!(
            g.add_group("bad", &["nope"], None),
            Err(MdoError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn test_derivative_plan() {
        let g = circuit();
        let plan = g.derivative_plan("n1", FdConfig::default()).unwrap();
        // V wrt I_in:0, I_out:0, V
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.method == Derivative::Analytic));

        let mut g = Graph::new();
        g.add_component("parab", crate::components::Paraboloid::new()).unwrap();
        let plan = g.derivative_plan("parab", FdConfig::default()).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0].method, Derivative::FiniteDifference(_)));
    }

    #[derive(Debug)]
    struct NoCompute;

    impl Component for NoCompute {
        fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
            decl.add_input("x", 1.0, None)?;
            decl.add_output("y", 1.0, None)?;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NoResidual;

    impl Component for NoResidual {
        fn kind(&self) -> Kind {
            Kind::Implicit
        }

        fn setup(&mut self, decl: &mut Declarations) -> Result<()> {
            decl.add_output("y", 1.0, None)?;
            Ok(())
        }
    }

    #[test]
    fn test_missing_methods_name_the_component() {
        let mut g = Graph::new();
        let explicit = g.add_component("lazy", NoCompute).unwrap();
        let implicit = g.add_component("silent", NoResidual).unwrap();

        match g.compute_component(explicit).unwrap_err() {
            MdoError::MissingMethod { component, method } => {
                assert_eq!(component, "lazy");
                assert_eq!(method, "compute");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(g.residuals_of(explicit).is_err());

        match g.residuals_of(implicit).unwrap_err() {
            MdoError::MissingMethod { component, method } => {
                assert_eq!(component, "silent");
                assert_eq!(method, "apply_residual");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Outputs are untouched
        assert_eq!(g.get_scalar("lazy.y").unwrap(), 1.0);
    }
}
