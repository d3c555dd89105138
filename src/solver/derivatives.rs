//! Partial derivatives of components and the Jacobian of a coupled group.

use super::config::{FdConfig, FdScheme};
use super::linear::DenseMatrix;
use super::system::GroupSystem;
use crate::components::{Derivative, Inputs, Outputs, Partials, Residuals, Wrt};
use crate::error::Result;
use crate::model::{ComponentEntry, ComponentId, Graph, InputHandle, Kind, OutputHandle};

/// Evaluate the differentiated quantity: outputs for explicit components,
/// residuals for implicit ones.
fn evaluate(entry: &ComponentEntry, inputs: &Inputs, outputs: &Outputs) -> Result<Vec<Vec<f64>>> {
    match entry.kind {
        Kind::Explicit => {
            let mut computed = outputs.clone();
            entry.component().compute(inputs, &mut computed)?;
            Ok(computed.into_values())
        }
        Kind::Implicit => {
            let mut residuals = Residuals::zeros_like(outputs);
            entry.component().apply_residual(inputs, outputs, &mut residuals)?;
            Ok(residuals.into_values())
        }
    }
}

/// All partial blocks of a component at the graph's current state.
///
/// Analytic pairs come from one call to `compute_partials`; the remaining
/// pairs are differenced column by column.
pub fn component_partials(graph: &mut Graph, id: ComponentId, fallback: FdConfig) -> Result<Partials> {
    graph.transfer(id);
    let inputs = graph.inputs_of(id);
    let outputs = graph.outputs_of(id);
    let entry = graph.component(id);

    // (wrt, config, outputs differenced with that config)
    let mut fd_columns: Vec<(Wrt, FdConfig, Vec<OutputHandle>)> = Vec::new();
    let mut any_analytic = false;
    for (of, wrt) in entry.partial_pairs() {
        match entry.derivative_for(of, wrt, fallback) {
            Derivative::Analytic => any_analytic = true,
            Derivative::FiniteDifference(fd) => {
                match fd_columns.iter_mut().find(|(w, c, _)| *w == wrt && *c == fd) {
                    Some((_, _, ofs)) => ofs.push(of),
                    None => fd_columns.push((wrt, fd, vec![of])),
                }
            }
        }
    }

    let mut partials = Partials::new();
    if any_analytic {
        entry.component().compute_partials(&inputs, &outputs, &mut partials)?;
    }
    if fd_columns.is_empty() {
        return Ok(partials);
    }

    let base = evaluate(entry, &inputs, &outputs)?;
    for (wrt, fd, ofs) in fd_columns {
        let cols = match wrt {
            Wrt::Input(h) => inputs.get(h).len(),
            Wrt::Output(h) => outputs.get(h).len(),
        };
        let mut blocks: Vec<Vec<f64>> = ofs
            .iter()
            .map(|of| vec![0.0; base[of.index()].len() * cols])
            .collect();

        for k in 0..cols {
            let x = match wrt {
                Wrt::Input(h) => inputs.get(h)[k],
                Wrt::Output(h) => outputs.get(h)[k],
            };
            let h = fd.step_at(x);
            let shifted = |delta: f64| -> Result<Vec<Vec<f64>>> {
                let mut inputs = inputs.clone();
                let mut outputs = outputs.clone();
                match wrt {
                    Wrt::Input(w) => inputs.values_mut()[w.index()][k] += delta,
                    Wrt::Output(w) => outputs.values_mut()[w.index()][k] += delta,
                }
                evaluate(entry, &inputs, &outputs)
            };

            let (plus, minus, width) = match fd.scheme {
                FdScheme::Forward => (shifted(h)?, base.clone(), h),
                FdScheme::Backward => (base.clone(), shifted(-h)?, h),
                FdScheme::Central => (shifted(h)?, shifted(-h)?, 2.0 * h),
            };

            for (block, of) in blocks.iter_mut().zip(&ofs) {
                let o = of.index();
                for r in 0..base[o].len() {
                    block[r * cols + k] = (plus[o][r] - minus[o][r]) / width;
                }
            }
        }

        for (block, of) in blocks.into_iter().zip(ofs) {
            partials.set(of, wrt, &block);
        }
    }
    Ok(partials)
}

/// Jacobian of a group's residual with respect to its unknowns.
///
/// Explicit rows are `I - df/dx * dx/du`; implicit rows are
/// `dR/dy + dR/dx * dx/du`. Inputs fed from outside the group are constant.
pub fn group_jacobian(graph: &mut Graph, system: &GroupSystem, fallback: FdConfig) -> Result<DenseMatrix> {
    let mut jac = DenseMatrix::new(system.size());

    for &member in system.members() {
        let partials = component_partials(graph, member, fallback)?;
        let entry = graph.component(member);
        let sign = match entry.kind {
            Kind::Explicit => -1.0,
            Kind::Implicit => 1.0,
        };

        for (o, &out_var) in entry.outputs.iter().enumerate() {
            let of = OutputHandle(o);
            let Some(row0) = system.offset(out_var) else {
                continue;
            };
            let rows = graph.value(out_var).len();

            if entry.kind == Kind::Explicit {
                for r in 0..rows {
                    jac.add(row0 + r, row0 + r, 1.0);
                }
            } else {
                for (o2, &var2) in entry.outputs.iter().enumerate() {
                    let Some(block) = partials.get(of, OutputHandle(o2)) else {
                        continue;
                    };
                    let Some(col0) = system.offset(var2) else {
                        continue;
                    };
                    let cols = graph.value(var2).len();
                    for r in 0..rows {
                        for c in 0..cols {
                            jac.add(row0 + r, col0 + c, block[r * cols + c]);
                        }
                    }
                }
            }

            for (i, &in_var) in entry.inputs.iter().enumerate() {
                let Some(block) = partials.get(of, InputHandle(i)) else {
                    continue;
                };
                let Some(conn) = graph.source_of(in_var) else {
                    continue;
                };
                let Some(col0) = system.offset(conn.source) else {
                    continue;
                };
                let cols = graph.value(in_var).len();
                let scale = conn.factor();
                for k in 0..cols {
                    let col = col0 + conn.source_index(k);
                    for r in 0..rows {
                        jac.add(row0 + r, col, sign * block[r * cols + k] * scale);
                    }
                }
            }
        }
    }
    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Diode, ExecComp, Node, Paraboloid, Resistor};
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_difference_of_paraboloid() {
        let mut g = Graph::new();
        let id = g.add_component("p", Paraboloid::new()).unwrap();
        g.set_scalar("p.x", 3.0).unwrap();
        g.set_scalar("p.y", -4.0).unwrap();
        let partials = component_partials(&mut g, id, FdConfig::default()).unwrap();
        // f = (x-3)^2 + xy + (y+4)^2 - 3
        let dfdx = partials.get(OutputHandle(0), InputHandle(0)).unwrap()[0];
        let dfdy = partials.get(OutputHandle(0), InputHandle(1)).unwrap()[0];
        assert_relative_eq!(dfdx, -4.0, epsilon = 1e-4);
        assert_relative_eq!(dfdy, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_analytic_matches_central_difference_for_diode() {
        let mut g = Graph::new();
        let id = g.add_component("D1", Diode::default()).unwrap();
        g.set_scalar("D1.V_in", 0.7).unwrap();
        let analytic = component_partials(&mut g, id, FdConfig::default()).unwrap();
        let di_dv = analytic.get(OutputHandle(0), InputHandle(0)).unwrap()[0];

        let h = 1e-7;
        let diode = Diode::default();
        let numeric = (diode.current(0.7 + h) - diode.current(0.7 - h)) / (2.0 * h);
        assert_relative_eq!(di_dv, numeric, max_relative = 1e-5);
    }

    #[test]
    fn test_jacobian_of_linear_cycle() {
        let mut g = Graph::new();
        g.add_component("a", ExecComp::new(&["y = 0.5*x + 1"]).unwrap())
            .unwrap();
        g.add_component("b", ExecComp::new(&["x = 0.5*y + 1"]).unwrap())
            .unwrap();
        g.connect("a.y", "b.y").unwrap();
        g.connect("b.x", "a.x").unwrap();
        let system = GroupSystem::new(&g, &[ComponentId(0), ComponentId(1)]);
        let jac = group_jacobian(&mut g, &system, FdConfig::default()).unwrap();
        assert_relative_eq!(jac.get(0, 0), 1.0);
        assert_relative_eq!(jac.get(0, 1), -0.5, epsilon = 1e-8);
        assert_relative_eq!(jac.get(1, 0), -0.5, epsilon = 1e-8);
        assert_relative_eq!(jac.get(1, 1), 1.0);
    }

    #[test]
    fn test_jacobian_with_implicit_node() {
        // ground -> R1 -> n1 (KCL): R(V) = I_in - I_R
        let mut g = Graph::new();
        g.add_component("R1", Resistor::new(100.0)).unwrap();
        g.add_component("n1", Node::new(1, 1)).unwrap();
        g.connect("n1.V", "R1.V_in").unwrap();
        g.connect("R1.I", "n1.I_out:0").unwrap();
        let system = GroupSystem::new(&g, &[ComponentId(0), ComponentId(1)]);
        let jac = group_jacobian(&mut g, &system, FdConfig::default()).unwrap();
        // Rows: R1.I, n1.V
        assert_relative_eq!(jac.get(0, 0), 1.0);
        assert_relative_eq!(jac.get(0, 1), -0.01);
        assert_relative_eq!(jac.get(1, 0), -1.0);
        assert_relative_eq!(jac.get(1, 1), 0.0);
    }
}
