//! Execution schedule: cycle detection and ordering of solve units.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::graph::Graph;
use super::types::{ComponentId, Kind};
use crate::error::{MdoError, Result};
use crate::solver::{SolverConfig, Strategy};

/// A set of components executed or solved together.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    /// Members in insertion order
    pub members: Vec<ComponentId>,
    /// Solved iteratively by a nonlinear solver
    pub coupled: bool,
    /// Declared with [`Graph::add_group`]
    pub designated: bool,
    pub solver: Option<SolverConfig>,
}

impl Unit {
    /// Solver settings for this unit, falling back to `default`.
    pub fn config<'a>(&'a self, default: &'a SolverConfig) -> &'a SolverConfig {
        self.solver.as_ref().unwrap_or(default)
    }
}

/// Ordered solve units of a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    pub units: Vec<Unit>,
}

impl Schedule {
    /// Partition the graph into units and order them by data dependency.
    ///
    /// Strongly connected components, self-loops and implicit components
    /// become coupled units; designated groups absorb their members. Units
    /// with no mutual dependency run in order of their lowest component id.
    pub fn build(graph: &Graph, default: &SolverConfig) -> Result<Self> {
        let n = graph.components().len();

        let mut dag: DiGraph<ComponentId, ()> = DiGraph::with_capacity(n, graph.connections().len());
        for entry in graph.components() {
            dag.add_node(entry.id);
        }
        let mut self_loops = HashSet::new();
        let mut edges = HashSet::new();
        for conn in graph.connections() {
            let from = graph.registry().variable(conn.source).owner;
            let to = graph.registry().variable(conn.target).owner;
            if from == to {
                self_loops.insert(from);
            }
            if edges.insert((from, to)) {
                dag.add_edge(NodeIndex::new(from.0), NodeIndex::new(to.0), ());
            }
        }

        let mut units: Vec<Unit> = Vec::new();
        let mut unit_of: Vec<Option<usize>> = vec![None; n];

        for group in graph.groups() {
            for &member in &group.members {
                unit_of[member.0] = Some(units.len());
            }
            units.push(Unit {
                name: group.name.clone(),
                members: group.members.clone(),
                coupled: true,
                designated: true,
                solver: group.solver.clone(),
            });
        }

        let mut sccs = tarjan_scc(&dag);
        for scc in &mut sccs {
            scc.sort();
        }
        sccs.sort_by_key(|scc| scc.first().map(|n| n.index()));

        for scc in sccs {
            let members: Vec<ComponentId> = scc.iter().map(|n| dag[*n]).collect();
            let cyclic = members.len() > 1 || self_loops.contains(&members[0]);

            if cyclic {
                let owners: HashSet<Option<usize>> = members.iter().map(|m| unit_of[m.0]).collect();
                if owners.len() > 1 {
                    return Err(MdoError::CycleAcrossGroups {
                        message: format!(
                            "cycle through {} is not contained in a single group",
                            names(graph, &members)
                        ),
                    });
                }
            }
            if unit_of[members[0].0].is_some() {
                continue;
            }

            let implicit = members
                .iter()
                .any(|&m| graph.component(m).kind == Kind::Implicit);
            let name = if members.len() > 1 {
                format!("cycle_{}", graph.component(members[0]).name)
            } else {
                graph.component(members[0]).name.clone()
            };
            for &member in &members {
                unit_of[member.0] = Some(units.len());
            }
            units.push(Unit {
                name,
                members,
                coupled: cyclic || implicit,
                designated: false,
                solver: None,
            });
        }

        let order = order_units(&units, &unit_of, &edges)?;
        let mut slots: Vec<Option<Unit>> = units.into_iter().map(Some).collect();
        let units: Vec<Unit> = order.into_iter().filter_map(|u| slots[u].take()).collect();

        check_solvability(graph, &units, default)?;
        Ok(Self { units })
    }

    /// Unit names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn names(graph: &Graph, members: &[ComponentId]) -> String {
    members
        .iter()
        .map(|&m| graph.component(m).name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Kahn's algorithm over the condensed unit graph, lowest member id first.
fn order_units(
    units: &[Unit],
    unit_of: &[Option<usize>],
    edges: &HashSet<(ComponentId, ComponentId)>,
) -> Result<Vec<usize>> {
    let mut successors: Vec<HashSet<usize>> = vec![HashSet::new(); units.len()];
    let mut in_degree = vec![0usize; units.len()];
    for &(from, to) in edges {
        if let (Some(a), Some(b)) = (unit_of[from.0], unit_of[to.0]) {
            if a != b && successors[a].insert(b) {
                in_degree[b] += 1;
            }
        }
    }

    let key = |u: usize| units[u].members.iter().min().map_or(usize::MAX, |m| m.0);
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..units.len())
        .filter(|&u| in_degree[u] == 0)
        .map(|u| Reverse((key(u), u)))
        .collect();

    let mut order = Vec::with_capacity(units.len());
    while let Some(Reverse((_, u))) = ready.pop() {
        order.push(u);
        for &next in &successors[u] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((key(next), next)));
            }
        }
    }

    if order.len() < units.len() {
        let stuck: Vec<&str> = (0..units.len())
            .filter(|&u| in_degree[u] > 0)
            .map(|u| units[u].name.as_str())
            .collect();
        return Err(MdoError::CycleAcrossGroups {
            message: format!(
                "units {} depend on each other through components outside their groups",
                stuck.join(", ")
            ),
        });
    }
    Ok(order)
}

/// Gauss-Seidel can only converge implicit members that solve themselves.
fn check_solvability(graph: &Graph, units: &[Unit], default: &SolverConfig) -> Result<()> {
    for unit in units.iter().filter(|u| u.coupled) {
        if unit.config(default).strategy != Strategy::GaussSeidel {
            continue;
        }
        for &member in &unit.members {
            let entry = graph.component(member);
            if entry.kind == Kind::Implicit && !entry.component().can_solve_nonlinear() {
                let output = entry
                    .outputs
                    .first()
                    .map(|&v| graph.registry().variable(v).name.clone())
                    .unwrap_or_default();
                return Err(MdoError::UnsolvedResidual {
                    component: entry.name.clone(),
                    output,
                    message: format!(
                        "unit '{}' uses Gauss-Seidel and the component has no local solve",
                        unit.name
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ExecComp, IndepVar, Node};

    fn exec(g: &mut Graph, name: &str, expr: &str) {
        g.add_component(name, ExecComp::new(&[expr]).unwrap()).unwrap();
    }

    #[test]
    fn test_chain_runs_in_dependency_order() {
        let mut g = Graph::new();
        exec(&mut g, "b", "z = 2*y");
        exec(&mut g, "a", "y = 2*x");
        g.add_component("src", IndepVar::default().with_output("x", 3.0, None))
            .unwrap();
        g.connect("src.x", "a.x").unwrap();
        g.connect("a.y", "b.y").unwrap();

        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();
        assert_eq!(schedule.names(), vec!["src", "a", "b"]);
        assert!(schedule.units.iter().all(|u| !u.coupled));
    }

    #[test]
    fn test_independent_units_keep_insertion_order() {
        let mut g = Graph::new();
        exec(&mut g, "first", "y = 2*x");
        exec(&mut g, "second", "y = 3*x");
        exec(&mut g, "third", "y = 4*x");
        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();
        assert_eq!(schedule.names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cycle_becomes_coupled_unit() {
        let mut g = Graph::new();
        exec(&mut g, "pre", "x0 = 1.0");
        exec(&mut g, "a", "y = 0.5*x + 1");
        exec(&mut g, "b", "x = 0.5*y + 1");
        exec(&mut g, "post", "w = 2*y");
        g.connect("a.y", "b.y").unwrap();
        g.connect("b.x", "a.x").unwrap();
        g.connect("a.y", "post.y").unwrap();

        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();
        assert_eq!(schedule.names(), vec!["pre", "cycle_a", "post"]);
        let cycle = &schedule.units[1];
        assert!(cycle.coupled);
        assert!(!cycle.designated);
        assert_eq!(cycle.members, vec![ComponentId(1), ComponentId(2)]);
    }

    #[test]
    fn test_implicit_component_is_coupled() {
        let mut g = Graph::new();
        g.add_component("n1", Node::new(1, 1)).unwrap();
        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();
        assert!(schedule.units[0].coupled);
    }

    #[test]
    fn test_group_absorbs_members() {
        let mut g = Graph::new();
        exec(&mut g, "a", "y = 0.5*x + 1");
        exec(&mut g, "b", "x = 0.5*y + 1");
        g.connect("a.y", "b.y").unwrap();
        g.connect("b.x", "a.x").unwrap();
        g.add_group("mda", &["b", "a"], Some(SolverConfig::gauss_seidel()))
            .unwrap();

        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();
        assert_eq!(schedule.names(), vec!["mda"]);
        let unit = &schedule.units[0];
        assert!(unit.designated);
        assert_eq!(unit.members, vec![ComponentId(0), ComponentId(1)]);
        assert_eq!(
            unit.config(&SolverConfig::default()).strategy,
            Strategy::GaussSeidel
        );
    }

    #[test]
    fn test_cycle_crossing_group_is_rejected() {
        let mut g = Graph::new();
        exec(&mut g, "a", "y = 0.5*x + 1");
        exec(&mut g, "b", "x = 0.5*y + 1");
        g.connect("a.y", "b.y").unwrap();
        g.connect("b.x", "a.x").unwrap();
        g.add_group("half", &["a"], None).unwrap();

        let err = Schedule::build(&g, &SolverConfig::default()).unwrap_err();
        assert!(matches!(err, MdoError::CycleAcrossGroups { .. }));
    }

    #[test]
    fn test_group_round_trip_through_outsider_is_rejected() {
        let mut g = Graph::new();
        exec(&mut g, "a", "y = 2*x");
        exec(&mut g, "outside", "u = y + 1");
        exec(&mut g, "c", "w = u*3");
        g.connect("a.y", "outside.y").unwrap();
        g.connect("outside.u", "c.u").unwrap();
        g.add_group("g", &["a", "c"], None).unwrap();

        let err = Schedule::build(&g, &SolverConfig::default()).unwrap_err();
        assert!(matches!(err, MdoError::CycleAcrossGroups { .. }));
    }

    #[test]
    fn test_gauss_seidel_cannot_converge_node() {
        let mut g = Graph::new();
        g.add_component("n1", Node::new(1, 1)).unwrap();
        let err = Schedule::build(&g, &SolverConfig::gauss_seidel()).unwrap_err();
        match err {
            MdoError::UnsolvedResidual { component, output, .. } => {
                assert_eq!(component, "n1");
                assert_eq!(output, "V");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
