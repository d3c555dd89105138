//! Text and Graphviz output for evaluated models.
//!
//! Used by the CLI frontend and usable from any `io::Write` sink.

use std::io::{self, Write};

use crate::error::{MdoError, Result};
use crate::model::{Direction, Graph, Schedule};
use crate::solver::{EvaluationReport, Strategy};

/// Width of the path column in listings.
const PATH_WIDTH: usize = 24;

fn report_error(e: io::Error) -> MdoError {
    MdoError::ReportError {
        message: e.to_string(),
    }
}

fn strategy_name(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::GaussSeidel => "gauss_seidel",
        Strategy::Newton => "newton",
    }
}

/// Format a variable value: scalars bare, vectors bracketed.
pub fn format_value(value: &[f64]) -> String {
    match value {
        [x] => format!("{:.8e}", x),
        _ => {
            let entries: Vec<String> = value.iter().map(|x| format!("{:.8e}", x)).collect();
            format!("[{}]", entries.join(", "))
        }
    }
}

/// Write the evaluation order, one summary line per coupled group and the
/// value of every output.
pub fn write_listing(graph: &Graph, report: &EvaluationReport, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Evaluation order: {}", report.order.join(" -> ")).map_err(report_error)?;

    if !report.groups.is_empty() {
        writeln!(out).map_err(report_error)?;
        writeln!(out, "Coupled groups").map_err(report_error)?;
        for group in &report.groups {
            writeln!(
                out,
                "  {} [{}]: {}, {} after {} iteration(s), residual {:.3e}",
                group.name,
                group.members.join(", "),
                strategy_name(group.strategy),
                group.status,
                group.iterations,
                group.final_residual()
            )
            .map_err(report_error)?;
        }
    }

    writeln!(out).map_err(report_error)?;
    writeln!(out, "Outputs").map_err(report_error)?;
    for (_, var) in graph.registry().iter() {
        if var.direction != Direction::Output {
            continue;
        }
        let unit = var.unit.as_deref().map(|u| format!(" {}", u)).unwrap_or_default();
        writeln!(
            out,
            "  {:<width$} {}{}",
            var.path,
            format_value(&var.value),
            unit,
            width = PATH_WIDTH
        )
        .map_err(report_error)?;
    }

    out.flush().map_err(report_error)
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Write the component graph in Graphviz DOT format.
///
/// Coupled units are drawn as clusters; each connection is an edge labelled
/// with the source and target variable names.
pub fn write_dot(graph: &Graph, schedule: &Schedule, out: &mut impl Write) -> Result<()> {
    writeln!(out, "digraph model {{").map_err(report_error)?;
    writeln!(out, "  rankdir=LR;").map_err(report_error)?;
    writeln!(out, "  node [shape=box];").map_err(report_error)?;

    for (i, unit) in schedule.units.iter().enumerate() {
        if unit.coupled {
            writeln!(out, "  subgraph cluster_{} {{", i).map_err(report_error)?;
            writeln!(out, "    label={};", quote(&unit.name)).map_err(report_error)?;
            writeln!(out, "    style=dashed;").map_err(report_error)?;
            for &id in &unit.members {
                writeln!(out, "    {};", quote(&graph.component(id).name)).map_err(report_error)?;
            }
            writeln!(out, "  }}").map_err(report_error)?;
        } else {
            for &id in &unit.members {
                writeln!(out, "  {};", quote(&graph.component(id).name)).map_err(report_error)?;
            }
        }
    }

    let registry = graph.registry();
    for conn in graph.connections() {
        let source = registry.variable(conn.source);
        let target = registry.variable(conn.target);
        let label = if source.name == target.name {
            source.name.clone()
        } else {
            format!("{} -> {}", source.name, target.name)
        };
        writeln!(
            out,
            "  {} -> {} [label={}];",
            quote(&graph.component(source.owner).name),
            quote(&graph.component(target.owner).name),
            quote(&label)
        )
        .map_err(report_error)?;
    }

    writeln!(out, "}}").map_err(report_error)?;
    out.flush().map_err(report_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ExecComp, IndepVar};
    use crate::solver::{Evaluator, SolverConfig};

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// `x` feeds a two-component cycle `a <-> b`.
    fn cyclic() -> Graph {
        let mut g = Graph::new();
        g.add_component("src", IndepVar::default().with_output("x", 2.0, Some("m")))
            .unwrap();
        g.add_component("a", ExecComp::new(&["y = 0.5 * x + 0.25 * u"]).unwrap())
            .unwrap();
        g.add_component("b", ExecComp::new(&["u = 0.5 * y"]).unwrap())
            .unwrap();
        g.connect("src.x", "a.x").unwrap();
        g.connect("a.y", "b.y").unwrap();
        g.connect("b.u", "a.u").unwrap();
        g
    }

    #[test]
    fn test_listing() {
        let mut g = cyclic();
        let mut evaluator = Evaluator::new(&g, SolverConfig::newton()).unwrap();
        let report = evaluator.run(&mut g).unwrap();

        let mut buf = Vec::new();
        write_listing(&g, &report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("Evaluation order: src -> cycle_a\n"));
        assert!(text.contains("cycle_a [a, b]: newton, converged after"));
        assert!(text.contains("src.x"));
        assert!(text.contains("2.00000000e0 m"));
        assert!(!text.contains("a.x "));
    }

    #[test]
    fn test_dot() {
        let g = cyclic();
        let schedule = Schedule::build(&g, &SolverConfig::default()).unwrap();

        let mut buf = Vec::new();
        write_dot(&g, &schedule, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("digraph model {"));
        assert!(text.contains("subgraph cluster_1 {"));
        assert!(text.contains("label=\"cycle_a\";"));
        assert!(text.contains("\"src\" -> \"a\" [label=\"x\"];"));
        assert!(text.contains("\"b\" -> \"a\" [label=\"u\"];"));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&[1.5]), "1.50000000e0");
        assert_eq!(format_value(&[1.0, -2.0]), "[1.00000000e0, -2.00000000e0]");
    }

    #[test]
    fn test_write_failure_is_report_error() {
        let g = cyclic();
        let report = EvaluationReport::default();
        let err = write_listing(&g, &report, &mut Broken).unwrap_err();
        assert!(matches!(err, MdoError::ReportError { .. }));
    }
}
