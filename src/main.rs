//! mdo - evaluate a multidisciplinary model description
//!
//! Loads a JSON model, converges every coupled group and prints the
//! resulting outputs.
//!
//! # Usage
//!
//! ```bash
//! mdo sellar.json --strategy gauss_seidel --set dvs.z=4,1 --dot sellar.dot -vv
//! ```

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use log::{LevelFilter, Log, Metadata, Record};
use mdo_core::{
    error::{MdoError, Result},
    model::Schedule,
    problem::{Driver, RunOnce},
    report,
    solver::{LineSearchConfig, Strategy},
    ModelSpec, Problem,
};

/// Evaluate an MDO model description
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the model description (.json)
    #[arg(value_name = "MODEL_FILE")]
    model_file: PathBuf,

    /// Nonlinear strategy for groups without their own solver
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Iteration cap per group
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Absolute residual tolerance
    #[arg(long)]
    atol: Option<f64>,

    /// Relative residual tolerance
    #[arg(long)]
    rtol: Option<f64>,

    /// Enable Newton backtracking line search
    #[arg(long)]
    line_search: bool,

    /// Override a value before evaluating, e.g. `dvs.z=4,1`
    #[arg(long = "set", value_name = "PATH=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, Vec<f64>)>,

    /// Also write the component graph in DOT format
    #[arg(long, value_name = "DOT_FILE")]
    dot: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    GaussSeidel,
    Newton,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::GaussSeidel => Strategy::GaussSeidel,
            StrategyArg::Newton => Strategy::Newton,
        }
    }
}

fn parse_assignment(s: &str) -> std::result::Result<(String, Vec<f64>), String> {
    let (path, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=VALUE, got '{}'", s))?;
    let values = value
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("'{}': {}", v, e)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((path.trim().to_string(), values))
}

/// Minimal logger writing `LEVEL target: message` lines to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Load the model and apply command line overrides
    let mut spec = ModelSpec::load(&args.model_file)?;
    if let Some(strategy) = args.strategy {
        spec.solver.strategy = strategy.into();
    }
    if let Some(max_iterations) = args.max_iterations {
        spec.solver.max_iterations = max_iterations;
    }
    if let Some(atol) = args.atol {
        spec.solver.atol = atol;
    }
    if let Some(rtol) = args.rtol {
        spec.solver.rtol = rtol;
    }
    if args.line_search {
        spec.solver.line_search = Some(LineSearchConfig::default());
    }
    for (path, value) in args.set {
        spec.values.insert(path, value);
    }

    let mut problem = Problem::from_spec(&spec)?;

    if let Some(path) = &args.dot {
        let schedule = Schedule::build(problem.graph(), problem.solver())?;
        let file = File::create(path).map_err(|e| MdoError::ReportError {
            message: format!("{}: {}", path.display(), e),
        })?;
        report::write_dot(problem.graph(), &schedule, &mut BufWriter::new(file))?;
    }

    // Evaluate, through the bindings when the model has an objective
    let (evaluation, point) = if problem.objective().is_some() {
        let point = RunOnce::new().run(&mut problem)?;
        (point.report.clone(), Some(point))
    } else {
        (problem.run()?, None)
    };

    report::write_listing(problem.graph(), &evaluation, &mut io::stdout().lock())?;

    if let Some(point) = point {
        println!();
        println!("Objective: {:.8e}", point.objective);
        let tol = problem.solver().atol.max(1e-8);
        for (path, value, satisfied) in problem.constraint_status(tol) {
            let mark = if satisfied { "ok" } else { "VIOLATED" };
            println!("  {:<24} {:.8e} {}", path, value, mark);
        }
    }

    evaluation.into_result()?;
    Ok(())
}
