//! Error types for the MDO kernel.
//!
//! This module provides a unified error type [`MdoError`] that covers
//! configuration errors detected while the model is built, domain violations
//! raised by components, expression errors, and I/O failures.
//!
//! Numerical non-convergence is not an error on the evaluation
//! path: solvers report it as data (see [`crate::solver::EvaluationReport`]),
//! and only [`crate::solver::EvaluationReport::into_result`] turns it into
//! [`MdoError::NonConvergence`].

use thiserror::Error;

/// Result type alias using [`MdoError`].
pub type Result<T> = std::result::Result<T, MdoError>;

/// Unified error type for all kernel operations.
#[derive(Error, Debug)]
pub enum MdoError {
    // ============ Configuration Errors ============
    /// A variable name was declared twice within one component
    #[error("Duplicate variable name '{name}' in component '{component}'")]
    DuplicateName { component: String, name: String },

    /// A component name was used twice in one graph
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Component not found in the graph
    #[error("Component '{name}' not found")]
    UnknownComponent { name: String },

    /// Variable path did not resolve to a declared variable
    #[error("Variable '{path}' not found")]
    UnknownVariable { path: String },

    /// Target input already has an incoming connection
    #[error("Input '{target}' is already connected to '{existing}' (attempted source '{source_path}')")]
    MultipleSource {
        target: String,
        existing: String,
        source_path: String,
    },

    /// Source and target units are incompatible and no conversion was given
    #[error("Unit mismatch connecting '{source_path}' [{source_unit}] to '{target}' [{target_unit}]")]
    UnitMismatch {
        source_path: String,
        source_unit: String,
        target: String,
        target_unit: String,
    },

    /// An index map entry exceeds the source length
    #[error("Index {index} out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// Values have incompatible lengths
    #[error("Shape mismatch for '{path}': expected {expected}, got {actual}")]
    ShapeMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    /// Connection endpoints have the wrong direction
    #[error("Invalid connection from '{source_path}' to '{target}': {message}")]
    InvalidConnection {
        source_path: String,
        target: String,
        message: String,
    },

    /// Bounds on a design variable or constraint are inconsistent
    #[error("Malformed bounds for '{path}': {message}")]
    MalformedBounds { path: String, message: String },

    /// An implicit output sits in a group whose solver cannot drive its residual
    #[error("Residual for '{component}.{output}' has no solver able to converge it: {message}")]
    UnsolvedResidual {
        component: String,
        output: String,
        message: String,
    },

    /// A cycle crosses the boundary of a designated coupled group
    #[error("Cycle crosses group boundaries: {message}")]
    CycleAcrossGroups { message: String },

    /// A design variable does not reference an independent quantity
    #[error("Invalid design variable '{path}': {message}")]
    InvalidDesignVar { path: String, message: String },

    /// An objective was bound twice
    #[error("Objective already bound to '{existing}'")]
    DuplicateObjective { existing: String },

    /// The problem has no objective
    #[error("Problem has no objective")]
    MissingObjective,

    /// Invalid solver or differencing parameter
    #[error("Invalid solver configuration: {message}")]
    InvalidSolverConfig { message: String },

    /// Component option out of range or missing
    #[error("Invalid option '{option}' for component '{component}': {message}")]
    InvalidOption {
        component: String,
        option: String,
        message: String,
    },

    /// A component does not implement a method its kind requires
    #[error("Component '{component}' does not implement '{method}'")]
    MissingMethod { component: String, method: String },

    /// Component cannot be described as a serializable spec
    #[error("Component '{name}' has no serializable description")]
    NotSerializable { name: String },

    // ============ Domain Errors ============
    /// A component rejected its inputs as physically invalid
    #[error("Domain violation in '{component}': {message}")]
    Domain { component: String, message: String },

    // ============ Expression Errors ============
    /// Error during lexical analysis of an expression
    #[error("Lexer error at column {column}: {message}")]
    LexerError { column: usize, message: String },

    /// Error while parsing an expression
    #[error("Parse error at column {column}: {message}")]
    ParseError { column: usize, message: String },

    /// Semantic error in an expression (unknown function, bad arity, ...)
    #[error("Expression error in '{expr}': {message}")]
    ExprError { expr: String, message: String },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular Jacobian - a residual may not depend on any unknown")]
    SingularMatrix,

    /// A coupled group did not converge
    #[error("Group '{group}' {status} after {iterations} iterations (residual: {residual:.2e})")]
    NonConvergence {
        group: String,
        status: String,
        iterations: usize,
        residual: f64,
    },

    // ============ I/O Errors ============
    /// Error reading a model description file
    #[error("Failed to read model file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing a report
    #[error("Report output error: {message}")]
    ReportError { message: String },

    /// Error (de)serializing a model description
    #[error("Model description error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MdoError {
    /// Create a lexer error
    pub fn lexer(column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(column: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            column,
            message: message.into(),
        }
    }

    /// Create a domain violation error
    pub fn domain(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a malformed bounds error
    pub fn malformed_bounds(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedBounds {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(
        component: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            component: component.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    /// Create a missing method error
    pub fn missing_method(component: impl Into<String>, method: impl Into<String>) -> Self {
        Self::MissingMethod {
            component: component.into(),
            method: method.into(),
        }
    }

    /// Create an invalid solver configuration error
    pub fn solver_config(message: impl Into<String>) -> Self {
        Self::InvalidSolverConfig {
            message: message.into(),
        }
    }

    /// Check whether this error was raised while building the model.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. }
                | Self::DuplicateComponent { .. }
                | Self::UnknownComponent { .. }
                | Self::UnknownVariable { .. }
                | Self::MultipleSource { .. }
                | Self::UnitMismatch { .. }
                | Self::IndexOutOfRange { .. }
                | Self::ShapeMismatch { .. }
                | Self::InvalidConnection { .. }
                | Self::MalformedBounds { .. }
                | Self::UnsolvedResidual { .. }
                | Self::CycleAcrossGroups { .. }
                | Self::InvalidDesignVar { .. }
                | Self::DuplicateObjective { .. }
                | Self::MissingObjective
                | Self::InvalidSolverConfig { .. }
                | Self::InvalidOption { .. }
                | Self::MissingMethod { .. }
        )
    }

    /// Check whether this error is a domain violation raised by a component.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain { .. })
    }
}
