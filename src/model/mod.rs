//! Model representation: components, variables, connections and the
//! execution schedule derived from them.
//!
//! A [`Graph`] owns every component instance and a [`VariableRegistry`] that
//! stores all variable values. Connections route an output into an input,
//! optionally through an index map and a unit conversion factor. The
//! [`Schedule`] partitions the graph into solve units.

mod connection;
mod graph;
mod registry;
mod schedule;
mod types;

pub use connection::{check_shapes, check_units, ConnectOptions, Connection};
pub use graph::{ComponentEntry, Graph, GroupDef, PlannedPartial};
pub use registry::{Variable, VariableRegistry};
pub use schedule::{Schedule, Unit};
pub use types::*;
