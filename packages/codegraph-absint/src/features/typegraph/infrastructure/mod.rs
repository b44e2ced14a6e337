//! Queries over the program arena

mod path_finder;
mod solver;
mod walker;

pub use path_finder::PathFinder;
pub use solver::{Solver, SolverOutcome};
pub use walker::{ProvenanceStep, ProvenanceWalker};
