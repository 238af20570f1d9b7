//! Heuristics module for ATSP.
//!
//! Candidate lists, reduced 3-opt local search, pheromone trails, per-ant
//! tour construction and the MAX-MIN Ant System that ties them together.

pub mod aco;
pub mod ant;
pub mod candidates;
pub mod local_search;
pub mod pheromone;

pub use aco::*;
pub use candidates::*;
pub use local_search::*;
