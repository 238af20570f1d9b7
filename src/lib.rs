//! ATSP Solver Library
//!
//! A heuristic solver for the Asymmetric Traveling Salesman Problem (ATSP).
//!
//! # Features
//!
//! - Edmonds' minimum spanning arborescence with cycle contraction
//! - Composite MSA (CMSA): edge usage counts over one arborescence per root
//! - MAX-MIN Ant System whose tour construction is biased by the CMSA
//! - Reduced (reversal-free) 3-opt with candidate lists and don't-look bits
//! - CSV caching of arborescences and benchmarking tools
//!
//! # Example
//!
//! ```no_run
//! use atsp_cmsa_mmas::instance::AtspInstance;
//! use atsp_cmsa_mmas::arborescence::Cmsa;
//! use atsp_cmsa_mmas::heuristics::aco::{MaxMinAntSystem, MmasConfig};
//!
//! // Load instance
//! let instance = AtspInstance::from_file("ftv33.atsp").unwrap();
//!
//! // Build the CMSA once per instance
//! let cmsa = Cmsa::build(&instance.distances).unwrap();
//!
//! // Run the colony
//! let config = MmasConfig::for_dimension(instance.dimension);
//! let solution = MaxMinAntSystem::new(&instance.distances, &cmsa, config)
//!     .unwrap()
//!     .with_target(instance.known_optimum)
//!     .run();
//!
//! println!("Solution cost: {:.2}", solution.cost);
//! ```

pub mod arborescence;
pub mod benchmark;
pub mod error;
pub mod graph;
pub mod heuristics;
pub mod instance;
pub mod solution;

pub use arborescence::{Arborescence, Cmsa};
pub use error::{Result, SolverError};
pub use instance::{AtspInstance, DistanceMatrix};
pub use solution::Solution;
