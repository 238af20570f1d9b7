//! Error types for the ATSP solver.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Every failure the solver can report to its caller.
#[derive(Debug, Error)]
pub enum SolverError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (config or solution) error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TSPLIB input.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Two structures that must agree on the number of cities do not.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Number of cities expected.
        expected: usize,
        /// Number of cities found.
        found: usize,
    },

    /// Distance or bias matrix unusable (empty, non-square, negative, non-finite).
    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),

    /// Solver parameters out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A non-root vertex has no incoming edge, so no spanning arborescence exists.
    #[error("vertex {vertex} has no incoming edge: graph has no spanning arborescence")]
    MissingParent {
        /// Original id of the unreachable vertex.
        vertex: usize,
    },

    /// Requested root is not a vertex of the graph.
    #[error("root {root} is out of range for a graph with {vertices} vertices")]
    InvalidRoot {
        /// Requested root.
        root: usize,
        /// Number of vertices in the graph.
        vertices: usize,
    },
}
