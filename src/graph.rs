//! Directed graph model over a dense distance matrix.
//!
//! Vertices are plain indices `0..n`; edges are stored in an arena and
//! addressed by their position, so algorithms can refer to an edge without
//! hashing it.

use serde::{Deserialize, Serialize};

use crate::instance::DistanceMatrix;

/// Directed edge `from -> to` between two city indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
}

impl Edge {
    pub fn new(from: usize, to: usize) -> Self {
        Edge { from, to }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} -> {})", self.from, self.to)
    }
}

/// Weighted directed graph with an edge arena.
#[derive(Debug, Clone, Default)]
pub struct Digraph {
    vertex_count: usize,
    edges: Vec<Edge>,
    weights: Vec<f64>,
}

impl Digraph {
    /// Empty graph on `vertex_count` vertices.
    pub fn new(vertex_count: usize) -> Self {
        Digraph {
            vertex_count,
            edges: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Complete digraph over a distance matrix. The diagonal is skipped:
    /// self-loops can never be part of a tour or an arborescence.
    pub fn from_matrix(matrix: &DistanceMatrix) -> Self {
        let n = matrix.size();
        let mut graph = Digraph::new(n);
        graph.edges.reserve(n * n.saturating_sub(1));
        graph.weights.reserve(n * n.saturating_sub(1));
        for from in 0..n {
            for to in 0..n {
                if from != to {
                    graph.add_edge(from, to, matrix.get(from, to));
                }
            }
        }
        graph
    }

    /// Appends an edge and returns its arena index.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is not a vertex of the graph.
    pub fn add_edge(&mut self, from: usize, to: usize, weight: f64) -> usize {
        assert!(
            from < self.vertex_count && to < self.vertex_count,
            "edge ({}, {}) out of range for {} vertices",
            from,
            to,
            self.vertex_count
        );
        self.edges.push(Edge::new(from, to));
        self.weights.push(weight);
        self.edges.len() - 1
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn edge(&self, index: usize) -> Edge {
        self.edges[index]
    }

    #[inline]
    pub fn weight(&self, index: usize) -> f64 {
        self.weights[index]
    }

    /// Iterator over `(edge, weight)` pairs in insertion order.
    pub fn weighted_edges(&self) -> impl Iterator<Item = (Edge, f64)> + '_ {
        self.edges.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Dense 0/1 indicator matrix of an edge set: entry `[from][to]` is 1 when the
/// edge is present.
pub fn edges_to_matrix(edges: &[Edge], size: usize) -> Vec<Vec<f64>> {
    let mut matrix = vec![vec![0.0; size]; size];
    for edge in edges {
        matrix[edge.from][edge.to] = 1.0;
    }
    matrix
}

/// Edges marked by a non-zero entry of an indicator matrix, in row-major order.
pub fn matrix_to_edges(matrix: &[Vec<f64>]) -> Vec<Edge> {
    matrix
        .iter()
        .enumerate()
        .flat_map(|(from, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, &value)| value != 0.0)
                .map(move |(to, _)| Edge::new(from, to))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_matrix_skips_diagonal() {
        let m = DistanceMatrix::from_rows(&[
            vec![0.0, 1.0, 2.0],
            vec![3.0, 0.0, 4.0],
            vec![5.0, 6.0, 0.0],
        ])
        .unwrap();
        let g = Digraph::from_matrix(&m);
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 6);
        assert!(g.edges().iter().all(|e| e.from != e.to));
        let (edge, weight) = g.weighted_edges().nth(2).unwrap();
        assert_eq!(edge, Edge::new(1, 0));
        assert_eq!(weight, 3.0);
    }

    #[test]
    fn test_indicator_matrix_round_trip() {
        let edges = vec![Edge::new(0, 2), Edge::new(2, 1)];
        let matrix = edges_to_matrix(&edges, 3);
        assert_eq!(matrix[0][2], 1.0);
        assert_eq!(matrix[1][0], 0.0);
        assert_eq!(matrix_to_edges(&matrix), edges);
    }

    #[test]
    #[should_panic]
    fn test_add_edge_out_of_range() {
        let mut g = Digraph::new(2);
        g.add_edge(0, 2, 1.0);
    }
}
