//! Edmonds' algorithm for the minimum spanning arborescence.
//!
//! Every non-root vertex picks its cheapest incoming edge. If those choices
//! contain a cycle, the cycle is contracted into a single super-vertex, the
//! edges entering it are reweighted by the cycle edge they would replace, and
//! the smaller problem is solved recursively. Expanding the result puts the
//! cycle back minus the one edge displaced by the edge entering the cycle.
//!
//! Each level renumbers its vertices `0..m` (the super-vertex always takes the
//! last index), and every arc remembers its position in the parent level, so
//! no edge ever needs hashing and synthetic ids cannot collide.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::graph::{Digraph, Edge};
use crate::instance::DistanceMatrix;

const NO_ARC: usize = usize::MAX;

/// A spanning arborescence rooted at `root`: every other vertex has exactly
/// one incoming edge and following parents always ends at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arborescence {
    root: usize,
    edges: Vec<Edge>,
    weight: f64,
}

impl Arborescence {
    /// Wraps an edge set produced elsewhere (e.g. read back from a cache),
    /// pricing it against `distances`.
    pub fn from_edges(root: usize, mut edges: Vec<Edge>, distances: &DistanceMatrix) -> Self {
        edges.sort_unstable();
        let weight = edges.iter().map(|e| distances.get(e.from, e.to)).sum();
        Arborescence { root, edges, weight }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Edges sorted by `(from, to)`.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Total weight of the edges.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of vertices without children.
    pub fn leaf_count(&self, vertex_count: usize) -> usize {
        let mut has_child = vec![false; vertex_count];
        for edge in &self.edges {
            has_child[edge.from] = true;
        }
        has_child.iter().filter(|&&c| !c).count()
    }

    /// Checks the structural invariants: `vertex_count - 1` edges, in-degree 0
    /// at the root, in-degree 1 elsewhere, and no cycle.
    pub fn is_valid(&self, vertex_count: usize) -> bool {
        if self.root >= vertex_count || self.edges.len() + 1 != vertex_count {
            return false;
        }

        let mut parent = vec![NO_ARC; vertex_count];
        for edge in &self.edges {
            if edge.from >= vertex_count || edge.to >= vertex_count || edge.to == self.root {
                return false;
            }
            if parent[edge.to] != NO_ARC {
                return false;
            }
            parent[edge.to] = edge.from;
        }

        // Every vertex must reach the root in fewer than `vertex_count` steps.
        (0..vertex_count).all(|start| {
            let mut v = start;
            for _ in 0..vertex_count {
                if v == self.root {
                    return true;
                }
                v = parent[v];
                if v == NO_ARC {
                    return false;
                }
            }
            v == self.root
        })
    }
}

/// One arc of a (possibly contracted) sub-problem. `origin` is the position of
/// the arc it stands for in the parent level's arc list.
#[derive(Debug, Clone, Copy)]
struct Arc {
    from: usize,
    to: usize,
    weight: f64,
    origin: usize,
}

/// Minimum-weight spanning arborescence of `graph` rooted at `root`.
///
/// Edges into the root and self-loops are ignored. Among equal-weight
/// incoming edges the first one in arena order wins.
///
/// Fails with [`SolverError::MissingParent`] when some vertex cannot be
/// reached from the root.
pub fn find_msa(graph: &Digraph, root: usize) -> Result<Arborescence> {
    let n = graph.vertex_count();
    if root >= n {
        return Err(SolverError::InvalidRoot { root, vertices: n });
    }

    let arcs: Vec<Arc> = graph
        .weighted_edges()
        .enumerate()
        .filter(|(_, (edge, _))| edge.to != root && edge.from != edge.to)
        .map(|(index, (edge, weight))| Arc {
            from: edge.from,
            to: edge.to,
            weight,
            origin: index,
        })
        .collect();

    let chosen = solve(n, root, arcs, (0..n).collect())?;

    let mut edges: Vec<Edge> = chosen.iter().map(|arc| graph.edge(arc.origin)).collect();
    edges.sort_unstable();
    let weight = chosen.iter().map(|arc| graph.weight(arc.origin)).sum();

    Ok(Arborescence { root, edges, weight })
}

/// Convenience wrapper running [`find_msa`] on the complete digraph of a matrix.
pub fn find_msa_in_matrix(distances: &DistanceMatrix, root: usize) -> Result<Arborescence> {
    find_msa(&Digraph::from_matrix(distances), root)
}

/// Solves one level. `labels[v]` is an original vertex id represented by
/// level vertex `v`, used for error reporting. Returns the chosen arcs of
/// this level.
fn solve(vertex_count: usize, root: usize, arcs: Vec<Arc>, labels: Vec<usize>) -> Result<Vec<Arc>> {
    // Cheapest incoming arc per vertex, first seen wins ties.
    let mut parent_arc = vec![NO_ARC; vertex_count];
    for (pos, arc) in arcs.iter().enumerate() {
        debug_assert!(arc.to != root && arc.from != arc.to);
        let best = parent_arc[arc.to];
        if best == NO_ARC || arc.weight < arcs[best].weight {
            parent_arc[arc.to] = pos;
        }
    }

    let mut parent = vec![NO_ARC; vertex_count];
    for v in 0..vertex_count {
        if v == root {
            continue;
        }
        if parent_arc[v] == NO_ARC {
            return Err(SolverError::MissingParent { vertex: labels[v] });
        }
        parent[v] = arcs[parent_arc[v]].from;
    }

    let Some(cycle_vertex) = find_cycle(root, &parent) else {
        return Ok((0..vertex_count)
            .filter(|&v| v != root)
            .map(|v| arcs[parent_arc[v]])
            .collect());
    };

    let mut in_cycle = vec![false; vertex_count];
    let mut cycle = Vec::new();
    let mut v = cycle_vertex;
    loop {
        in_cycle[v] = true;
        cycle.push(v);
        v = parent[v];
        if v == cycle_vertex {
            break;
        }
    }

    // Renumber: vertices outside the cycle keep their relative order, the
    // super-vertex goes last.
    let mut remap = vec![0usize; vertex_count];
    let mut child_labels = Vec::with_capacity(vertex_count - cycle.len() + 1);
    for v in 0..vertex_count {
        if !in_cycle[v] {
            remap[v] = child_labels.len();
            child_labels.push(labels[v]);
        }
    }
    let super_vertex = child_labels.len();
    child_labels.push(labels[cycle_vertex]);
    for &v in &cycle {
        remap[v] = super_vertex;
    }
    let child_count = super_vertex + 1;

    let mut child_arcs = Vec::with_capacity(arcs.len());
    let mut entering = vec![NO_ARC; child_count];
    let mut leaving = vec![NO_ARC; child_count];

    for (pos, arc) in arcs.iter().enumerate() {
        match (in_cycle[arc.from], in_cycle[arc.to]) {
            (false, true) => {
                let replaced = arcs[parent_arc[arc.to]].weight;
                let candidate = Arc {
                    from: remap[arc.from],
                    to: super_vertex,
                    weight: arc.weight - replaced,
                    origin: pos,
                };
                keep_cheapest(&mut child_arcs, &mut entering[candidate.from], candidate);
            }
            (true, false) => {
                let candidate = Arc {
                    from: super_vertex,
                    to: remap[arc.to],
                    weight: arc.weight,
                    origin: pos,
                };
                keep_cheapest(&mut child_arcs, &mut leaving[candidate.to], candidate);
            }
            (false, false) => child_arcs.push(Arc {
                from: remap[arc.from],
                to: remap[arc.to],
                weight: arc.weight,
                origin: pos,
            }),
            (true, true) => {}
        }
    }

    let child_tree = solve(child_count, remap[root], child_arcs, child_labels)?;

    let mut result = Vec::with_capacity(vertex_count - 1);
    let mut entry_vertex = NO_ARC;
    for child in &child_tree {
        let original = arcs[child.origin];
        if child.to == super_vertex {
            entry_vertex = original.to;
        }
        result.push(original);
    }
    if entry_vertex == NO_ARC {
        return Err(SolverError::MissingParent {
            vertex: labels[cycle_vertex],
        });
    }

    // The entering arc displaces the cycle arc into the same vertex.
    for &v in &cycle {
        if v != entry_vertex {
            result.push(arcs[parent_arc[v]]);
        }
    }

    Ok(result)
}

/// Keeps a single arc per slot: the first one seen unless a strictly cheaper
/// one comes along.
fn keep_cheapest(arcs: &mut Vec<Arc>, slot: &mut usize, candidate: Arc) {
    if *slot == NO_ARC {
        *slot = arcs.len();
        arcs.push(candidate);
    } else if candidate.weight < arcs[*slot].weight {
        arcs[*slot] = candidate;
    }
}

/// Follows parent pointers from every vertex. A vertex revisited within the
/// same walk lies on a cycle; walks that end at the root or at a vertex
/// stamped by an earlier walk are cycle-free.
fn find_cycle(root: usize, parent: &[usize]) -> Option<usize> {
    let mut stamp = vec![0usize; parent.len()];
    for start in 0..parent.len() {
        if start == root || stamp[start] != 0 {
            continue;
        }
        let mark = start + 1;
        let mut v = start;
        while v != root && stamp[v] == 0 {
            stamp[v] = mark;
            v = parent[v];
        }
        if v != root && stamp[v] == mark {
            return Some(v);
        }
    }
    None
}
