//! Composite minimum spanning arborescence (CMSA).
//!
//! One minimum arborescence is computed per root city and the CMSA records,
//! for every ordered pair of cities, how many of those arborescences use the
//! edge. Edges shared by many arborescences are likely to appear in short
//! tours, which is what the ant colony exploits.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arborescence::edmonds::{find_msa, Arborescence};
use crate::error::{Result, SolverError};
use crate::graph::Digraph;
use crate::instance::DistanceMatrix;

/// How raw occurrence counts are turned into CMSA values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum CmsaWeighting {
    /// The plain number of arborescences containing the edge.
    #[default]
    Count,
    /// The count raised to the given positive exponent.
    Power(f64),
}

impl CmsaWeighting {
    fn apply(self, count: u32) -> f64 {
        if count == 0 {
            return 0.0;
        }
        match self {
            CmsaWeighting::Count => f64::from(count),
            CmsaWeighting::Power(exponent) => f64::from(count).powf(exponent),
        }
    }

    fn validate(self) -> Result<()> {
        match self {
            CmsaWeighting::Power(exponent) if !(exponent.is_finite() && exponent > 0.0) => {
                Err(SolverError::InvalidConfig(format!(
                    "CMSA weighting exponent must be positive, got {}",
                    exponent
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Edge occurrence matrix over the per-root arborescences.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmsa {
    size: usize,
    values: Vec<f64>,
    arborescences: Vec<Arborescence>,
}

impl Cmsa {
    /// Builds the CMSA with plain occurrence counts.
    pub fn build(distances: &DistanceMatrix) -> Result<Self> {
        Self::build_with(distances, CmsaWeighting::Count)
    }

    /// Computes one arborescence per root in parallel and aggregates them.
    /// The result does not depend on the thread count.
    pub fn build_with(distances: &DistanceMatrix, weighting: CmsaWeighting) -> Result<Self> {
        weighting.validate()?;
        let n = distances.size();
        let graph = Digraph::from_matrix(distances);

        let arborescences = (0..n)
            .into_par_iter()
            .map(|root| find_msa(&graph, root))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("computed {} arborescences for {} cities", arborescences.len(), n);
        Self::from_arborescences(n, arborescences, weighting)
    }

    /// Aggregates already computed arborescences.
    pub fn from_arborescences(
        size: usize,
        arborescences: Vec<Arborescence>,
        weighting: CmsaWeighting,
    ) -> Result<Self> {
        weighting.validate()?;
        let mut counts = vec![0u32; size * size];
        for arborescence in &arborescences {
            for edge in arborescence.edges() {
                if edge.from >= size || edge.to >= size {
                    return Err(SolverError::DimensionMismatch {
                        expected: size,
                        found: edge.from.max(edge.to) + 1,
                    });
                }
                counts[edge.from * size + edge.to] += 1;
            }
        }

        Ok(Cmsa {
            size,
            values: counts.into_iter().map(|c| weighting.apply(c)).collect(),
            arborescences,
        })
    }

    /// Accepts a precomputed bias matrix. Entries must be finite and
    /// non-negative.
    pub fn from_matrix(rows: &[Vec<f64>]) -> Result<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != size {
                return Err(SolverError::InvalidMatrix(format!(
                    "CMSA row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    size
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(SolverError::InvalidMatrix(format!(
                    "CMSA entry {} in row {} is not a non-negative number",
                    bad, i
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Cmsa {
            size,
            values,
            arborescences: Vec::new(),
        })
    }

    /// A CMSA with every entry zero. Biased selection over it degrades to the
    /// plain pheromone rule.
    pub fn zeros(size: usize) -> Self {
        Cmsa {
            size,
            values: vec![0.0; size * size],
            arborescences: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.values[from * self.size + to]
    }

    #[inline]
    pub fn row(&self, from: usize) -> &[f64] {
        &self.values[from * self.size..(from + 1) * self.size]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.chunks(self.size.max(1)).map(|r| r.to_vec()).collect()
    }

    /// Per-root arborescences, empty when built from a bare matrix.
    pub fn arborescences(&self) -> &[Arborescence] {
        &self.arborescences
    }

    /// Fraction of off-diagonal entries that are non-zero.
    pub fn density(&self) -> f64 {
        if self.size < 2 {
            return 0.0;
        }
        let used = self.values.iter().filter(|&&v| v > 0.0).count();
        used as f64 / (self.size * (self.size - 1)) as f64
    }

    /// Percentage of the tour's edges (closing edge included) that appear in
    /// at least one arborescence.
    pub fn commonality(&self, tour: &[usize]) -> f64 {
        if tour.is_empty() {
            return 0.0;
        }
        let shared = tour
            .iter()
            .zip(tour.iter().cycle().skip(1))
            .filter(|(&from, &to)| self.get(from, to) > 0.0)
            .count();
        100.0 * shared as f64 / tour.len() as f64
    }
}
