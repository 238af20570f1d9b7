//! Module for parsing and representing ATSP instances.
//!
//! This module handles the TSP-LIB `FULL_MATRIX` files used for the Asymmetric TSP.
//! It owns the dense distance matrix every algorithm reads from and the table of
//! known optimal tour lengths used as targets for deviation tracking.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{Result, SolverError};

/// Known optimal tour lengths of the TSPLIB ATSP instances.
const KNOWN_OPTIMA: &[(&str, f64)] = &[
    ("br17", 39.0),
    ("ft53", 6905.0),
    ("ft70", 38673.0),
    ("ftv33", 1286.0),
    ("ftv35", 1473.0),
    ("ftv38", 1530.0),
    ("ftv44", 1613.0),
    ("ftv47", 1776.0),
    ("ftv55", 1608.0),
    ("ftv64", 1839.0),
    ("ftv70", 1950.0),
    ("ftv170", 2755.0),
    ("p43", 5620.0),
    ("rbg323", 1326.0),
    ("rbg358", 1163.0),
    ("rbg403", 2465.0),
    ("rbg443", 2720.0),
    ("ry48p", 14422.0),
    ("atex1.atsp", 1812.0),
    ("atex3.atsp", 2952.0),
    ("atex4.atsp", 3218.0),
    ("atex5.atsp", 5269.0),
    ("crane100_0.atsp", 7777997.0),
    ("crane100_1.atsp", 7615069.0),
    ("crane100_2.atsp", 8062054.0),
    ("crane66_0.atsp", 6277167.0),
    ("crane66_1.atsp", 6308822.0),
    ("crane66_2.atsp", 6394833.0),
    ("code198.atsp", 4541.0),
    ("dc112.atsp", 11109.0),
    ("dc126.atsp", 123235.0),
    ("dc134.atsp", 5612.0),
    ("dc176.atsp", 8587.0),
    ("dc188.atsp", 10225.0),
    ("ftv90.atsp", 1579.0),
    ("ftv100.atsp", 1788.0),
    ("ftv110.atsp", 1958.0),
    ("ftv120.atsp", 2166.0),
    ("ftv130.atsp", 2307.0),
    ("ftv140.atsp", 2420.0),
    ("ftv150.atsp", 2611.0),
    ("ftv160.atsp", 2683.0),
    ("td100_1.atsp", 268636.0),
];

/// Look up the known optimal tour length of a TSPLIB instance by name.
pub fn known_optimum(name: &str) -> Option<f64> {
    KNOWN_OPTIMA
        .iter()
        .find(|(known, _)| *known == name)
        .map(|&(_, length)| length)
}

/// A dense N×N matrix of directed arc costs stored in row-major order.
///
/// `get(i, j)` is the cost of travelling from `i` to `j`; the matrix is not
/// required to be symmetric and the diagonal is never read by the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    /// Creates a matrix from nested rows, rejecting empty, ragged,
    /// negative or non-finite input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let size = rows.len();
        if size == 0 {
            return Err(SolverError::InvalidMatrix("matrix is empty".to_string()));
        }
        let mut data = Vec::with_capacity(size * size);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != size {
                return Err(SolverError::InvalidMatrix(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    size
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_data(size, data)
    }

    /// Creates a matrix from a flat row-major buffer of `size * size` values.
    pub fn from_data(size: usize, data: Vec<f64>) -> Result<Self> {
        if size == 0 {
            return Err(SolverError::InvalidMatrix("matrix is empty".to_string()));
        }
        if data.len() != size * size {
            return Err(SolverError::DimensionMismatch {
                expected: size * size,
                found: data.len(),
            });
        }
        if let Some(pos) = data.iter().position(|d| !d.is_finite() || *d < 0.0) {
            return Err(SolverError::InvalidMatrix(format!(
                "entry ({}, {}) = {} is not a finite non-negative distance",
                pos / size,
                pos % size,
                data[pos]
            )));
        }
        Ok(DistanceMatrix { data, size })
    }

    /// Cost of the arc `from -> to`.
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    /// Outgoing arc costs of `from`.
    #[inline]
    pub fn row(&self, from: usize) -> &[f64] {
        &self.data[from * self.size..(from + 1) * self.size]
    }

    /// Number of cities.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if the matrix is symmetric within the given tolerance.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.size).all(|i| {
            (i + 1..self.size).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= tol)
        })
    }

    /// Cyclic length of a tour: the sum of its arcs including the closing arc
    /// from the last city back to the first.
    pub fn tour_length(&self, tour: &[usize]) -> f64 {
        if tour.len() < 2 {
            return 0.0;
        }

        let mut length = 0.0;
        for pair in tour.windows(2) {
            length += self.get(pair[0], pair[1]);
        }

        length + self.get(tour[tour.len() - 1], tour[0])
    }
}

/// Represents a complete ATSP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtspInstance {
    /// Name of the instance
    pub name: String,
    /// Comment/description
    pub comment: String,
    /// Number of cities
    pub dimension: usize,
    /// Arc costs
    pub distances: DistanceMatrix,
    /// Known optimal (or target) tour length, if any
    pub known_optimum: Option<f64>,
}

impl AtspInstance {
    /// Builds an instance from an in-memory matrix.
    pub fn new(name: &str, distances: DistanceMatrix) -> Self {
        AtspInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension: distances.size(),
            known_optimum: known_optimum(name),
            distances,
        }
    }

    /// Parse an ATSP instance from a TSP-LIB format file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        Self::from_reader(BufReader::new(file))
    }

    fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut name = String::new();
        let mut comment = String::new();
        let mut dimension: Option<usize> = None;
        let mut values: Vec<f64> = Vec::new();
        let mut in_weights = false;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            let line_no = index + 1;

            if line.is_empty() {
                continue;
            }
            if line.starts_with("EOF") {
                break;
            }

            if in_weights {
                for token in line.split_whitespace() {
                    let value: f64 = token.parse().map_err(|_| SolverError::Parse {
                        line: line_no,
                        message: format!("invalid distance '{}'", token),
                    })?;
                    values.push(value);
                }
                continue;
            }

            if line.starts_with("EDGE_WEIGHT_SECTION") {
                in_weights = true;
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(SolverError::Parse {
                    line: line_no,
                    message: format!("unexpected line '{}'", line),
                });
            };
            let value = value.trim();

            match key.trim() {
                "NAME" => name = value.to_string(),
                "COMMENT" => comment = value.to_string(),
                "DIMENSION" => {
                    dimension = Some(value.parse().map_err(|_| SolverError::Parse {
                        line: line_no,
                        message: format!("invalid dimension '{}'", value),
                    })?);
                }
                "EDGE_WEIGHT_FORMAT" if value != "FULL_MATRIX" => {
                    return Err(SolverError::Parse {
                        line: line_no,
                        message: format!("unsupported edge weight format '{}'", value),
                    });
                }
                _ => {}
            }
        }

        let dimension = dimension.ok_or_else(|| SolverError::Parse {
            line: 0,
            message: "missing DIMENSION header".to_string(),
        })?;

        if values.len() != dimension * dimension {
            return Err(SolverError::DimensionMismatch {
                expected: dimension * dimension,
                found: values.len(),
            });
        }

        let distances = DistanceMatrix::from_data(dimension, values)?;
        let mut instance = AtspInstance::new(&name, distances);
        instance.comment = comment;
        Ok(instance)
    }

    /// Get the distance between two cities
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distances.get(i, j)
    }

    /// Calculate total tour length (cyclic)
    pub fn tour_length(&self, tour: &[usize]) -> f64 {
        self.distances.tour_length(tour)
    }

    /// Get statistics about the off-diagonal arc costs of the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.dimension;
        let mut arcs = Vec::with_capacity(n * n.saturating_sub(1));
        let mut asymmetric_pairs = 0usize;
        let mut pairs = 0usize;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                arcs.push(self.distance(i, j));
                if i < j {
                    pairs += 1;
                    if (self.distance(i, j) - self.distance(j, i)).abs() > 1e-9 {
                        asymmetric_pairs += 1;
                    }
                }
            }
        }

        if arcs.is_empty() {
            return InstanceStatistics {
                name: self.name.clone(),
                dimension: n,
                ..Default::default()
            };
        }

        let mean = arcs.iter().mean();
        let std_dev = arcs.iter().population_std_dev();
        let (skewness, kurtosis) = if std_dev > 0.0 {
            let count = arcs.len() as f64;
            let third = arcs.iter().map(|d| (d - mean).powi(3)).sum::<f64>() / count;
            let fourth = arcs.iter().map(|d| (d - mean).powi(4)).sum::<f64>() / count;
            (third / std_dev.powi(3), fourth / std_dev.powi(4) - 3.0)
        } else {
            (0.0, 0.0)
        };

        InstanceStatistics {
            name: self.name.clone(),
            dimension: n,
            min_distance: arcs.iter().cloned().fold(f64::INFINITY, f64::min),
            max_distance: arcs.iter().cloned().fold(0.0, f64::max),
            avg_distance: mean,
            std_distance: std_dev,
            skewness,
            kurtosis,
            asymmetry: if pairs > 0 {
                asymmetric_pairs as f64 / pairs as f64
            } else {
                0.0
            },
            known_optimum: self.known_optimum,
        }
    }
}

impl std::str::FromStr for AtspInstance {
    type Err = SolverError;

    /// Parse an ATSP instance from TSP-LIB text.
    fn from_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }
}

/// Statistics about an ATSP instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub min_distance: f64,
    pub max_distance: f64,
    pub avg_distance: f64,
    pub std_distance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Share of city pairs whose two directions differ
    pub asymmetry: f64,
    pub known_optimum: Option<f64>,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Cities: {}", self.dimension)?;
        match self.known_optimum {
            Some(opt) => writeln!(f, "  Known optimum: {:.0}", opt)?,
            None => writeln!(f, "  Known optimum: -")?,
        }
        writeln!(f, "  Min distance: {:.2}", self.min_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Std deviation: {:.2}", self.std_distance)?;
        writeln!(f, "  Skewness: {:.3}", self.skewness)?;
        writeln!(f, "  Kurtosis: {:.3}", self.kurtosis)?;
        writeln!(f, "  Asymmetric pairs: {:.1}%", self.asymmetry * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_ATSP: &str = "NAME: small4
TYPE: ATSP
COMMENT: four cities
DIMENSION: 4
EDGE_WEIGHT_TYPE: EXPLICIT
EDGE_WEIGHT_FORMAT: FULL_MATRIX
EDGE_WEIGHT_SECTION
 9999 1 9 9
 1 9999 1 9
 9 1 9999
 1 1 9 1 9999
EOF
";

    #[test]
    fn test_parse_full_matrix() {
        let instance = SMALL_ATSP.parse::<AtspInstance>().unwrap();
        assert_eq!(instance.name, "small4");
        assert_eq!(instance.comment, "four cities");
        assert_eq!(instance.dimension, 4);
        assert_eq!(instance.distance(0, 1), 1.0);
        assert_eq!(instance.distance(3, 2), 1.0);
        assert_eq!(instance.distance(2, 0), 9.0);
        assert!(instance.known_optimum.is_none());
    }

    #[test]
    fn test_parse_spaced_header_and_known_optimum() {
        let text = "NAME : br17\nDIMENSION : 2\nEDGE_WEIGHT_SECTION\n0 3\n4 0\nEOF\n";
        let instance: AtspInstance = text.parse().unwrap();
        assert_eq!(instance.name, "br17");
        assert_eq!(instance.known_optimum, Some(39.0));
    }

    #[test]
    fn test_parse_rejects_wrong_value_count() {
        let text = "NAME: bad\nDIMENSION: 3\nEDGE_WEIGHT_SECTION\n0 1 2\n3 0 4\nEOF\n";
        let err = text.parse::<AtspInstance>().unwrap_err();
        assert!(matches!(
            err,
            SolverError::DimensionMismatch { expected: 9, found: 6 }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_token() {
        let text = "NAME: bad\nDIMENSION: 2\nEDGE_WEIGHT_SECTION\n0 x\n1 0\nEOF\n";
        let err = text.parse::<AtspInstance>().unwrap_err();
        assert!(matches!(err, SolverError::Parse { line: 4, .. }));
    }

    #[test]
    fn test_parse_rejects_unsupported_format() {
        let text = "NAME: bad\nDIMENSION: 2\nEDGE_WEIGHT_FORMAT: UPPER_ROW\nEDGE_WEIGHT_SECTION\n1\nEOF\n";
        assert!(matches!(
            text.parse::<AtspInstance>(),
            Err(SolverError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_matrix_validation() {
        assert!(DistanceMatrix::from_rows(&[]).is_err());
        assert!(DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0]]).is_err());
        assert!(DistanceMatrix::from_rows(&[vec![0.0, -1.0], vec![1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_rows(&[vec![0.0, f64::NAN], vec![1.0, 0.0]]).is_err());
        assert!(DistanceMatrix::from_rows(&[vec![0.0, 2.0], vec![3.0, 0.0]]).is_ok());
    }

    #[test]
    fn test_tour_length_is_cyclic() {
        let m = DistanceMatrix::from_rows(&[
            vec![0.0, 1.0, 5.0],
            vec![5.0, 0.0, 2.0],
            vec![3.0, 5.0, 0.0],
        ])
        .unwrap();
        assert_eq!(m.tour_length(&[0, 1, 2]), 6.0);
        assert_eq!(m.tour_length(&[0, 2, 1]), 15.0);
        assert!(!m.is_symmetric(1e-9));
    }

    #[test]
    fn test_statistics() {
        let instance = SMALL_ATSP.parse::<AtspInstance>().unwrap();
        let stats = instance.statistics();
        assert_eq!(stats.dimension, 4);
        assert_eq!(stats.min_distance, 1.0);
        assert_eq!(stats.max_distance, 9.0);
        assert!(stats.asymmetry > 0.0);
        assert!(stats.to_string().contains("small4"));
    }
}
