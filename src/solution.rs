//! Solution representation for ATSP runs.
//!
//! A `Solution` carries the best tour found together with the diagnostics an
//! experiment driver needs afterwards: when the best tour was found, how far
//! each iteration was from the target, and how much work local search did.

use serde::{Deserialize, Serialize};

/// Represents the result of one solver run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Best tour as a permutation of `0..n`, read as a cycle starting at city 0
    pub tour: Vec<usize>,
    /// Length of `tour`, closing edge included (0 while the tour is empty)
    pub cost: f64,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Iterations actually executed
    pub iterations: usize,
    /// Iteration (0-based) at which `tour` was found
    pub best_at_iteration: usize,
    /// Known or requested optimum the run was measured against
    pub target_length: Option<f64>,
    /// Percentage above the target of each iteration's best tour
    pub deviation_per_iteration: Vec<f64>,
    /// Best-so-far length after each iteration
    pub best_cost_per_iteration: Vec<f64>,
    /// Moves accepted by 3-opt over the whole run
    pub three_opt_improvements: usize,
    /// Number of pheromone restarts
    pub restarts: usize,
    /// Whether the run stopped because the target was matched
    pub reached_target: bool,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution {
            tour: Vec::new(),
            cost: 0.0,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: 0,
            best_at_iteration: 0,
            target_length: None,
            deviation_per_iteration: Vec::new(),
            best_cost_per_iteration: Vec::new(),
            three_opt_improvements: 0,
            restarts: 0,
            reached_target: false,
        }
    }

    /// Percentage above the target length, if one is known
    pub fn gap_to_target(&self) -> Option<f64> {
        self.target_length.map(|target| deviation(self.cost, target))
    }

    /// Rotates the tour so that it starts at `city`. The cycle is unchanged.
    pub fn rotate_to(&mut self, city: usize) {
        if let Some(pos) = self.tour.iter().position(|&c| c == city) {
            self.tour.rotate_left(pos);
        }
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.2}", self.cost)?;
        if let Some(gap) = self.gap_to_target() {
            writeln!(f, "  Gap to target: {:.3}%", gap)?;
        }
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        writeln!(f, "  Iterations: {} (best at {})", self.iterations, self.best_at_iteration)?;
        writeln!(f, "  3-opt improvements: {}", self.three_opt_improvements)?;
        writeln!(f, "  Restarts: {}", self.restarts)?;
        writeln!(f, "  Tour: {:?}", self.tour)
    }
}

/// Percentage by which `length` exceeds `target`.
pub fn deviation(length: f64, target: f64) -> f64 {
    100.0 * (length - target) / target
}

/// True if `tour` contains each of `0..n` exactly once.
pub fn is_permutation(tour: &[usize], n: usize) -> bool {
    if tour.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &city in tour {
        if city >= n || seen[city] {
            return false;
        }
        seen[city] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DistanceMatrix;

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.tour.is_empty());
        assert_eq!(sol.cost, 0.0);
        assert_eq!(sol.gap_to_target(), None);
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
    }

    #[test]
    fn test_gap_and_rotation() {
        let m = DistanceMatrix::from_rows(&[
            vec![0.0, 1.0, 5.0],
            vec![5.0, 0.0, 1.0],
            vec![1.0, 5.0, 0.0],
        ])
        .unwrap();
        let mut sol = Solution {
            tour: vec![1, 2, 0],
            cost: m.tour_length(&[1, 2, 0]),
            target_length: Some(2.0),
            ..Solution::new()
        };
        assert_eq!(sol.cost, 3.0);
        assert_eq!(sol.gap_to_target(), Some(50.0));

        sol.rotate_to(0);
        assert_eq!(sol.tour, vec![0, 1, 2]);
        assert_eq!(m.tour_length(&sol.tour), sol.cost);
    }

    #[test]
    fn test_json_round_trip() {
        let empty = Solution::new();
        let json = serde_json::to_string(&empty).unwrap();
        assert!(json.contains("\"best_at_iteration\":0"));
        let parsed: Solution = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cost, 0.0);

        let sol = Solution {
            tour: vec![0, 2, 1],
            cost: 12.5,
            target_length: Some(10.0),
            deviation_per_iteration: vec![40.0, 25.0],
            best_cost_per_iteration: vec![14.0, 12.5],
            reached_target: false,
            ..Solution::new()
        };
        let parsed: Solution = serde_json::from_str(&serde_json::to_string(&sol).unwrap()).unwrap();
        assert_eq!(parsed.tour, sol.tour);
        assert_eq!(parsed.cost, sol.cost);
        assert_eq!(parsed.target_length, Some(10.0));
        assert_eq!(parsed.best_cost_per_iteration, sol.best_cost_per_iteration);
    }
}
