//! Nearest-neighbour candidate lists.

use ordered_float::OrderedFloat;

use crate::instance::DistanceMatrix;

/// For every city, the `width` other cities closest to it by outgoing
/// distance, nearest first. Ties are broken by city index.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLists {
    width: usize,
    neighbors: Vec<usize>,
}

impl CandidateLists {
    /// Builds lists of `k` neighbours per city. `k` is capped at `n - 1`.
    pub fn build(distances: &DistanceMatrix, k: usize) -> Self {
        let n = distances.size();
        let width = k.min(n.saturating_sub(1));
        let mut neighbors = Vec::with_capacity(n * width);
        let mut order: Vec<usize> = Vec::with_capacity(n);

        for city in 0..n {
            order.clear();
            order.extend((0..n).filter(|&other| other != city));
            let row = distances.row(city);
            order.sort_by_key(|&other| (OrderedFloat(row[other]), other));
            neighbors.extend_from_slice(&order[..width]);
        }

        CandidateLists { width, neighbors }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn neighbors(&self, city: usize) -> &[usize] {
        &self.neighbors[city * self.width..(city + 1) * self.width]
    }

    /// The same lists cut down to their first `k` entries.
    pub fn truncated(&self, k: usize) -> Self {
        if k >= self.width {
            return self.clone();
        }
        let neighbors = self
            .neighbors
            .chunks(self.width.max(1))
            .flat_map(|list| list[..k].iter().copied())
            .collect();
        CandidateLists { width: k, neighbors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matrix() -> DistanceMatrix {
        DistanceMatrix::from_rows(&[
            vec![0.0, 5.0, 1.0, 3.0],
            vec![2.0, 0.0, 2.0, 9.0],
            vec![4.0, 4.0, 0.0, 1.0],
            vec![0.0, 7.0, 6.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_sorted_by_distance_excluding_self() {
        let lists = CandidateLists::build(&matrix(), 3);
        assert_eq!(lists.neighbors(0), &[2, 3, 1]);
        // Tie between 0 and 2 is broken by index.
        assert_eq!(lists.neighbors(1), &[0, 2, 3]);
        assert_eq!(lists.neighbors(2), &[3, 0, 1]);
        // Zero distance to another city still ranks first, self is skipped.
        assert_eq!(lists.neighbors(3), &[0, 2, 1]);
    }

    #[test]
    fn test_width_is_capped() {
        let lists = CandidateLists::build(&matrix(), 80);
        assert_eq!(lists.width(), 3);
        assert_eq!(lists.neighbors(2).len(), 3);
    }

    #[test]
    fn test_truncated() {
        let lists = CandidateLists::build(&matrix(), 3).truncated(1);
        assert_eq!(lists.width(), 1);
        assert_eq!(lists.neighbors(0), &[2]);
        assert_eq!(lists.neighbors(3), &[0]);
    }

    proptest! {
        #[test]
        fn prop_lists_are_nearest_first(
            n in 2usize..12,
            k in 1usize..12,
            values in proptest::collection::vec(0u32..20, 144),
        ) {
            let data = (0..n * n)
                .map(|idx| if idx / n == idx % n { 0.0 } else { values[idx] as f64 })
                .collect();
            let m = DistanceMatrix::from_data(n, data).unwrap();
            let lists = CandidateLists::build(&m, k);
            prop_assert_eq!(lists.width(), k.min(n - 1));

            for city in 0..n {
                let list = lists.neighbors(city);
                prop_assert!(!list.contains(&city));
                for pair in list.windows(2) {
                    prop_assert!(m.get(city, pair[0]) <= m.get(city, pair[1]));
                }
                // Nothing left out is strictly closer than the last kept city.
                if let Some(&last) = list.last() {
                    for other in (0..n).filter(|&o| o != city && !list.contains(&o)) {
                        prop_assert!(m.get(city, other) >= m.get(city, last));
                    }
                }
            }
        }
    }
}
