//! Tour construction by a single ant.
//!
//! Ants only read the shared colony state; everything they write (tour,
//! visited flags, random stream, local search scratch) is their own, so a
//! colony can build all tours of an iteration in parallel.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::arborescence::Cmsa;
use crate::heuristics::candidates::CandidateLists;
use crate::heuristics::local_search::{LocalSearch, SearchOutcome, ThreeOptWorkspace};
use crate::heuristics::pheromone::PheromoneTrails;
use crate::instance::DistanceMatrix;

/// Cached selection weights: `tau^alpha * (1 / (d + 1))^beta`, plus the same
/// table with the CMSA value added for biased steps.
#[derive(Debug, Clone)]
pub struct Desirability {
    size: usize,
    heuristic: Vec<f64>,
    plain: Vec<f64>,
    biased: Vec<f64>,
}

impl Desirability {
    pub fn new(distances: &DistanceMatrix, beta: f64) -> Self {
        let n = distances.size();
        let mut heuristic = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    heuristic[i * n + j] = (1.0 / (distances.get(i, j) + 1.0)).powf(beta);
                }
            }
        }
        Desirability {
            size: n,
            heuristic,
            plain: vec![0.0; n * n],
            biased: Vec::new(),
        }
    }

    /// Recomputes both tables from the current trails. Without a CMSA the
    /// biased table is left empty.
    pub fn refresh(&mut self, trails: &PheromoneTrails, alpha: f64, cmsa: Option<&Cmsa>) {
        for ((w, &tau), &eta) in self.plain.iter_mut().zip(trails.values()).zip(&self.heuristic) {
            *w = tau.powf(alpha) * eta;
        }

        match cmsa {
            Some(cmsa) => {
                self.biased.clear();
                self.biased.extend(
                    (0..self.size)
                        .flat_map(|i| cmsa.row(i).iter())
                        .zip(&self.plain)
                        .map(|(&bias, &w)| w + bias),
                );
            }
            None => self.biased.clear(),
        }
    }

    #[inline]
    pub fn row(&self, from: usize) -> &[f64] {
        &self.plain[from * self.size..(from + 1) * self.size]
    }

    /// Biased row, or the plain one when no CMSA is attached.
    #[inline]
    pub fn biased_row(&self, from: usize) -> &[f64] {
        if self.biased.is_empty() {
            self.row(from)
        } else {
            &self.biased[from * self.size..(from + 1) * self.size]
        }
    }
}

/// What an ant reads while building a tour.
pub struct ConstructionView<'a> {
    pub candidates: &'a CandidateLists,
    pub desirability: &'a Desirability,
    /// Probability that a step uses the CMSA-biased table.
    pub cmsa_probability: f64,
}

/// One ant with its private buffers.
#[derive(Debug, Clone)]
pub struct Ant {
    tour: Vec<usize>,
    visited: Vec<bool>,
    length: f64,
    workspace: ThreeOptWorkspace,
    last_search: SearchOutcome,
    rng: ChaCha8Rng,
}

impl Ant {
    /// Ant `index` draws from stream `index` of the generator seeded with
    /// `seed`, so its choices do not depend on which thread runs it.
    pub fn new(index: usize, n: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(index as u64);
        Ant {
            tour: Vec::with_capacity(n),
            visited: vec![false; n],
            length: f64::INFINITY,
            workspace: ThreeOptWorkspace::new(n),
            last_search: SearchOutcome::default(),
            rng,
        }
    }

    pub fn tour(&self) -> &[usize] {
        &self.tour
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Outcome of the last local search, default if none ran this iteration.
    pub fn last_search(&self) -> SearchOutcome {
        self.last_search
    }

    /// Builds a full tour from a random start city.
    pub fn construct(&mut self, view: &ConstructionView<'_>) {
        let n = self.visited.len();
        self.visited.fill(false);
        self.tour.clear();
        self.last_search = SearchOutcome::default();
        if n == 0 {
            return;
        }

        let mut current = self.rng.gen_range(0..n);
        self.tour.push(current);
        self.visited[current] = true;

        while self.tour.len() < n {
            let next = self.select_next(current, view);
            self.tour.push(next);
            self.visited[next] = true;
            current = next;
        }
    }

    /// Roulette-wheel choice of the next city. One uniform draw decides both
    /// which table to use and where the wheel stops.
    fn select_next(&mut self, current: usize, view: &ConstructionView<'_>) -> usize {
        let q: f64 = self.rng.gen();
        let weights = if q < view.cmsa_probability {
            view.desirability.biased_row(current)
        } else {
            view.desirability.row(current)
        };

        let candidates = view.candidates.neighbors(current).iter().copied();
        if let Some(city) = roulette(candidates, weights, &self.visited, q) {
            return city;
        }
        if let Some(city) = roulette(0..self.visited.len(), weights, &self.visited, q) {
            return city;
        }

        // Every remaining weight underflowed to zero.
        self.visited.iter().position(|&v| !v).unwrap_or(current)
    }

    pub fn improve<S>(&mut self, search: &S)
    where
        S: LocalSearch<Workspace = ThreeOptWorkspace>,
    {
        self.last_search = search.improve(&mut self.tour, &mut self.workspace);
    }

    pub fn evaluate(&mut self, distances: &DistanceMatrix) -> f64 {
        self.length = distances.tour_length(&self.tour);
        self.length
    }
}

/// First unvisited city whose cumulative weight exceeds `q` times the total.
/// `None` when the unvisited cities carry no weight.
fn roulette<I>(cities: I, weights: &[f64], visited: &[bool], q: f64) -> Option<usize>
where
    I: Iterator<Item = usize> + Clone,
{
    let total: f64 = cities.clone().filter(|&c| !visited[c]).map(|c| weights[c]).sum();
    if total <= 0.0 {
        return None;
    }

    let threshold = q * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for city in cities {
        if visited[city] || weights[city] <= 0.0 {
            continue;
        }
        cumulative += weights[city];
        last = Some(city);
        if threshold < cumulative {
            return Some(city);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::pheromone::PheromoneTrails;
    use crate::solution::is_permutation;
    use proptest::prelude::*;

    fn matrix(n: usize) -> DistanceMatrix {
        let data = (0..n * n)
            .map(|idx| {
                let (i, j) = (idx / n, idx % n);
                if i == j {
                    0.0
                } else {
                    ((i * 7 + j * 13) % 23 + 1) as f64
                }
            })
            .collect();
        DistanceMatrix::from_data(n, data).unwrap()
    }

    fn desirability(m: &DistanceMatrix, cmsa: Option<&Cmsa>) -> Desirability {
        let trails = PheromoneTrails::new(m.size(), 100.0);
        let mut d = Desirability::new(m, 2.0);
        d.refresh(&trails, 1.0, cmsa);
        d
    }

    #[test]
    fn test_roulette_threshold() {
        let weights = [1.0, 0.0, 2.0, 1.0];
        let visited = [false, false, false, false];
        assert_eq!(roulette(0..4, &weights, &visited, 0.0), Some(0));
        assert_eq!(roulette(0..4, &weights, &visited, 0.5), Some(2));
        assert_eq!(roulette(0..4, &weights, &visited, 0.99), Some(3));

        let visited = [true, false, true, true];
        assert_eq!(roulette(0..4, &weights, &visited, 0.5), None);
    }

    #[test]
    fn test_desirability_offsets_zero_distance() {
        let m = DistanceMatrix::from_rows(&[vec![0.0, 0.0], vec![3.0, 0.0]]).unwrap();
        let d = desirability(&m, None);
        assert_eq!(d.row(0)[1], 100.0);
        assert_eq!(d.row(1)[0], 100.0 / 16.0);
        assert_eq!(d.row(0)[0], 0.0);
        assert_eq!(d.biased_row(0), d.row(0));
    }

    #[test]
    fn test_biased_row_adds_cmsa() {
        let m = matrix(5);
        let cmsa = Cmsa::build(&m).unwrap();
        let d = desirability(&m, Some(&cmsa));
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(d.biased_row(i)[j], d.row(i)[j] + cmsa.get(i, j));
            }
        }
    }

    #[test]
    fn test_falls_back_to_full_scan() {
        // Width-one lists: after the nearest city is taken the list is empty.
        let m = matrix(8);
        let lists = CandidateLists::build(&m, 1);
        let d = desirability(&m, None);
        let view = ConstructionView {
            candidates: &lists,
            desirability: &d,
            cmsa_probability: 0.0,
        };
        let mut ant = Ant::new(0, 8, 3);
        ant.construct(&view);
        assert!(is_permutation(ant.tour(), 8));
    }

    #[test]
    fn test_same_stream_same_tour() {
        let m = matrix(10);
        let lists = CandidateLists::build(&m, 4);
        let d = desirability(&m, None);
        let view = ConstructionView {
            candidates: &lists,
            desirability: &d,
            cmsa_probability: 0.0,
        };
        let mut a = Ant::new(2, 10, 9);
        let mut b = Ant::new(2, 10, 9);
        a.construct(&view);
        b.construct(&view);
        assert_eq!(a.tour(), b.tour());
        assert_eq!(a.evaluate(&m), m.tour_length(b.tour()));
    }

    proptest! {
        #[test]
        fn prop_constructed_tours_are_permutations(n in 4usize..40, width in 1usize..10, seed in 0u64..500) {
            let m = matrix(n);
            let lists = CandidateLists::build(&m, width);
            let cmsa = Cmsa::zeros(n);
            let d = desirability(&m, Some(&cmsa));
            let view = ConstructionView {
                candidates: &lists,
                desirability: &d,
                cmsa_probability: 0.5,
            };
            let mut ant = Ant::new(seed as usize % 7, n, seed);
            ant.construct(&view);
            prop_assert!(is_permutation(ant.tour(), n));
        }
    }
}
