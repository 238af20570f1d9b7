//! Local search improvement heuristics for ATSP tours.
//!
//! On an asymmetric instance reversing a segment changes its cost, so the
//! only 3-opt reconnection worth trying is the one that keeps every segment's
//! direction: cutting `a->b`, `c->d` and `e->f` and reconnecting with
//! `a->d`, `e->b` and `c->f`, which turns segment order `abc` into `acb`.

use serde::{Deserialize, Serialize};

use crate::heuristics::candidates::CandidateLists;
use crate::instance::DistanceMatrix;

const GAIN_EPSILON: f64 = 1e-10;

/// Summary of one `improve` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchOutcome {
    /// Accepted moves.
    pub moves: usize,
    /// Sum of the accepted gains; equals the change in tour length (negative).
    pub gain: f64,
    /// True if the minor-gain cutoff ended the search.
    pub stopped_early: bool,
}

/// Trait for local search improvement methods.
///
/// Searches are shared across threads; anything they mutate lives in the
/// workspace, which belongs to one caller at a time.
pub trait LocalSearch: Sync {
    type Workspace: Send;

    /// Scratch space sized for tours of `n` cities.
    fn workspace(&self, n: usize) -> Self::Workspace;

    /// Improves `tour` in place.
    fn improve(&self, tour: &mut [usize], workspace: &mut Self::Workspace) -> SearchOutcome;

    fn name(&self) -> &str;
}

/// Reduced 3-opt tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeOptConfig {
    /// Minimum distance in tour positions between any two cut points.
    pub min_spacing: usize,
    /// Skip improvements smaller than `minor_gain_ratio` of the initial
    /// length and give up after too many of them in a row.
    pub early_exit: bool,
    /// Fraction of the initial tour length below which a gain is minor.
    pub minor_gain_ratio: f64,
    /// Consecutive minor gains tolerated before giving up.
    pub max_consecutive_minor_gains: usize,
}

impl Default for ThreeOptConfig {
    fn default() -> Self {
        ThreeOptConfig {
            min_spacing: 3,
            early_exit: true,
            minor_gain_ratio: 0.005,
            max_consecutive_minor_gains: 20,
        }
    }
}

/// Per-call scratch: don't-look bits and city positions, indexed by city,
/// plus a buffer for rebuilding the tour.
#[derive(Debug, Clone, Default)]
pub struct ThreeOptWorkspace {
    dont_look: Vec<bool>,
    positions: Vec<usize>,
    buffer: Vec<usize>,
}

impl ThreeOptWorkspace {
    pub fn new(n: usize) -> Self {
        ThreeOptWorkspace {
            dont_look: vec![false; n],
            positions: vec![0; n],
            buffer: Vec::with_capacity(n),
        }
    }

    fn reset(&mut self, tour: &[usize]) {
        self.dont_look.clear();
        self.dont_look.resize(tour.len(), false);
        self.positions.resize(tour.len(), 0);
        self.set_positions(tour);
    }

    fn set_positions(&mut self, tour: &[usize]) {
        for (pos, &city) in tour.iter().enumerate() {
            self.positions[city] = pos;
        }
    }
}

/// Reduced 3-opt driven by candidate lists and don't-look bits.
pub struct ReducedThreeOpt<'a> {
    distances: &'a DistanceMatrix,
    candidates: &'a CandidateLists,
    config: ThreeOptConfig,
}

impl<'a> ReducedThreeOpt<'a> {
    pub fn new(distances: &'a DistanceMatrix, candidates: &'a CandidateLists, config: ThreeOptConfig) -> Self {
        ReducedThreeOpt {
            distances,
            candidates,
            config,
        }
    }

    /// Runs the search, calling `on_move` with the rebuilt tour and the
    /// predicted gain after every accepted move.
    fn search<F>(&self, tour: &mut [usize], ws: &mut ThreeOptWorkspace, mut on_move: F) -> SearchOutcome
    where
        F: FnMut(&[usize], f64),
    {
        let n = tour.len();
        let spacing = self.config.min_spacing.max(1);
        let mut outcome = SearchOutcome::default();
        if n < 3 * spacing {
            return outcome;
        }

        let dist = |from: usize, to: usize| self.distances.get(from, to);
        let minor_gain = self.distances.tour_length(tour) * self.config.minor_gain_ratio;
        let mut consecutive_minor = 0;

        ws.reset(tour);

        loop {
            let mut improved = false;

            'cities: for i in 0..n {
                let a = tour[i];
                if ws.dont_look[a] {
                    continue;
                }
                let b_idx = (i + 1) % n;
                let b = tour[b_idx];
                let d_ab = dist(a, b);

                for &d in self.candidates.neighbors(a) {
                    let d_ad = dist(a, d);
                    if d_ad >= d_ab {
                        break;
                    }

                    let d_idx = ws.positions[d];
                    let j = (d_idx + n - 1) % n;
                    if !has_spacing(i, j, n, spacing) {
                        continue;
                    }
                    let c = tour[j];
                    let d_cd = dist(c, d);
                    let radius = d_ab + d_cd - d_ad;

                    for &f in self.candidates.neighbors(c) {
                        let d_cf = dist(c, f);
                        if d_cf >= radius {
                            break;
                        }

                        let f_idx = ws.positions[f];
                        let k = (f_idx + n - 1) % n;
                        if !(is_between(i, j, k) && has_spacing(j, k, n, spacing) && has_spacing(k, i, n, spacing)) {
                            continue;
                        }
                        let e = tour[k];

                        let gain = (d_ad + dist(e, b) + d_cf) - (d_ab + d_cd + dist(e, f));
                        if gain >= -GAIN_EPSILON {
                            continue;
                        }

                        if self.config.early_exit {
                            if -gain < minor_gain {
                                consecutive_minor += 1;
                                if consecutive_minor > self.config.max_consecutive_minor_gains {
                                    outcome.stopped_early = true;
                                    return outcome;
                                }
                                continue;
                            }
                            consecutive_minor = 0;
                        }

                        reorder(tour, &mut ws.buffer, b_idx, d_idx, f_idx);
                        ws.set_positions(tour);
                        for city in [a, b, c, d, e, f] {
                            ws.dont_look[city] = false;
                        }

                        outcome.moves += 1;
                        outcome.gain += gain;
                        on_move(&*tour, gain);
                        improved = true;
                        break 'cities;
                    }
                }

                ws.dont_look[a] = true;
            }

            if !improved {
                break;
            }
        }

        outcome
    }
}

impl LocalSearch for ReducedThreeOpt<'_> {
    type Workspace = ThreeOptWorkspace;

    fn workspace(&self, n: usize) -> ThreeOptWorkspace {
        ThreeOptWorkspace::new(n)
    }

    fn improve(&self, tour: &mut [usize], ws: &mut ThreeOptWorkspace) -> SearchOutcome {
        self.search(tour, ws, |_, _| {})
    }

    fn name(&self) -> &str {
        "Reduced 3-opt"
    }
}

/// True if position `x` is met strictly between `a` and `b` when walking the
/// tour forward from `a`.
fn is_between(a: usize, x: usize, b: usize) -> bool {
    if a < b {
        x > a && x < b
    } else {
        x > a || x < b
    }
}

/// True if `i` and `j` are at least `spacing` positions apart in both
/// directions around the ring.
fn has_spacing(i: usize, j: usize, n: usize, spacing: usize) -> bool {
    let forward = (j + n - i) % n;
    let backward = (i + n - j) % n;
    forward >= spacing && backward >= spacing
}

/// Rebuilds the tour as `[f..b) + [d..f) + [b..d)`, indices taken cyclically.
/// None of the three arcs is reversed.
fn reorder(tour: &mut [usize], buffer: &mut Vec<usize>, b_idx: usize, d_idx: usize, f_idx: usize) {
    buffer.clear();
    push_arc(tour, f_idx, b_idx, buffer);
    push_arc(tour, d_idx, f_idx, buffer);
    push_arc(tour, b_idx, d_idx, buffer);
    debug_assert_eq!(buffer.len(), tour.len());
    tour.copy_from_slice(buffer);
}

fn push_arc(tour: &[usize], from: usize, to: usize, out: &mut Vec<usize>) {
    if from < to {
        out.extend_from_slice(&tour[from..to]);
    } else {
        out.extend_from_slice(&tour[from..]);
        out.extend_from_slice(&tour[..to]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::is_permutation;
    use proptest::prelude::*;
    use rand::prelude::*;
    use rand::Rng;
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(n: usize, seed: u64) -> DistanceMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data = (0..n * n)
            .map(|idx| if idx % (n + 1) == 0 { 0.0 } else { rng.gen_range(1.0..100.0) })
            .collect();
        DistanceMatrix::from_data(n, data).unwrap()
    }

    fn exhaustive() -> ThreeOptConfig {
        ThreeOptConfig {
            early_exit: false,
            ..ThreeOptConfig::default()
        }
    }

    #[test]
    fn test_reorder_keeps_segment_direction() {
        // a=0 b=1 | c=3 d=4 | e=6 f=7
        let mut tour: Vec<usize> = (0..9).collect();
        let mut buffer = Vec::new();
        reorder(&mut tour, &mut buffer, 1, 4, 7);
        assert_eq!(tour, vec![7, 8, 0, 4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_reorder_with_wrap_around() {
        let mut tour: Vec<usize> = (0..9).collect();
        let mut buffer = Vec::new();
        // Cut after positions 5, 8 and 2: b=6, d=0, f=3.
        reorder(&mut tour, &mut buffer, 6, 0, 3);
        assert_eq!(tour, vec![3, 4, 5, 0, 1, 2, 6, 7, 8]);
        assert!(is_permutation(&tour, 9));
    }

    #[test]
    fn test_move_gain_matches_length_change() {
        let m = random_matrix(10, 7);
        let tour: Vec<usize> = (0..10).collect();
        let (i, j, k) = (0, 3, 6);
        let (a, b, c, d, e, f) = (tour[i], tour[i + 1], tour[j], tour[j + 1], tour[k], tour[k + 1]);
        let gain = (m.get(a, d) + m.get(e, b) + m.get(c, f)) - (m.get(a, b) + m.get(c, d) + m.get(e, f));

        let mut moved = tour.clone();
        let mut buffer = Vec::new();
        reorder(&mut moved, &mut buffer, i + 1, j + 1, k + 1);
        let delta = m.tour_length(&moved) - m.tour_length(&tour);
        assert!((delta - gain).abs() < 1e-9);
    }

    #[test]
    fn test_is_between_and_spacing() {
        assert!(is_between(2, 4, 7));
        assert!(!is_between(2, 8, 7));
        assert!(is_between(7, 8, 2));
        assert!(is_between(7, 1, 2));
        assert!(has_spacing(0, 3, 9, 3));
        assert!(!has_spacing(0, 2, 9, 3));
        assert!(!has_spacing(0, 7, 9, 3));
    }

    #[test]
    fn test_small_tour_is_untouched() {
        let m = random_matrix(7, 1);
        let lists = CandidateLists::build(&m, 6);
        let search = ReducedThreeOpt::new(&m, &lists, exhaustive());
        let mut tour: Vec<usize> = (0..7).collect();
        let outcome = search.improve(&mut tour, &mut search.workspace(7));
        assert_eq!(outcome.moves, 0);
        assert_eq!(tour, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_improves_a_planted_tour() {
        // Optimal tour is 0..12 in order; the start swaps two blocks.
        let n = 12;
        let mut data = vec![50.0; n * n];
        for i in 0..n {
            data[i * n + i] = 0.0;
            data[i * n + (i + 1) % n] = 1.0;
        }
        let m = DistanceMatrix::from_data(n, data).unwrap();
        let lists = CandidateLists::build(&m, 11);
        let search = ReducedThreeOpt::new(&m, &lists, exhaustive());

        let mut tour = vec![0, 1, 2, 3, 8, 9, 10, 11, 4, 5, 6, 7];
        let before = m.tour_length(&tour);
        let outcome = search.improve(&mut tour, &mut search.workspace(n));
        let after = m.tour_length(&tour);

        assert!(outcome.moves >= 1);
        assert_eq!(after, n as f64);
        assert!((before + outcome.gain - after).abs() < 1e-9);
        assert!(is_permutation(&tour, n));
    }

    proptest! {
        #[test]
        fn prop_three_opt_is_monotone_and_valid(n in 9usize..30, seed in 0u64..1000) {
            let m = random_matrix(n, seed);
            let lists = CandidateLists::build(&m, 8);
            let search = ReducedThreeOpt::new(&m, &lists, exhaustive());

            let mut tour: Vec<usize> = (0..n).collect();
            tour.shuffle(&mut ChaCha8Rng::seed_from_u64(seed + 1));
            let before = m.tour_length(&tour);

            let mut ws = search.workspace(n);
            let mut last = before;
            let mut mismatches = Vec::new();
            let outcome = search.search(&mut tour, &mut ws, |moved, gain| {
                let length = m.tour_length(moved);
                if (length - last - gain).abs() > 1e-6 {
                    mismatches.push((last, length, gain));
                }
                last = length;
            });
            let after = m.tour_length(&tour);

            // Every accepted move changes the length by exactly its gain.
            prop_assert!(mismatches.is_empty(), "{:?}", mismatches);
            prop_assert!((last - after).abs() < 1e-9);
            prop_assert!(is_permutation(&tour, n));
            prop_assert!(after <= before + 1e-9);
            prop_assert!((before + outcome.gain - after).abs() < 1e-6);

            // Workspaces are reusable across calls.
            let again = search.improve(&mut tour, &mut ws);
            prop_assert!(m.tour_length(&tour) <= after + 1e-9);
            prop_assert!(again.gain <= 0.0);
        }
    }
}
