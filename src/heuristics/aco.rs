//! MAX-MIN Ant System for the ATSP.
//!
//! Each iteration every ant builds a tour from pheromone, inverse distance and
//! (with a probability that fades over the run) the CMSA bias, optionally
//! polishes it with reduced 3-opt, and then a single tour reinforces the
//! trails. Trails stay within `[tau_min, tau_max]`, both derived from the best
//! length found so far, and are reset to `tau_max` when the colony stagnates.

use std::time::Instant;

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arborescence::Cmsa;
use crate::error::{Result, SolverError};
use crate::heuristics::ant::{Ant, ConstructionView, Desirability};
use crate::heuristics::candidates::CandidateLists;
use crate::heuristics::local_search::{LocalSearch, ReducedThreeOpt, ThreeOptConfig};
use crate::heuristics::pheromone::{PheromoneBounds, PheromoneTrails};
use crate::instance::DistanceMatrix;
use crate::solution::{deviation, Solution};

/// Tolerance used when comparing a tour length with the target.
const TARGET_EPSILON: f64 = 1e-9;

/// Stagnation restart parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Iterations without a new best-so-far before the colony is checked
    pub stagnation_iterations: usize,
    /// Position of the "well used edge" threshold between a city's weakest
    /// and strongest outgoing trail
    pub lambda: f64,
    /// Restart when the branching factor is at or below this value
    pub branching_threshold: f64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        RestartConfig {
            stagnation_iterations: 50,
            lambda: 0.1,
            branching_threshold: 1.1,
        }
    }
}

/// Which tour reinforces the trails at the end of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepositStrategy {
    /// Iteration-best for the first 25 iterations, then best-so-far every
    /// 5th, 3rd, 2nd and finally every iteration (switching after 75, 125
    /// and 250 iterations).
    #[default]
    Alternating,
    /// Always the iteration-best tour.
    IterationBest,
    /// Always the best-so-far tour.
    BestSoFar,
}

impl DepositStrategy {
    pub fn uses_best_so_far(self, iteration: usize) -> bool {
        match self {
            DepositStrategy::IterationBest => false,
            DepositStrategy::BestSoFar => true,
            DepositStrategy::Alternating => {
                if iteration <= 25 {
                    return false;
                }
                let period = match iteration {
                    0..=75 => 5,
                    76..=125 => 3,
                    126..=250 => 2,
                    _ => 1,
                };
                iteration % period == 0
            }
        }
    }
}

/// MMAS configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmasConfig {
    /// Number of ants
    pub ants: usize,
    /// The first `local_search_ants` ants run 3-opt on their tour
    pub local_search_ants: usize,
    /// Number of iterations
    pub iterations: usize,
    /// Pheromone importance (alpha)
    pub alpha: f64,
    /// Heuristic importance (beta)
    pub beta: f64,
    /// Fraction of pheromone kept by evaporation (rho)
    pub rho: f64,
    /// Probability that the best tour is rebuilt once trails have converged
    pub p_best: f64,
    /// Initial probability of a CMSA-biased step, fading to zero
    pub p_cmsa: f64,
    /// Initial pheromone level
    pub initial_pheromone: f64,
    /// Candidate list size for 3-opt
    pub local_search_neighbors: usize,
    /// Candidate list size for construction (half the 3-opt list if unset)
    pub construction_neighbors: Option<usize>,
    /// Stagnation restarts, disabled if unset
    pub restart: Option<RestartConfig>,
    /// Reinforcement schedule
    pub deposit: DepositStrategy,
    /// Local search tuning
    pub three_opt: ThreeOptConfig,
    /// Random seed
    pub seed: u64,
    /// Build tours on the rayon thread pool
    pub parallel: bool,
}

impl Default for MmasConfig {
    fn default() -> Self {
        MmasConfig {
            ants: 20,
            local_search_ants: 20,
            iterations: 1000,
            alpha: 1.0,
            beta: 5.0,
            rho: 0.8,
            p_best: 0.05,
            p_cmsa: 0.5,
            initial_pheromone: 100.0,
            local_search_neighbors: 80,
            construction_neighbors: None,
            restart: Some(RestartConfig::default()),
            deposit: DepositStrategy::Alternating,
            three_opt: ThreeOptConfig::default(),
            seed: 42,
            parallel: true,
        }
    }
}

impl MmasConfig {
    /// Experiment defaults for an instance of `n` cities: one ant per city,
    /// all of them running 3-opt, and an iteration budget by size class.
    pub fn for_dimension(n: usize) -> Self {
        let iterations = if n < 50 {
            100
        } else if n < 100 {
            500
        } else {
            1000
        };
        MmasConfig {
            ants: n.max(1),
            local_search_ants: n.max(1),
            iterations,
            ..MmasConfig::default()
        }
    }

    pub fn construction_width(&self) -> usize {
        self.construction_neighbors
            .unwrap_or(self.local_search_neighbors / 2)
            .max(1)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> Result<()> {
            Err(SolverError::InvalidConfig(message))
        }

        if self.ants == 0 {
            return invalid("at least one ant is required".to_string());
        }
        if self.iterations == 0 {
            return invalid("at least one iteration is required".to_string());
        }
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return invalid(format!("rho must be in (0, 1), got {}", self.rho));
        }
        if !(self.p_best > 0.0 && self.p_best < 1.0) {
            return invalid(format!("p_best must be in (0, 1), got {}", self.p_best));
        }
        if !(0.0..=1.0).contains(&self.p_cmsa) {
            return invalid(format!("p_cmsa must be in [0, 1], got {}", self.p_cmsa));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) || !(self.beta.is_finite() && self.beta >= 0.0) {
            return invalid(format!(
                "alpha and beta must be non-negative, got {} and {}",
                self.alpha, self.beta
            ));
        }
        if !(self.initial_pheromone.is_finite() && self.initial_pheromone > 0.0) {
            return invalid(format!(
                "initial pheromone must be positive, got {}",
                self.initial_pheromone
            ));
        }
        if self.local_search_neighbors == 0 || self.construction_neighbors == Some(0) {
            return invalid("candidate lists need at least one neighbour".to_string());
        }
        if self.three_opt.min_spacing == 0 || !(self.three_opt.minor_gain_ratio >= 0.0) {
            return invalid("3-opt spacing must be positive and the minor gain ratio non-negative".to_string());
        }
        if let Some(restart) = &self.restart {
            if restart.stagnation_iterations == 0 || !(0.0..=1.0).contains(&restart.lambda) {
                return invalid(format!(
                    "restart needs a positive stagnation window and lambda in [0, 1], got {} and {}",
                    restart.stagnation_iterations, restart.lambda
                ));
            }
            if !(restart.branching_threshold.is_finite() && restart.branching_threshold >= 0.0) {
                return invalid(format!(
                    "branching threshold must be finite and non-negative, got {}",
                    restart.branching_threshold
                ));
            }
        }
        Ok(())
    }
}

/// Mutable colony state of one run.
struct Colony {
    trails: PheromoneTrails,
    desirability: Desirability,
    ants: Vec<Ant>,
    best_tour: Vec<usize>,
    best_length: f64,
    best_at_iteration: usize,
    iteration_best: usize,
    stagnation: usize,
    restarts: usize,
    three_opt_improvements: usize,
    deviation_per_iteration: Vec<f64>,
    best_cost_per_iteration: Vec<f64>,
    reached_target: bool,
}

/// What happened during one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IterationReport {
    improved: bool,
    restarted: bool,
    deposited_best_so_far: bool,
    stop: bool,
}

/// MAX-MIN Ant System solver
pub struct MaxMinAntSystem<'a> {
    distances: &'a DistanceMatrix,
    cmsa: &'a Cmsa,
    config: MmasConfig,
    search_lists: CandidateLists,
    construction_lists: CandidateLists,
    p_dec: f64,
    target_length: Option<f64>,
}

impl<'a> MaxMinAntSystem<'a> {
    pub fn new(distances: &'a DistanceMatrix, cmsa: &'a Cmsa, config: MmasConfig) -> Result<Self> {
        let n = distances.size();
        if n < 3 {
            return Err(SolverError::InvalidMatrix(format!(
                "a tour needs at least 3 cities, got {}",
                n
            )));
        }
        if cmsa.size() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                found: cmsa.size(),
            });
        }
        config.validate()?;

        let search_lists = CandidateLists::build(distances, config.local_search_neighbors);
        let width = config.construction_width();
        let construction_lists = if width <= search_lists.width() {
            search_lists.truncated(width)
        } else {
            CandidateLists::build(distances, width)
        };
        let p_dec = config.p_best.powf(1.0 / n as f64);

        Ok(MaxMinAntSystem {
            distances,
            cmsa,
            config,
            search_lists,
            construction_lists,
            p_dec,
            target_length: None,
        })
    }

    /// Length to measure deviations against. Matching it ends the run.
    pub fn with_target(mut self, target: Option<f64>) -> Self {
        self.target_length = target.filter(|t| *t > 0.0);
        self
    }

    pub fn config(&self) -> &MmasConfig {
        &self.config
    }

    fn cmsa_if_used(&self) -> Option<&'a Cmsa> {
        (self.config.p_cmsa > 0.0).then_some(self.cmsa)
    }

    fn three_opt(&self) -> ReducedThreeOpt<'_> {
        ReducedThreeOpt::new(self.distances, &self.search_lists, self.config.three_opt.clone())
    }

    fn start(&self) -> Colony {
        let n = self.distances.size();
        let trails = PheromoneTrails::new(n, self.config.initial_pheromone);
        let mut desirability = Desirability::new(self.distances, self.config.beta);
        desirability.refresh(&trails, self.config.alpha, self.cmsa_if_used());

        Colony {
            trails,
            desirability,
            ants: (0..self.config.ants)
                .map(|k| Ant::new(k, n, self.config.seed))
                .collect(),
            best_tour: Vec::new(),
            best_length: f64::INFINITY,
            best_at_iteration: 0,
            iteration_best: 0,
            stagnation: 0,
            restarts: 0,
            three_opt_improvements: 0,
            deviation_per_iteration: Vec::with_capacity(self.config.iterations),
            best_cost_per_iteration: Vec::with_capacity(self.config.iterations),
            reached_target: false,
        }
    }

    /// Run the colony for the configured number of iterations
    pub fn run(&self) -> Solution {
        let start = Instant::now();
        let search = self.three_opt();
        let mut colony = self.start();
        let mut executed = 0;

        log::info!(
            "MMAS: {} cities, {} ants, {} iterations, p_cmsa={}, {} on {} ants",
            self.distances.size(),
            self.config.ants,
            self.config.iterations,
            self.config.p_cmsa,
            search.name(),
            self.config.local_search_ants.min(self.config.ants)
        );

        for iteration in 0..self.config.iterations {
            executed = iteration + 1;
            if self.iterate(&mut colony, iteration, &search).stop {
                break;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        log::info!(
            "MMAS finished: best {:.2} at iteration {}, {} restarts, {:.3}s",
            colony.best_length,
            colony.best_at_iteration,
            colony.restarts,
            elapsed
        );

        let mut solution = Solution {
            tour: colony.best_tour,
            cost: colony.best_length,
            algorithm: format!("MMAS-CMSA (p_cmsa={})", self.config.p_cmsa),
            computation_time: elapsed,
            iterations: executed,
            best_at_iteration: colony.best_at_iteration,
            target_length: self.target_length,
            deviation_per_iteration: colony.deviation_per_iteration,
            best_cost_per_iteration: colony.best_cost_per_iteration,
            three_opt_improvements: colony.three_opt_improvements,
            restarts: colony.restarts,
            reached_target: colony.reached_target,
        };
        solution.rotate_to(0);
        solution
    }

    fn iterate(&self, colony: &mut Colony, iteration: usize, search: &ReducedThreeOpt<'_>) -> IterationReport {
        let config = &self.config;
        let mut report = IterationReport {
            improved: false,
            restarted: false,
            deposited_best_so_far: false,
            stop: false,
        };

        // Construction and local search: ants only read shared state.
        let view = ConstructionView {
            candidates: &self.construction_lists,
            desirability: &colony.desirability,
            cmsa_probability: config.p_cmsa * (1.0 - iteration as f64 / config.iterations as f64),
        };
        let distances = self.distances;
        let work = |(k, ant): (usize, &mut Ant)| {
            ant.construct(&view);
            if k < config.local_search_ants {
                ant.improve(search);
            }
            ant.evaluate(distances);
        };
        if config.parallel {
            colony.ants.par_iter_mut().enumerate().for_each(work);
        } else {
            colony.ants.iter_mut().enumerate().for_each(work);
        }

        // Evaluation.
        let Some((best_ant, iteration_length)) = colony
            .ants
            .iter()
            .enumerate()
            .map(|(k, ant)| (k, ant.length()))
            .min_by_key(|&(_, length)| OrderedFloat(length))
        else {
            report.stop = true;
            return report;
        };
        colony.iteration_best = best_ant;
        colony.three_opt_improvements += colony.ants.iter().map(|a| a.last_search().moves).sum::<usize>();

        if iteration_length < colony.best_length {
            colony.best_length = iteration_length;
            colony.best_tour.clear();
            colony.best_tour.extend_from_slice(colony.ants[best_ant].tour());
            colony.best_at_iteration = iteration;
            colony.stagnation = 0;
            colony.trails.set_bounds(PheromoneBounds::compute(
                colony.best_length,
                config.rho,
                self.p_dec,
                self.distances.size(),
            ));
            report.improved = true;
            log::debug!("iteration {}: new best {:.2}", iteration, colony.best_length);
        } else {
            colony.stagnation += 1;
        }
        colony.best_cost_per_iteration.push(colony.best_length);

        if let Some(target) = self.target_length {
            colony.deviation_per_iteration.push(deviation(iteration_length, target));
            if colony.best_length <= target + TARGET_EPSILON {
                log::info!("target {} reached at iteration {}", target, iteration);
                colony.reached_target = true;
                report.stop = true;
                return report;
            }
        }
        if colony.best_length <= 0.0 {
            report.stop = true;
            return report;
        }

        // Restart when stagnating on converged trails.
        if let Some(restart) = &config.restart {
            if colony.stagnation >= restart.stagnation_iterations {
                let branching = colony.trails.branching_factor(restart.lambda);
                if branching <= restart.branching_threshold {
                    colony.trails.reset_to_max();
                    colony.restarts += 1;
                    colony.stagnation = 0;
                    report.restarted = true;
                    log::debug!(
                        "iteration {}: restart (branching factor {:.3})",
                        iteration,
                        branching
                    );
                }
            }
        }

        // Evaporation and reinforcement, after every ant is done.
        colony.trails.evaporate(config.rho);
        report.deposited_best_so_far = config.deposit.uses_best_so_far(iteration);
        if report.deposited_best_so_far {
            colony.trails.deposit(&colony.best_tour, 1.0 / colony.best_length);
        } else {
            colony
                .trails
                .deposit(colony.ants[best_ant].tour(), 1.0 / iteration_length);
        }
        colony
            .desirability
            .refresh(&colony.trails, config.alpha, self.cmsa_if_used());

        log::trace!(
            "iteration {}: iteration best {:.2}, best {:.2}",
            iteration,
            iteration_length,
            colony.best_length
        );

        report
    }
}
